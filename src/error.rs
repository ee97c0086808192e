//! Error types for certificate retrieval.
//!
//! Every failure of a fetch is terminal for that call: nothing is retried
//! internally and no partial report is ever produced.

use std::fmt;
use std::io;

use serde::Serialize;
use strum_macros::{AsRefStr, Display};

/// Error returned when a certificate could not be retrieved from a host.
///
/// Each variant names the offending host (or `host:port` address) and keeps
/// the underlying cause.
#[derive(Debug)]
pub enum FetchError {
    /// Input rejected before any network activity
    InvalidInput {
        /// Which field/parameter was invalid
        field: String,
        /// Why it was invalid
        reason: String,
    },

    /// Hostname could not be resolved to any socket address
    DnsFailure {
        /// The hostname that failed to resolve
        host: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// TCP connect or TLS handshake did not complete in time
    Timeout {
        /// The address (host:port) being contacted
        address: String,
        /// Which phase timed out
        operation: String,
    },

    /// Remote end actively refused the TCP connection
    ConnectionRefused {
        /// The address (host:port) that refused
        address: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// Any other TCP level failure (unreachable network, reset, ...)
    ConnectionFailed {
        /// The address (host:port) connection failed to
        address: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// TLS negotiation failed
    HandshakeFailure {
        /// The host the handshake was attempted with
        host: String,
        /// Details about why the handshake failed
        details: String,
    },

    /// Handshake succeeded but the peer presented no certificate
    NoCertificate {
        /// The host that sent no certificate
        host: String,
    },

    /// Certificate fields could not be decoded
    ParseFailure {
        /// The host whose certificate was malformed
        host: String,
        /// Description of what went wrong
        reason: String,
    },
}

/// Coarse classification of a [`FetchError`], stable enough to be used as a
/// label in rendered output and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    InvalidInput,
    DnsFailure,
    Timeout,
    ConnectionRefused,
    ConnectionFailed,
    HandshakeFailure,
    NoCertificate,
    ParseFailure,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::InvalidInput { .. } => FetchErrorKind::InvalidInput,
            Self::DnsFailure { .. } => FetchErrorKind::DnsFailure,
            Self::Timeout { .. } => FetchErrorKind::Timeout,
            Self::ConnectionRefused { .. } => FetchErrorKind::ConnectionRefused,
            Self::ConnectionFailed { .. } => FetchErrorKind::ConnectionFailed,
            Self::HandshakeFailure { .. } => FetchErrorKind::HandshakeFailure,
            Self::NoCertificate { .. } => FetchErrorKind::NoCertificate,
            Self::ParseFailure { .. } => FetchErrorKind::ParseFailure,
        }
    }

    pub(crate) fn invalid_input(field: &str, reason: &str) -> Self {
        Self::InvalidInput {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn parse_failure(host: &str, reason: impl fmt::Display) -> Self {
        Self::ParseFailure {
            host: host.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn timeout(address: &str, operation: &str) -> Self {
        Self::Timeout {
            address: address.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Maps a failed `connect` on `address` onto the matching variant.
    pub(crate) fn from_connect(address: String, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                Self::timeout(&address, "tcp connect")
            }
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused { address, source },
            _ => Self::ConnectionFailed { address, source },
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { field, reason } => {
                write!(f, "Invalid input for '{}': {}", field, reason)
            }
            Self::DnsFailure { host, source } => {
                write!(f, "Failed to resolve hostname {}: {}", host, source)
            }
            Self::Timeout { address, operation } => {
                write!(f, "Operation timed out: {} to {}", operation, address)
            }
            Self::ConnectionRefused { address, source } => {
                write!(f, "Connection refused by {}: {}", address, source)
            }
            Self::ConnectionFailed { address, source } => {
                write!(f, "Connection failed to {}: {}", address, source)
            }
            Self::HandshakeFailure { host, details } => {
                write!(f, "TLS handshake with {} failed: {}", host, details)
            }
            Self::NoCertificate { host } => {
                write!(f, "No peer certificate presented by {}", host)
            }
            Self::ParseFailure { host, reason } => {
                write!(f, "Malformed certificate from {}: {}", host, reason)
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DnsFailure { source, .. } => Some(source),
            Self::ConnectionRefused { source, .. } => Some(source),
            Self::ConnectionFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
