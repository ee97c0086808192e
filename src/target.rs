//! Parsing of host arguments.
//!
//! Hosts may be given as `host`, `host:port`, `[v6addr]:port`, a bare IPv6
//! address, or a URL such as `https://host:8443/path`. A URL without a port
//! uses its scheme's default; anything else falls back to the configured
//! default port.

use std::fmt;
use std::net::IpAddr;

use url::{Host, Url};

use crate::error::FetchError;

/// A host and port to fetch a certificate from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn parse(input: &str, default_port: u16) -> Result<Target, FetchError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(FetchError::invalid_input("host", "cannot be empty"));
        }

        if let Ok(ip) = input.parse::<IpAddr>() {
            return Ok(Target {
                host: ip.to_string(),
                port: default_port,
            });
        }

        let url = if input.contains("://") {
            Url::parse(input)
        } else {
            Url::parse(&format!("tls://{}", input))
        }
        .map_err(|e| FetchError::invalid_input("host", &format!("{}: {}", input, e)))?;

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => {
                return Err(FetchError::invalid_input(
                    "host",
                    &format!("{}: no host component", input),
                ))
            }
        };
        if host.is_empty() {
            return Err(FetchError::invalid_input("host", "cannot be empty"));
        }

        Ok(Target {
            host,
            port: url.port_or_known_default().unwrap_or(default_port),
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
