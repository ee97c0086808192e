//! Fetch the leaf certificate a TLS server presents and report its
//! descriptive fields.
//!
//! A fetch connects to `host:port` with a bounded connect timeout, performs a
//! TLS client handshake (optionally accepting any certificate, since the
//! purpose is to inspect certificates rather than trust them), and turns the
//! peer's leaf certificate into a [`CertificateReport`].
//!
//! ```no_run
//! use certfetch::{CertificateFetcher, FetchOptions};
//!
//! let fetcher = CertificateFetcher::new(FetchOptions::default().insecure_skip_verify(true));
//! let report = fetcher.fetch("example.com", 443)?;
//! println!("{} issued by {}", report.common_name, report.issuer_name);
//! # Ok::<(), certfetch::FetchError>(())
//! ```

pub mod config;
pub mod error;
pub mod output;
pub mod target;

pub use error::{FetchError, FetchErrorKind};

use chrono::{DateTime, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::ssl::{HandshakeError, SslConnector, SslMethod, SslRef, SslVerifyMode};
use openssl::x509::{X509NameRef, X509Ref, X509VerifyResult};
use serde::{Serialize, Serializer};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const DEFAULT_PORT: u16 = 443;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

const UNKNOWN_COMMON_NAME: &str = "Unknown";
const NOT_AVAILABLE: &str = "Not Available";
const R11_ISSUER: &str = "R11";
const R11_DISPLAY_NAME: &str = "R11 Let's Encrypt Authority";

/// Fields read from the leaf certificate of one host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateReport {
    /// Hostname exactly as it was passed to the fetch
    pub tested_server: String,
    pub port: u16,
    /// Subject CN, or `"Unknown"` when the subject has none
    pub common_name: String,
    /// NotBefore
    pub start_date: DateTime<Utc>,
    /// NotAfter
    pub end_date: DateTime<Utc>,
    pub subject_alternative_names: SubjectAltNames,
    /// SHA-1 of the DER encoding, uppercase hex without separators
    pub thumbprint: String,
    /// Issuer CN after the display override, empty when the issuer has none
    pub issuer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CertificateReport {
    /// Builds a report from a certificate received from `host`.
    pub fn from_x509(host: &str, port: u16, cert: &X509Ref) -> Result<Self, FetchError> {
        let subject = distinguished_name(cert.subject_name());
        let issuer = distinguished_name(cert.issuer_name());

        let start_date = asn1_to_utc(cert.not_before())
            .ok_or_else(|| FetchError::parse_failure(host, "unreadable NotBefore"))?;
        let end_date = asn1_to_utc(cert.not_after())
            .ok_or_else(|| FetchError::parse_failure(host, "unreadable NotAfter"))?;
        let thumbprint = thumbprint(cert).map_err(|e| FetchError::parse_failure(host, e))?;

        Ok(CertificateReport {
            tested_server: host.to_string(),
            port,
            common_name: common_name(&subject)
                .unwrap_or(UNKNOWN_COMMON_NAME)
                .to_string(),
            start_date,
            end_date,
            subject_alternative_names: SubjectAltNames::from_x509(cert),
            thumbprint,
            issuer_name: issuer_display_name(common_name(&issuer).unwrap_or_default()),
            message: Some(format!(
                "Certificate retrieved from {}",
                display_address(host, port)
            )),
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.end_date < now
    }

    /// Whole days left until NotAfter, negative once expired.
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.end_date - now).num_days()
    }
}

/// DNS names of the Subject Alternative Name extension.
///
/// Displays (and serializes) as `"Not Available"` when the certificate
/// carries no DNS names, never as an empty list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectAltNames {
    Names(Vec<String>),
    NotAvailable,
}

impl SubjectAltNames {
    fn from_x509(cert: &X509Ref) -> Self {
        let names: Vec<String> = cert
            .subject_alt_names()
            .map(|stack| {
                stack
                    .iter()
                    .filter_map(|name| name.dnsname())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if names.is_empty() {
            SubjectAltNames::NotAvailable
        } else {
            SubjectAltNames::Names(names)
        }
    }

    pub fn names(&self) -> &[String] {
        match self {
            SubjectAltNames::Names(names) => names,
            SubjectAltNames::NotAvailable => &[],
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, SubjectAltNames::Names(_))
    }
}

impl fmt::Display for SubjectAltNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectAltNames::Names(names) => write!(f, "{}", names.join(", ")),
            SubjectAltNames::NotAvailable => write!(f, "{}", NOT_AVAILABLE),
        }
    }
}

impl Serialize for SubjectAltNames {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SubjectAltNames::Names(names) => names.serialize(serializer),
            SubjectAltNames::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

/// Returns the value following the first `CN=` in a rendered distinguished
/// name, up to the next comma or the end of the string.
///
/// This is plain string matching: escaped commas and multi-valued RDNs are
/// not understood.
pub fn common_name(dn: &str) -> Option<&str> {
    let start = dn.find("CN=")? + "CN=".len();
    let rest = &dn[start..];
    let value = match rest.find(',') {
        Some(end) => &rest[..end],
        None => rest,
    };
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Display name for an issuer CN. Only the exact value `R11` is rewritten.
pub fn issuer_display_name(issuer_cn: &str) -> String {
    if issuer_cn == R11_ISSUER {
        R11_DISPLAY_NAME.to_string()
    } else {
        issuer_cn.to_string()
    }
}

/// Renders a name as `CN=.., O=.., C=..`, most specific attribute first.
fn distinguished_name(name: &X509NameRef) -> String {
    let mut parts: Vec<String> = name
        .entries()
        .map(|entry| {
            let key = entry
                .object()
                .nid()
                .short_name()
                .map(str::to_string)
                .unwrap_or_else(|_| entry.object().to_string());
            let value = entry
                .data()
                .as_utf8()
                .map(|s| s.to_string())
                .unwrap_or_else(|_| String::from_utf8_lossy(entry.data().as_slice()).into_owned());
            format!("{}={}", key, value)
        })
        .collect();
    parts.reverse();
    parts.join(", ")
}

fn thumbprint(cert: &X509Ref) -> Result<String, ErrorStack> {
    let digest = cert.digest(MessageDigest::sha1())?;
    Ok(digest.iter().map(|b| format!("{:02X}", b)).collect())
}

fn asn1_to_utc(time: &Asn1TimeRef) -> Option<DateTime<Utc>> {
    let epoch = Asn1Time::from_unix(0).ok()?;
    let diff = epoch.diff(time).ok()?;
    DateTime::from_timestamp(i64::from(diff.days) * 86_400 + i64::from(diff.secs), 0)
}

fn display_address(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Knobs of a [`CertificateFetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Upper bound for resolving the host and establishing the TCP connection
    pub connect_timeout: Duration,
    /// Upper bound for the whole TLS handshake
    pub handshake_timeout: Duration,
    /// Accept any peer certificate and skip hostname verification
    pub insecure_skip_verify: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            insecure_skip_verify: false,
        }
    }
}

impl FetchOptions {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Disables peer certificate and hostname verification.
    ///
    /// Expired, self-signed and mismatched certificates are then all
    /// reported instead of failing the handshake.
    pub fn insecure_skip_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_verify = skip;
        self
    }
}

/// Connects to a host, completes a TLS handshake and reports the leaf
/// certificate. Holds no state between calls.
#[derive(Debug, Clone, Default)]
pub struct CertificateFetcher {
    options: FetchOptions,
}

impl CertificateFetcher {
    pub fn new(options: FetchOptions) -> Self {
        CertificateFetcher { options }
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Fetches the certificate presented by `host` on `port`.
    ///
    /// The socket and TLS session are owned by this call and closed before
    /// it returns, on success and on every error path.
    ///
    /// # Errors
    ///
    /// * `InvalidInput` - empty host or zero timeout
    /// * `DnsFailure` - host did not resolve
    /// * `Timeout` - resolve + connect, or the handshake, exceeded its budget
    /// * `ConnectionRefused` / `ConnectionFailed` - TCP level failure
    /// * `HandshakeFailure` - TLS negotiation failed
    /// * `NoCertificate` - peer presented no certificate
    /// * `ParseFailure` - certificate fields could not be decoded
    pub fn fetch(&self, host: &str, port: u16) -> Result<CertificateReport, FetchError> {
        if host.trim().is_empty() {
            return Err(FetchError::invalid_input("host", "cannot be empty"));
        }
        if self.options.connect_timeout.is_zero() {
            return Err(FetchError::invalid_input(
                "connect_timeout",
                "must be greater than zero",
            ));
        }
        if self.options.handshake_timeout.is_zero() {
            return Err(FetchError::invalid_input(
                "handshake_timeout",
                "must be greater than zero",
            ));
        }

        let address = display_address(host, port);
        let tcp_stream = self.connect(host, port, &address)?;
        let tcp_stream = DeadlineStream::new(tcp_stream, self.options.handshake_timeout);

        let handshake_failure = |e: ErrorStack| FetchError::HandshakeFailure {
            host: host.to_string(),
            details: e.to_string(),
        };
        let configuration = self
            .connector()
            .and_then(|connector| connector.configure())
            .map_err(handshake_failure)?
            .verify_hostname(!self.options.insecure_skip_verify);

        debug!(
            host,
            port,
            insecure = self.options.insecure_skip_verify,
            "starting TLS handshake"
        );
        let mut stream = configuration
            .connect(host, tcp_stream)
            .map_err(|e| handshake_error(host, &address, e))?;

        let report = leaf_report(host, port, stream.ssl());

        if let Err(e) = stream.shutdown() {
            debug!(host, error = %e, "close notify failed");
        }

        let report = report?;
        info!(
            host,
            port,
            common_name = %report.common_name,
            thumbprint = %report.thumbprint,
            "certificate retrieved"
        );
        Ok(report)
    }

    /// Resolves and connects within one `connect_timeout` budget.
    fn connect(&self, host: &str, port: u16, address: &str) -> Result<TcpStream, FetchError> {
        let deadline = Instant::now() + self.options.connect_timeout;
        let socket_addrs = match host.parse::<IpAddr>() {
            Ok(ip) => vec![SocketAddr::new(ip, port)],
            Err(_) => {
                let lookup = (host.to_string(), port);
                resolve_within(host, address, deadline, move || {
                    lookup.to_socket_addrs().map(Iterator::collect)
                })?
            }
        };
        debug!(host, resolved = socket_addrs.len(), "resolved host");

        connect_any(&socket_addrs, address, deadline).map_err(|err| match err {
            Some(err) => err,
            None => FetchError::DnsFailure {
                host: host.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
            },
        })
    }

    fn connector(&self) -> Result<SslConnector, ErrorStack> {
        let mut builder = SslConnector::builder(SslMethod::tls())?;
        if self.options.insecure_skip_verify {
            builder.set_verify(SslVerifyMode::NONE);
        }
        Ok(builder.build())
    }
}

/// Runs `lookup` on a helper thread and waits for it until `deadline`.
///
/// The system resolver cannot be cancelled; a lookup that outlives the
/// deadline finishes on its own thread and its result is dropped.
fn resolve_within<F>(
    host: &str,
    address: &str,
    deadline: Instant,
    lookup: F,
) -> Result<Vec<SocketAddr>, FetchError>
where
    F: FnOnce() -> io::Result<Vec<SocketAddr>> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let _ = sender.send(lookup());
    });

    let remaining = deadline.saturating_duration_since(Instant::now());
    match receiver.recv_timeout(remaining) {
        Ok(Ok(socket_addrs)) => Ok(socket_addrs),
        Ok(Err(source)) => Err(FetchError::DnsFailure {
            host: host.to_string(),
            source,
        }),
        Err(RecvTimeoutError::Timeout) => Err(FetchError::timeout(address, "dns resolve")),
        Err(RecvTimeoutError::Disconnected) => Err(FetchError::DnsFailure {
            host: host.to_string(),
            source: io::Error::new(io::ErrorKind::Other, "resolver thread exited"),
        }),
    }
}

/// Tries each address in order with whatever is left before `deadline`.
///
/// Returns the last failure, or `None` when there was nothing to try.
fn connect_any(
    socket_addrs: &[SocketAddr],
    address: &str,
    deadline: Instant,
) -> Result<TcpStream, Option<FetchError>> {
    let mut last_error = None;
    for socket_addr in socket_addrs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Some(FetchError::timeout(address, "tcp connect")));
        }
        debug!(%socket_addr, timeout = ?remaining, "connecting");
        match TcpStream::connect_timeout(socket_addr, remaining) {
            Ok(stream) => return Ok(stream),
            Err(source) => {
                let err = FetchError::from_connect(address.to_string(), source);
                debug!(%socket_addr, error = %err, "connect attempt failed");
                last_error = Some(err);
            }
        }
    }
    Err(last_error)
}

/// TCP stream whose reads and writes all share one deadline, so a peer
/// trickling bytes cannot stretch the handshake past it.
#[derive(Debug)]
struct DeadlineStream {
    inner: TcpStream,
    deadline: Instant,
}

impl DeadlineStream {
    fn new(inner: TcpStream, budget: Duration) -> Self {
        DeadlineStream {
            inner,
            deadline: Instant::now() + budget,
        }
    }

    fn remaining(&self) -> io::Result<Duration> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            Err(io::Error::new(io::ErrorKind::TimedOut, "handshake deadline exceeded"))
        } else {
            Ok(remaining)
        }
    }
}

impl Read for DeadlineStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining()?;
        self.inner.set_read_timeout(Some(remaining))?;
        self.inner.read(buf)
    }
}

impl Write for DeadlineStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let remaining = self.remaining()?;
        self.inner.set_write_timeout(Some(remaining))?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reads the leaf certificate of an established session.
fn leaf_report(host: &str, port: u16, ssl: &SslRef) -> Result<CertificateReport, FetchError> {
    match ssl.peer_certificate() {
        Some(cert) => CertificateReport::from_x509(host, port, &cert),
        None => Err(FetchError::NoCertificate {
            host: host.to_string(),
        }),
    }
}

fn handshake_error(host: &str, address: &str, err: HandshakeError<DeadlineStream>) -> FetchError {
    let timeout = || FetchError::timeout(address, "tls handshake");

    match err {
        // A socket timeout surfaces as WANT_READ/WANT_WRITE, the deadline as TimedOut
        HandshakeError::WouldBlock(_) => timeout(),
        HandshakeError::Failure(mid) => {
            let timed_out = mid
                .error()
                .io_error()
                .map(|e| matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut))
                .unwrap_or(false);
            if timed_out {
                return timeout();
            }
            let verify_result = mid.ssl().verify_result();
            let details = if verify_result == X509VerifyResult::OK {
                mid.error().to_string()
            } else {
                format!("{} ({})", mid.error(), verify_result.error_string())
            };
            FetchError::HandshakeFailure {
                host: host.to_string(),
                details,
            }
        }
        HandshakeError::SetupFailure(stack) => FetchError::HandshakeFailure {
            host: host.to_string(),
            details: stack.to_string(),
        },
    }
}

/// Fetches the leaf certificate of `host:port` with the given options.
pub fn fetch_certificate(
    host: &str,
    port: u16,
    options: FetchOptions,
) -> Result<CertificateReport, FetchError> {
    CertificateFetcher::new(options).fetch(host, port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use openssl::bn::BigNum;
    use openssl::ec::{EcGroup, EcKey};
    use openssl::nid::Nid;
    use openssl::pkey::PKey;
    use openssl::x509::extension::SubjectAlternativeName;
    use openssl::x509::{X509NameBuilder, X509};

    fn build_cert(subject_cn: Option<&str>, issuer_cn: &str, sans: &[&str]) -> X509 {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

        let mut subject = X509NameBuilder::new().unwrap();
        subject
            .append_entry_by_nid(Nid::ORGANIZATIONNAME, "Example Org")
            .unwrap();
        if let Some(cn) = subject_cn {
            subject.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
        }
        let subject = subject.build();

        let mut issuer = X509NameBuilder::new().unwrap();
        issuer.append_entry_by_nid(Nid::COUNTRYNAME, "US").unwrap();
        issuer
            .append_entry_by_nid(Nid::ORGANIZATIONNAME, "Let's Encrypt")
            .unwrap();
        issuer.append_entry_by_nid(Nid::COMMONNAME, issuer_cn).unwrap();
        let issuer = issuer.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(7).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&subject).unwrap();
        builder.set_issuer_name(&issuer).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder
            .set_not_before(&Asn1Time::from_unix(1_700_000_000).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::from_unix(1_707_776_000).unwrap())
            .unwrap();
        if !sans.is_empty() {
            let mut san = SubjectAlternativeName::new();
            for name in sans {
                san.dns(name);
            }
            let extension = san.build(&builder.x509v3_context(None, None)).unwrap();
            builder.append_extension(extension).unwrap();
        }
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        builder.build()
    }

    #[test]
    fn test_common_name_extraction() {
        assert_eq!(
            common_name("CN=*.google.com, O=Google LLC"),
            Some("*.google.com")
        );
        assert_eq!(common_name("O=Example, CN=example.com"), Some("example.com"));
        assert_eq!(common_name("O=Example, C=US"), None);
        assert_eq!(common_name("CN=, O=Example"), None);
        assert_eq!(common_name(""), None);
    }

    #[test]
    fn test_issuer_override_is_exact_match() {
        assert_eq!(issuer_display_name("R11"), "R11 Let's Encrypt Authority");
        assert_eq!(issuer_display_name("R12"), "R12");
        assert_eq!(issuer_display_name("R110"), "R110");
        assert_eq!(issuer_display_name("r11"), "r11");
        assert_eq!(issuer_display_name(""), "");
    }

    #[test]
    fn test_report_from_certificate() {
        let cert = build_cert(
            Some("www.example.com"),
            "R11",
            &["www.example.com", "example.com"],
        );
        let report = CertificateReport::from_x509("www.example.com", 443, &cert).unwrap();

        assert_eq!(report.tested_server, "www.example.com");
        assert_eq!(report.common_name, "www.example.com");
        assert_eq!(report.issuer_name, "R11 Let's Encrypt Authority");
        assert_eq!(
            report.subject_alternative_names,
            SubjectAltNames::Names(vec![
                "www.example.com".to_string(),
                "example.com".to_string()
            ])
        );
        assert_eq!(
            report.start_date,
            Utc.timestamp_opt(1_700_000_000, 0).unwrap()
        );
        assert_eq!(report.end_date, Utc.timestamp_opt(1_707_776_000, 0).unwrap());
        assert!(report.end_date > report.start_date);
    }

    #[test]
    fn test_thumbprint_format() {
        let cert = build_cert(Some("example.com"), "R12", &[]);
        let report = CertificateReport::from_x509("example.com", 443, &cert).unwrap();

        assert_eq!(report.thumbprint.len(), 40);
        assert!(report
            .thumbprint
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));

        let expected: String = cert
            .digest(MessageDigest::sha1())
            .unwrap()
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect();
        assert_eq!(report.thumbprint, expected);
    }

    #[test]
    fn test_missing_fields_use_sentinels() {
        let cert = build_cert(None, "R12", &[]);
        let report = CertificateReport::from_x509("10.0.0.5", 8443, &cert).unwrap();

        assert_eq!(report.common_name, "Unknown");
        assert_eq!(report.issuer_name, "R12");
        assert_eq!(report.subject_alternative_names, SubjectAltNames::NotAvailable);
        assert_eq!(report.subject_alternative_names.to_string(), "Not Available");
        assert_eq!(
            report.message.as_deref(),
            Some("Certificate retrieved from 10.0.0.5:8443")
        );
    }

    #[test]
    fn test_report_serializes_source_field_names() {
        let cert = build_cert(Some("example.com"), "R11", &[]);
        let report = CertificateReport::from_x509("example.com", 443, &cert).unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["TestedServer"], "example.com");
        assert_eq!(json["CommonName"], "example.com");
        assert_eq!(json["IssuerName"], "R11 Let's Encrypt Authority");
        assert_eq!(json["SubjectAlternativeNames"], "Not Available");
        assert!(json["StartDate"].is_string());
        assert!(json["EndDate"].is_string());
    }

    #[test]
    fn test_san_serializes_as_list_when_present() {
        let sans = SubjectAltNames::Names(vec!["a.example".to_string(), "b.example".to_string()]);
        assert_eq!(
            serde_json::to_string(&sans).unwrap(),
            r#"["a.example","b.example"]"#
        );
        assert_eq!(sans.to_string(), "a.example, b.example");
        assert!(sans.is_available());
        assert!(SubjectAltNames::NotAvailable.names().is_empty());
    }

    #[test]
    fn test_expiry_helpers() {
        let cert = build_cert(Some("example.com"), "R11", &[]);
        let report = CertificateReport::from_x509("example.com", 443, &cert).unwrap();

        let before = Utc.timestamp_opt(1_707_776_000 - 10 * 86_400, 0).unwrap();
        assert!(!report.is_expired_at(before));
        assert_eq!(report.days_until_expiry(before), 10);

        let after = Utc.timestamp_opt(1_707_776_000 + 86_400, 0).unwrap();
        assert!(report.is_expired_at(after));
        assert_eq!(report.days_until_expiry(after), -1);
    }

    #[test]
    fn test_distinguished_name_rendering() {
        let cert = build_cert(Some("example.com"), "R11", &[]);
        assert_eq!(
            distinguished_name(cert.issuer_name()),
            "CN=R11, O=Let's Encrypt, C=US"
        );
        assert_eq!(
            distinguished_name(cert.subject_name()),
            "CN=example.com, O=Example Org"
        );
    }

    #[test]
    fn test_fetch_rejects_invalid_input() {
        let fetcher = CertificateFetcher::default();
        let err = fetcher.fetch("  ", 443).unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::InvalidInput);

        let fetcher = CertificateFetcher::new(
            FetchOptions::default().connect_timeout(Duration::from_secs(0)),
        );
        let err = fetcher.fetch("example.com", 443).unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::InvalidInput);
        assert!(err.to_string().contains("connect_timeout"));
    }

    #[test]
    fn test_default_options() {
        let options = FetchOptions::default();
        assert_eq!(options.connect_timeout, Duration::from_secs(1));
        assert_eq!(options.handshake_timeout, Duration::from_secs(5));
        assert!(!options.insecure_skip_verify);
        assert!(options.insecure_skip_verify(true).insecure_skip_verify);
    }

    #[test]
    fn test_display_address() {
        assert_eq!(display_address("example.com", 443), "example.com:443");
        assert_eq!(display_address("::1", 8443), "[::1]:8443");
    }

    #[test]
    fn test_slow_resolver_hits_connect_budget() {
        let started = Instant::now();
        let deadline = started + Duration::from_millis(200);
        let err = resolve_within("slow.example", "slow.example:443", deadline, || {
            thread::sleep(Duration::from_secs(3));
            Ok(Vec::new())
        })
        .unwrap_err();

        assert_eq!(err.kind(), FetchErrorKind::Timeout);
        assert_eq!(
            err.to_string(),
            "Operation timed out: dns resolve to slow.example:443"
        );
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_resolver_error_is_dns_failure() {
        let deadline = Instant::now() + Duration::from_secs(1);
        let err = resolve_within("nowhere.invalid", "nowhere.invalid:443", deadline, || {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such host"))
        })
        .unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::DnsFailure);
    }

    #[test]
    fn test_connect_moves_on_to_next_address() {
        let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let closed_addr = closed.local_addr().unwrap();
        drop(closed);
        let open = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let open_addr = open.local_addr().unwrap();

        let deadline = Instant::now() + Duration::from_secs(1);
        let stream = connect_any(&[closed_addr, open_addr], "localhost:443", deadline).unwrap();
        assert_eq!(stream.peer_addr().unwrap(), open_addr);
    }

    #[test]
    fn test_connect_stops_once_budget_is_spent() {
        let open = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let open_addr = open.local_addr().unwrap();

        let err = connect_any(&[open_addr], "localhost:443", Instant::now()).unwrap_err();
        assert_eq!(err.map(|e| e.kind()), Some(FetchErrorKind::Timeout));
        assert!(connect_any(&[], "localhost:443", Instant::now())
            .unwrap_err()
            .is_none());
    }

    #[test]
    fn test_deadline_stream_refuses_io_after_deadline() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let tcp = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let mut stream = DeadlineStream::new(tcp, Duration::from_millis(50));
        thread::sleep(Duration::from_millis(80));

        let mut buf = [0u8; 8];
        let err = stream.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        let err = stream.write(b"hello").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_session_without_peer_certificate() {
        let context = openssl::ssl::SslContext::builder(SslMethod::tls())
            .unwrap()
            .build();
        let ssl = openssl::ssl::Ssl::new(&context).unwrap();

        let err = leaf_report("anon.example", 443, &ssl).unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::NoCertificate);
        assert!(err.to_string().contains("anon.example"));
    }
}
