//! Local TLS server presenting generated certificates.

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{SslAcceptor, SslMethod};
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::{X509NameBuilder, X509};
use std::io::Write;
use std::net::{SocketAddr, TcpListener};
use std::thread;
use std::time::Duration;

pub struct TestCert {
    pub cert: X509,
    pub key: PKey<Private>,
}

pub fn generate_cert(subject_cn: Option<&str>, issuer_cn: &str, sans: &[&str]) -> TestCert {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut subject = X509NameBuilder::new().unwrap();
    subject
        .append_entry_by_nid(Nid::ORGANIZATIONNAME, "Test Org")
        .unwrap();
    if let Some(cn) = subject_cn {
        subject.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    }
    let subject = subject.build();

    let mut issuer = X509NameBuilder::new().unwrap();
    issuer.append_entry_by_nid(Nid::COUNTRYNAME, "US").unwrap();
    issuer.append_entry_by_nid(Nid::COMMONNAME, issuer_cn).unwrap();
    let issuer = issuer.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(42).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&subject).unwrap();
    builder.set_issuer_name(&issuer).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(30).unwrap())
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

    TestCert {
        cert: builder.build(),
        key,
    }
}

/// Serves `connections` TLS handshakes on a loopback port, then stops.
pub fn serve(cert: &TestCert, connections: usize) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
    acceptor.set_private_key(&cert.key).unwrap();
    acceptor.set_certificate(&cert.cert).unwrap();
    let acceptor = acceptor.build();

    thread::spawn(move || {
        for stream in listener.incoming().take(connections).flatten() {
            if let Ok(mut tls) = acceptor.accept(stream) {
                let _ = tls.shutdown();
            }
        }
    });

    addr
}

/// Accepts one connection, announces a 16000 byte handshake record and then
/// sends one byte of it every `interval` until the client goes away.
pub fn serve_trickle(interval: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            if stream.write_all(&[0x16, 0x03, 0x03, 0x3E, 0x80]).is_err() {
                return;
            }
            for _ in 0..16_000 {
                thread::sleep(interval);
                if stream.write_all(&[0x00]).is_err() {
                    return;
                }
            }
        }
    });

    addr
}
