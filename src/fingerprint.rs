//! Certificate fingerprints.
//!
//! A fingerprint is the lowercase hex SHA-256 of the first certificate's DER
//! encoding. It is only ever compared for equality; nothing here verifies
//! a chain or a signature.

use crate::error::CertSyncError;
use openssl::asn1::Asn1Time;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::x509::X509;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the reconciler needs to know about a certificate.
#[derive(Debug, Clone)]
pub struct CertSummary {
    pub fingerprint: Fingerprint,
    pub subject: Option<String>,
    pub not_before: String,
    pub not_after: String,
    /// Whether "now" lies inside the validity window.
    pub valid_now: bool,
}

pub fn fingerprint(pem_cert: &str) -> Result<Fingerprint, CertSyncError> {
    let cert = parse(pem_cert)?;
    digest(&cert)
}

pub fn inspect(pem_cert: &str) -> Result<CertSummary, CertSyncError> {
    let cert = parse(pem_cert)?;
    let now = Asn1Time::days_from_now(0).map_err(parse_error)?;
    let started = cert.not_before().compare(&now).map_err(parse_error)? != Ordering::Greater;
    let not_expired = cert.not_after().compare(&now).map_err(parse_error)? != Ordering::Less;
    let subject = cert
        .subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().to_string().ok());

    Ok(CertSummary {
        fingerprint: digest(&cert)?,
        subject,
        not_before: cert.not_before().to_string(),
        not_after: cert.not_after().to_string(),
        valid_now: started && not_expired,
    })
}

/// Parses the first certificate of a PEM bundle.
fn parse(pem_cert: &str) -> Result<X509, CertSyncError> {
    if pem_cert.trim().is_empty() {
        return Err(CertSyncError::Parse("empty certificate".to_string()));
    }
    X509::from_pem(pem_cert.as_bytes()).map_err(parse_error)
}

fn digest(cert: &X509) -> Result<Fingerprint, CertSyncError> {
    let bytes = cert.digest(MessageDigest::sha256()).map_err(parse_error)?;
    Ok(Fingerprint(
        bytes.iter().map(|b| format!("{:02x}", b)).collect(),
    ))
}

fn parse_error(e: openssl::error::ErrorStack) -> CertSyncError {
    CertSyncError::Parse(e.to_string())
}
