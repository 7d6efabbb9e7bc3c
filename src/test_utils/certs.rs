//! OpenSSL-generated certificate fixtures. Also compiled into the
//! integration tests, so it only names `super::CertMaterial`.

use super::CertMaterial;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::x509::{X509Builder, X509NameBuilder};
use std::sync::atomic::{AtomicU32, Ordering};

static SERIAL: AtomicU32 = AtomicU32::new(1);

/// A fresh self-signed P-256 certificate valid from now for 30 days.
pub fn self_signed(common_name: &str) -> CertMaterial {
    build(Some(common_name), 0, 30)
}

pub fn self_signed_with_validity(common_name: &str, start_days: u32, end_days: u32) -> CertMaterial {
    build(Some(common_name), start_days, end_days)
}

/// A certificate whose subject carries only an organization, no CN.
pub fn self_signed_without_cn() -> CertMaterial {
    build(None, 0, 30)
}

fn build(common_name: Option<&str>, start_days: u32, end_days: u32) -> CertMaterial {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    match common_name {
        Some(cn) => name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap(),
        None => name
            .append_entry_by_nid(Nid::ORGANIZATIONNAME, "vault-cert-sync tests")
            .unwrap(),
    }
    let name = name.build();

    let serial = BigNum::from_u32(SERIAL.fetch_add(1, Ordering::SeqCst))
        .unwrap()
        .to_asn1_integer()
        .unwrap();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(start_days).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(end_days).unwrap())
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    CertMaterial {
        cert: String::from_utf8(builder.build().to_pem().unwrap()).unwrap(),
        key: String::from_utf8(key.private_key_to_pem_pkcs8().unwrap()).unwrap(),
    }
}
