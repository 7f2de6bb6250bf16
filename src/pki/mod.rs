//! Ephemeral PKI for plugin sessions
//!
//! Each side of a plugin session invents its own trust root: a fresh ECDSA
//! key and a self-signed certificate that is valid for a day and never
//! leaves process memory.
//!
//! # Security Model
//!
//! - Host and plugin each generate a key pair at startup
//! - The certificate is its own CA (`ca=true`), there is no external issuer
//! - Certificates are exchanged out of band (environment / handshake line)
//! - Each side trusts exactly the certificate the other side announced
//! - Nothing is persisted, nothing is renewed or revoked

use std::time::{SystemTime, UNIX_EPOCH};

use aws_lc_rs::signature::{
    UnparsedPublicKey, VerificationAlgorithm, ECDSA_P256_SHA256_ASN1, ECDSA_P384_SHA384_ASN1,
    ECDSA_P521_SHA512_ASN1,
};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SerialNumber,
    PKCS_ECDSA_P521_SHA512,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use thiserror::Error;
use ::time::OffsetDateTime;
use x509_parser::extensions::GeneralName;
use x509_parser::oid_registry::{
    OID_SIG_ECDSA_WITH_SHA256, OID_SIG_ECDSA_WITH_SHA384, OID_SIG_ECDSA_WITH_SHA512,
};
use x509_parser::prelude::*;
use zeroize::Zeroizing;

use crate::LOOPBACK_HOSTNAME;

/// Allowance for clock skew between host and plugin
pub const CLOCK_SKEW_ALLOWANCE: ::time::Duration = ::time::Duration::seconds(60);

/// How long an ephemeral certificate stays valid
pub const CERTIFICATE_VALIDITY: ::time::Duration = ::time::Duration::days(1);

/// PKI errors
#[derive(Debug, Error)]
pub enum PkiError {
    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Certificate generation failed
    #[error("certificate generation failed: {0}")]
    CertificateGenerationFailed(String),

    /// Certificate parsing error
    #[error("certificate parsing error: {0}")]
    ParseError(String),

    /// Signature algorithm we cannot verify
    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Result type for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;

/// Parse PEM-encoded data and return the DER bytes
pub fn parse_pem(pem_data: &str) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| PkiError::ParseError(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.contents().to_vec())
}

/// Encode DER certificate bytes as PEM
pub fn certificate_pem(der: &[u8]) -> String {
    ::pem::encode(&::pem::Pem::new("CERTIFICATE", der.to_vec()))
}

/// Key pair and self-signed certificate for one plugin session
///
/// The private key is zeroized when the identity is dropped.
pub struct EphemeralIdentity {
    cert_der: Vec<u8>,
    cert_pem: String,
    key_der: Zeroizing<Vec<u8>>,
    key_pem: Zeroizing<String>,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl EphemeralIdentity {
    /// Generate a fresh identity valid from one minute ago until a day from now
    pub fn generate() -> Result<Self> {
        Self::generate_at(OffsetDateTime::now_utc())
    }

    /// Generate a fresh identity anchored at the given instant
    pub fn generate_at(now: OffsetDateTime) -> Result<Self> {
        let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P521_SHA512).map_err(|e| {
            PkiError::KeyGenerationFailed(format!("failed to generate P-521 key: {}", e))
        })?;

        let mut params =
            CertificateParams::new(vec![LOOPBACK_HOSTNAME.to_string()]).map_err(|e| {
                PkiError::CertificateGenerationFailed(format!("invalid subject name: {}", e))
            })?;

        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(LOOPBACK_HOSTNAME.to_string()),
        );
        params.distinguished_name = dn;

        // Self-signed and its own trust anchor
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
            KeyUsagePurpose::KeyAgreement,
            KeyUsagePurpose::KeyCertSign,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        params.serial_number = Some(SerialNumber::from(rand::random::<u64>() >> 1));

        let not_before = now - CLOCK_SKEW_ALLOWANCE;
        let not_after = now + CERTIFICATE_VALIDITY;
        params.not_before = not_before;
        params.not_after = not_after;

        let cert = params.self_signed(&key_pair).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("failed to self-sign: {}", e))
        })?;

        Ok(Self {
            cert_der: cert.der().to_vec(),
            cert_pem: cert.pem(),
            key_der: Zeroizing::new(key_pair.serialize_der()),
            key_pem: Zeroizing::new(key_pair.serialize_pem()),
            not_before,
            not_after,
        })
    }

    /// Certificate in DER form (what the plugin puts on the handshake line)
    pub fn certificate_der(&self) -> &[u8] {
        &self.cert_der
    }

    /// Certificate in PEM form (what the host puts in the environment)
    pub fn certificate_pem(&self) -> &str {
        &self.cert_pem
    }

    /// PKCS#8 private key in PEM form
    pub fn private_key_pem(&self) -> &str {
        &self.key_pem
    }

    /// Start of the validity window
    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    /// End of the validity window
    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    /// Certificate chain for rustls (a single self-signed certificate)
    pub fn rustls_chain(&self) -> Vec<CertificateDer<'static>> {
        vec![CertificateDer::from(self.cert_der.clone())]
    }

    /// Private key for rustls
    pub fn rustls_private_key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key_der.to_vec()))
    }
}

impl std::fmt::Debug for EphemeralIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralIdentity")
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

/// Parsed view of a certificate, used for logging and checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Subject common name
    pub common_name: String,
    /// Issuer common name
    pub issuer_common_name: String,
    /// Validity start (unix seconds)
    pub not_before: i64,
    /// Validity end (unix seconds)
    pub not_after: i64,
    /// BasicConstraints CA flag
    pub is_ca: bool,
    /// SubjectAlternativeName DNS entries
    pub dns_names: Vec<String>,
    /// KeyUsage digitalSignature
    pub digital_signature: bool,
    /// KeyUsage keyEncipherment
    pub key_encipherment: bool,
    /// KeyUsage keyAgreement
    pub key_agreement: bool,
    /// KeyUsage keyCertSign
    pub key_cert_sign: bool,
    /// ExtendedKeyUsage serverAuth
    pub server_auth: bool,
    /// ExtendedKeyUsage clientAuth
    pub client_auth: bool,
}

fn parse_der(der: &[u8]) -> Result<X509Certificate<'_>> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {}", e)))?;
    Ok(cert)
}

fn common_name(name: &X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or("")
        .to_string()
}

/// Parse a DER certificate into a [`CertificateInfo`]
pub fn inspect_certificate(der: &[u8]) -> Result<CertificateInfo> {
    let cert = parse_der(der)?;
    let ext_err = |e: X509Error| PkiError::ParseError(format!("bad extension: {}", e));

    let is_ca = cert
        .basic_constraints()
        .map_err(ext_err)?
        .map(|bc| bc.value.ca)
        .unwrap_or(false);

    let dns_names = cert
        .subject_alternative_name()
        .map_err(ext_err)?
        .map(|san| {
            san.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(dns.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let (digital_signature, key_encipherment, key_agreement, key_cert_sign) = cert
        .key_usage()
        .map_err(ext_err)?
        .map(|ku| {
            (
                ku.value.digital_signature(),
                ku.value.key_encipherment(),
                ku.value.key_agreement(),
                ku.value.key_cert_sign(),
            )
        })
        .unwrap_or_default();
    let eku = cert
        .extended_key_usage()
        .map_err(ext_err)?
        .map(|eku| (eku.value.server_auth, eku.value.client_auth))
        .unwrap_or((false, false));

    Ok(CertificateInfo {
        common_name: common_name(cert.subject()),
        issuer_common_name: common_name(cert.issuer()),
        not_before: cert.validity().not_before.timestamp(),
        not_after: cert.validity().not_after.timestamp(),
        is_ca,
        dns_names,
        digital_signature,
        key_encipherment,
        key_agreement,
        key_cert_sign,
        server_auth: eku.0,
        client_auth: eku.1,
    })
}

/// Verification result for a self-signed certificate
#[derive(Debug, Clone)]
pub struct VerificationResult {
    /// Whether the certificate is valid
    pub valid: bool,
    /// Reason if invalid
    pub reason: Option<String>,
}

impl VerificationResult {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Current unix time in seconds
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn verification_algorithm(
    cert: &X509Certificate<'_>,
) -> Result<&'static dyn VerificationAlgorithm> {
    let oid = &cert.signature_algorithm.algorithm;
    let key_len = cert.public_key().subject_public_key.data.len();

    // Uncompressed EC points: 65 (P-256), 97 (P-384), 133 (P-521) bytes
    if *oid == OID_SIG_ECDSA_WITH_SHA256 && key_len == 65 {
        Ok(&ECDSA_P256_SHA256_ASN1)
    } else if *oid == OID_SIG_ECDSA_WITH_SHA384 && key_len == 97 {
        Ok(&ECDSA_P384_SHA384_ASN1)
    } else if *oid == OID_SIG_ECDSA_WITH_SHA512 && key_len == 133 {
        Ok(&ECDSA_P521_SHA512_ASN1)
    } else {
        Err(PkiError::UnsupportedAlgorithm(format!(
            "{} with {} byte key",
            oid, key_len
        )))
    }
}

/// Verify that a certificate is a valid trust root for itself at `now`
///
/// Checks the signature against the certificate's own public key, the
/// CA flag and the validity window.
pub fn verify_self_signed(cert_der: &[u8], now: i64) -> Result<VerificationResult> {
    let cert = parse_der(cert_der)?;

    let algorithm = verification_algorithm(&cert)?;
    let public_key: &[u8] = &cert.public_key().subject_public_key.data;
    let signature: &[u8] = &cert.signature_value.data;
    let tbs: &[u8] = cert.tbs_certificate.as_ref();

    if UnparsedPublicKey::new(algorithm, public_key)
        .verify(tbs, signature)
        .is_err()
    {
        return Ok(VerificationResult::invalid("signature verification failed"));
    }

    let is_ca = cert
        .basic_constraints()
        .ok()
        .flatten()
        .is_some_and(|bc| bc.value.ca);
    if !is_ca {
        return Ok(VerificationResult::invalid(
            "certificate cannot act as its own trust root (ca=false)",
        ));
    }

    check_validity(&cert, now)
}

/// Check only the validity window of a DER certificate
pub fn verify_validity(cert_der: &[u8], now: i64) -> Result<VerificationResult> {
    let cert = parse_der(cert_der)?;
    check_validity(&cert, now)
}

fn check_validity(cert: &X509Certificate<'_>, now: i64) -> Result<VerificationResult> {
    if now < cert.validity().not_before.timestamp() {
        return Ok(VerificationResult::invalid("certificate not yet valid"));
    }
    if now > cert.validity().not_after.timestamp() {
        return Ok(VerificationResult::invalid("certificate expired"));
    }
    Ok(VerificationResult::ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_can_be_generated() {
        let identity = EphemeralIdentity::generate().unwrap();
        assert!(identity.certificate_pem().contains("BEGIN CERTIFICATE"));
        assert!(identity.private_key_pem().contains("BEGIN PRIVATE KEY"));
        assert!(!identity.certificate_der().is_empty());
    }

    #[test]
    fn certificate_pem_matches_der() {
        let identity = EphemeralIdentity::generate().unwrap();
        let der = parse_pem(identity.certificate_pem()).unwrap();
        assert_eq!(der, identity.certificate_der());
        assert_eq!(parse_pem(&certificate_pem(&der)).unwrap(), der);
    }

    #[test]
    fn certificate_carries_loopback_identity_and_extensions() {
        let identity = EphemeralIdentity::generate().unwrap();
        let info = inspect_certificate(identity.certificate_der()).unwrap();

        assert_eq!(info.common_name, "localhost");
        assert_eq!(info.issuer_common_name, "localhost");
        assert_eq!(info.dns_names, vec!["localhost".to_string()]);
        assert!(info.is_ca);
        assert!(info.digital_signature);
        assert!(info.key_encipherment);
        assert!(info.key_agreement);
        assert!(info.key_cert_sign);
        assert!(info.server_auth);
        assert!(info.client_auth);
    }

    #[test]
    fn validity_window_brackets_generation_time() {
        let before = unix_now();
        let identity = EphemeralIdentity::generate().unwrap();
        let info = inspect_certificate(identity.certificate_der()).unwrap();

        assert!(info.not_before <= before);
        assert!(info.not_after >= before);
        // one minute of skew, one day of validity
        assert!(before - info.not_before <= 61);
        assert!(info.not_after - info.not_before <= 86_400 + 61);
        assert_eq!(identity.not_before().unix_timestamp(), info.not_before);
        assert_eq!(identity.not_after().unix_timestamp(), info.not_after);
    }

    #[test]
    fn generated_certificate_self_validates() {
        let identity = EphemeralIdentity::generate().unwrap();
        let result = verify_self_signed(identity.certificate_der(), unix_now()).unwrap();
        assert!(result.valid, "{:?}", result.reason);
        assert!(result.reason.is_none());
    }

    #[test]
    fn each_identity_is_fresh() {
        let a = EphemeralIdentity::generate().unwrap();
        let b = EphemeralIdentity::generate().unwrap();
        assert_ne!(a.certificate_der(), b.certificate_der());
        assert_ne!(a.private_key_pem(), b.private_key_pem());
    }

    #[test]
    fn expired_certificate_rejected() {
        let identity = EphemeralIdentity::generate().unwrap();
        let two_days = 2 * 86_400;
        let result = verify_self_signed(identity.certificate_der(), unix_now() + two_days).unwrap();
        assert!(!result.valid);
        assert_eq!(result.reason.as_deref(), Some("certificate expired"));
    }

    #[test]
    fn not_yet_valid_certificate_rejected() {
        let identity = EphemeralIdentity::generate().unwrap();
        let result = verify_validity(identity.certificate_der(), unix_now() - 3_600).unwrap();
        assert!(!result.valid);
        assert_eq!(result.reason.as_deref(), Some("certificate not yet valid"));
    }

    #[test]
    fn identity_anchored_in_the_past_is_expired_now() {
        let anchor = OffsetDateTime::now_utc() - ::time::Duration::days(3);
        let identity = EphemeralIdentity::generate_at(anchor).unwrap();
        let result = verify_validity(identity.certificate_der(), unix_now()).unwrap();
        assert!(!result.valid);
    }

    #[test]
    fn tampered_certificate_fails_signature_check() {
        let identity = EphemeralIdentity::generate().unwrap();
        let mut der = identity.certificate_der().to_vec();
        // Flip a bit inside the validity/subject area of the TBS certificate
        let idx = der.len() / 3;
        der[idx] ^= 0x01;

        match verify_self_signed(&der, unix_now()) {
            Ok(result) => assert!(!result.valid),
            // The flip may also break DER structure
            Err(PkiError::ParseError(_)) | Err(PkiError::UnsupportedAlgorithm(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_der_is_a_parse_error() {
        let result = inspect_certificate(b"not valid DER data");
        match result {
            Err(PkiError::ParseError(msg)) => assert!(msg.contains("failed to parse certificate")),
            other => panic!("Expected ParseError, got {other:?}"),
        }
    }

    #[test]
    fn pem_parsing_errors() {
        let result = parse_pem("this is not valid PEM data at all");
        match result {
            Err(PkiError::ParseError(msg)) => assert!(msg.contains("parse PEM")),
            _ => panic!("Expected ParseError"),
        }
    }

    #[test]
    fn debug_output_never_contains_key_material() {
        let identity = EphemeralIdentity::generate().unwrap();
        let debug = format!("{:?}", identity);
        assert!(debug.contains("EphemeralIdentity"));
        assert!(!debug.contains("PRIVATE KEY"));
    }

    #[test]
    fn rustls_material_is_exported() {
        let identity = EphemeralIdentity::generate().unwrap();
        let chain = identity.rustls_chain();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].as_ref(), identity.certificate_der());
        assert!(matches!(identity.rustls_private_key(), PrivateKeyDer::Pkcs8(_)));
    }
}
