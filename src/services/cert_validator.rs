//! Certificate validation service.
//!
//! Extracts the identity and usage extensions of signer certificates and
//! applies the certificate usage policy on top of the chain validation done
//! by the trust store.

use der::asn1::ObjectIdentifier;
use der::{Decode, Encode, Tag, Tagged};
use sha2::{Digest, Sha256};
use x509_cert::ext::pkix::{ExtendedKeyUsage, KeyUsage, SubjectKeyIdentifier};
use x509_cert::name::Name;
use x509_cert::Certificate;

use crate::domain::constants::{
    OID_ANY_EXTENDED_KEY_USAGE, OID_COMMON_NAME, OID_EXTENDED_KEY_USAGE, OID_KEY_USAGE,
    OID_KP_CODE_SIGNING, OID_KP_EMAIL_PROTECTION, OID_SUBJECT_KEY_IDENTIFIER,
};
use crate::domain::types::CertUsage;
use crate::infra::error::P7vResult;

#[derive(Debug, Clone)]
pub struct CertificateAnalysis {
    pub subject: String,
    pub common_name: Option<String>,
    pub issuer: String,
    /// DER encoding of the issuer `Name`.
    pub issuer_der: Vec<u8>,
    /// Serial number content octets.
    pub serial_number: Vec<u8>,
    pub subject_key_identifier: Option<Vec<u8>>,
    /// `None` when the certificate has no keyUsage extension.
    pub key_usage: Option<KeyUsageFlags>,
    /// `None` when the certificate has no extendedKeyUsage extension.
    pub extended_key_usage: Option<Vec<ObjectIdentifier>>,
    pub days_until_expiry: i64,
    pub is_self_signed: bool,
    /// SHA-256 fingerprint, lowercase hex.
    pub fingerprint: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUsageFlags {
    pub digital_signature: bool,
    pub non_repudiation: bool,
}

impl CertificateAnalysis {
    /// Check the usage extensions against `usage`.
    ///
    /// Absent extensions impose no restriction; present ones must allow the
    /// usage.
    pub fn permits(&self, usage: CertUsage) -> Result<(), String> {
        let (needs_key_usage, eku) = match usage {
            CertUsage::Any => return Ok(()),
            CertUsage::ObjectSigning => (
                self.key_usage.map_or(true, |ku| ku.digital_signature),
                OID_KP_CODE_SIGNING,
            ),
            CertUsage::EmailSigner => (
                self.key_usage
                    .map_or(true, |ku| ku.digital_signature || ku.non_repudiation),
                OID_KP_EMAIL_PROTECTION,
            ),
        };
        if !needs_key_usage {
            return Err(format!(
                "keyUsage of '{}' does not allow {usage}",
                self.subject
            ));
        }
        if let Some(purposes) = &self.extended_key_usage {
            if !purposes
                .iter()
                .any(|p| *p == eku || *p == OID_ANY_EXTENDED_KEY_USAGE)
            {
                return Err(format!(
                    "extendedKeyUsage of '{}' lacks {eku} required for {usage}",
                    self.subject
                ));
            }
        }
        Ok(())
    }
}

pub struct CertificateValidator;

impl CertificateValidator {
    /// Analyze a DER encoded certificate.
    pub fn analyze_der(der_bytes: &[u8]) -> P7vResult<CertificateAnalysis> {
        let certificate = Certificate::from_der(der_bytes)?;
        Self::analyze(&certificate, der_bytes)
    }

    pub fn analyze(certificate: &Certificate, der_bytes: &[u8]) -> P7vResult<CertificateAnalysis> {
        let tbs = &certificate.tbs_certificate;
        let mut analysis = CertificateAnalysis {
            subject: Self::format_name(&tbs.subject),
            common_name: Self::common_name(&tbs.subject),
            issuer: Self::format_name(&tbs.issuer),
            issuer_der: tbs.issuer.to_der()?,
            serial_number: tbs.serial_number.as_bytes().to_vec(),
            subject_key_identifier: None,
            key_usage: None,
            extended_key_usage: None,
            days_until_expiry: Self::days_until_expiry(certificate),
            is_self_signed: tbs.subject == tbs.issuer,
            fingerprint: hex::encode(Sha256::digest(der_bytes)),
            warnings: Vec::new(),
        };

        for extension in tbs.extensions.iter().flatten() {
            let value = extension.extn_value.as_bytes();
            if extension.extn_id == OID_KEY_USAGE {
                let ku = KeyUsage::from_der(value)?;
                analysis.key_usage = Some(KeyUsageFlags {
                    digital_signature: ku.digital_signature(),
                    non_repudiation: ku.non_repudiation(),
                });
            } else if extension.extn_id == OID_EXTENDED_KEY_USAGE {
                analysis.extended_key_usage = Some(ExtendedKeyUsage::from_der(value)?.0);
            } else if extension.extn_id == OID_SUBJECT_KEY_IDENTIFIER {
                let ski = SubjectKeyIdentifier::from_der(value)?;
                analysis.subject_key_identifier = Some(ski.0.as_bytes().to_vec());
            }
        }

        if analysis.days_until_expiry < 0 {
            analysis.warnings.push("Certificate has expired".to_string());
        } else if analysis.days_until_expiry < 30 {
            analysis.warnings.push(format!(
                "Certificate expires in {} days",
                analysis.days_until_expiry
            ));
        }
        if analysis.is_self_signed {
            analysis
                .warnings
                .push("Certificate is self-signed".to_string());
        }

        log::debug!(
            "certificate '{}' issued by '{}' (sha256 {})",
            analysis.subject,
            analysis.issuer,
            analysis.fingerprint
        );
        for warning in &analysis.warnings {
            log::debug!("  - {warning}");
        }
        Ok(analysis)
    }

    /// Subject common name of a DER encoded certificate.
    #[must_use]
    pub fn common_name_der(der_bytes: &[u8]) -> Option<String> {
        let certificate = Certificate::from_der(der_bytes).ok()?;
        Self::common_name(&certificate.tbs_certificate.subject)
    }

    fn common_name(name: &Name) -> Option<String> {
        name.0
            .iter()
            .flat_map(|rdn| rdn.0.iter())
            .filter(|atv| atv.oid == OID_COMMON_NAME)
            .find_map(|atv| Self::attribute_string(atv.value.tag(), atv.value.value()))
    }

    fn format_name(name: &Name) -> String {
        let components: Vec<String> = name
            .0
            .iter()
            .flat_map(|rdn| rdn.0.iter())
            .map(|atv| {
                let value = Self::attribute_string(atv.value.tag(), atv.value.value())
                    .unwrap_or_else(|| format!("0x{}", hex::encode(atv.value.value())));
                format!("{}={value}", Self::oid_to_name(&atv.oid))
            })
            .collect();
        components.join(", ")
    }

    fn attribute_string(tag: Tag, value: &[u8]) -> Option<String> {
        match tag {
            Tag::Utf8String | Tag::PrintableString | Tag::Ia5String | Tag::TeletexString => Some(
                String::from_utf8_lossy(value)
                    .trim_matches('\0')
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn oid_to_name(oid: &ObjectIdentifier) -> String {
        match oid.as_bytes() {
            [0x55, 0x04, 0x03] => "CN".to_string(),
            [0x55, 0x04, 0x06] => "C".to_string(),
            [0x55, 0x04, 0x08] => "ST".to_string(),
            [0x55, 0x04, 0x07] => "L".to_string(),
            [0x55, 0x04, 0x0a] => "O".to_string(),
            [0x55, 0x04, 0x0b] => "OU".to_string(),
            [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x01] => "emailAddress".to_string(),
            _ => oid.to_string(),
        }
    }

    fn days_until_expiry(certificate: &Certificate) -> i64 {
        let not_after = certificate
            .tbs_certificate
            .validity
            .not_after
            .to_unix_duration()
            .as_secs();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let seconds = i128::from(not_after) - i128::from(now);
        i64::try_from(seconds / 86_400).unwrap_or(i64::MIN)
    }
}
