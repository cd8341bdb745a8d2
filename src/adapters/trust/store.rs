//! OpenSSL backed trust store.
//!
//! Trusted roots come from a directory of PEM/DER files or from the OpenSSL
//! default locations. Certificates embedded in messages are imported as
//! untrusted intermediates: they help build chains and locate signers but
//! are never trust anchors themselves.

use std::fs;
use std::path::{Path, PathBuf};

use openssl::stack::Stack;
use openssl::x509::store::{X509Store, X509StoreBuilder};
use openssl::x509::X509;

use crate::adapters::trust::{signer_check, TrustStore};
use crate::domain::cms::{SignedDataBlock, SignerIdentifier};
use crate::domain::types::CertUsage;
use crate::domain::verification::VerificationStatus;
use crate::infra::error::{P7vError, P7vResult};
use crate::services::cert_validator::{CertificateAnalysis, CertificateValidator};

/// A certificate together with its parsed identity.
pub(crate) struct StoredCertificate {
    pub(crate) x509: X509,
    pub(crate) analysis: CertificateAnalysis,
}

impl StoredCertificate {
    fn from_der(der_bytes: &[u8]) -> Result<Self, String> {
        let x509 = X509::from_der(der_bytes).map_err(|e| format!("invalid certificate: {e}"))?;
        let analysis = CertificateValidator::analyze_der(der_bytes).map_err(|e| e.to_string())?;
        Ok(Self { x509, analysis })
    }

    fn matches(&self, sid: &SignerIdentifier) -> bool {
        match sid {
            SignerIdentifier::IssuerAndSerialNumber { issuer, serial } => {
                self.analysis.issuer_der == *issuer
                    && strip_leading_zeros(&self.analysis.serial_number)
                        == strip_leading_zeros(serial)
            }
            SignerIdentifier::SubjectKeyIdentifier(ski) => {
                self.analysis.subject_key_identifier.as_deref() == Some(ski.as_slice())
            }
        }
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

fn init_error(e: impl std::fmt::Display) -> P7vError {
    P7vError::TrustStoreInitFailed(e.to_string())
}

const CERTIFICATE_EXTENSIONS: [&str; 4] = ["pem", "crt", "cer", "der"];

pub struct OpenSslTrustStore {
    roots: X509Store,
    anchors: Vec<StoredCertificate>,
    imported: Vec<StoredCertificate>,
    source: Option<PathBuf>,
}

impl OpenSslTrustStore {
    /// Open the store from `dir`, or from the OpenSSL default locations when
    /// no directory is given.
    pub fn open(dir: Option<&Path>) -> P7vResult<Self> {
        let mut builder = X509StoreBuilder::new().map_err(init_error)?;
        let mut anchors = Vec::new();

        match dir {
            Some(dir) => {
                for der_bytes in Self::load_directory(dir)? {
                    let anchor = match StoredCertificate::from_der(&der_bytes) {
                        Ok(anchor) => anchor,
                        Err(e) => {
                            log::warn!("skipping unusable trust anchor in {}: {e}", dir.display());
                            continue;
                        }
                    };
                    builder
                        .add_cert(anchor.x509.clone())
                        .map_err(init_error)?;
                    anchors.push(anchor);
                }
                if anchors.is_empty() {
                    log::warn!("no trusted certificates found in {}", dir.display());
                }
            }
            None => builder.set_default_paths().map_err(init_error)?,
        }

        log::info!(
            "trust store initialized from {} ({} anchor(s))",
            dir.map_or_else(|| "default locations".to_string(), |d| d.display().to_string()),
            anchors.len()
        );
        Ok(Self {
            roots: builder.build(),
            anchors,
            imported: Vec::new(),
            source: dir.map(Path::to_path_buf),
        })
    }

    /// Certificates found in `dir`, as DER.
    fn load_directory(dir: &Path) -> P7vResult<Vec<Vec<u8>>> {
        let entries = fs::read_dir(dir).map_err(|e| {
            P7vError::TrustStoreInitFailed(format!("cannot read {}: {e}", dir.display()))
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| {
                        CERTIFICATE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
                    })
            })
            .collect();
        paths.sort();

        let mut certificates = Vec::new();
        for path in paths {
            let bytes = fs::read(&path).map_err(|e| {
                P7vError::TrustStoreInitFailed(format!("cannot read {}: {e}", path.display()))
            })?;
            match X509::stack_from_pem(&bytes) {
                Ok(stack) if !stack.is_empty() => {
                    for cert in stack {
                        if let Ok(der_bytes) = cert.to_der() {
                            certificates.push(der_bytes);
                        }
                    }
                }
                _ => certificates.push(bytes),
            }
            log::debug!("loaded trust material from {}", path.display());
        }
        Ok(certificates)
    }

    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    #[must_use]
    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }

    #[must_use]
    pub fn imported_count(&self) -> usize {
        self.imported.len()
    }

    pub(crate) fn roots(&self) -> &X509Store {
        &self.roots
    }

    /// Certificate for `sid`, preferring imported ones over anchors.
    pub(crate) fn find(&self, sid: &SignerIdentifier) -> Option<&StoredCertificate> {
        self.imported
            .iter()
            .chain(self.anchors.iter())
            .find(|cert| cert.matches(sid))
    }

    /// All imported certificates as untrusted chain material.
    pub(crate) fn untrusted_chain(&self) -> P7vResult<Stack<X509>> {
        let mut chain = Stack::new().map_err(|e| P7vError::VerificationFailed(e.to_string()))?;
        for cert in &self.imported {
            chain
                .push(cert.x509.clone())
                .map_err(|e| P7vError::VerificationFailed(e.to_string()))?;
        }
        Ok(chain)
    }
}

impl TrustStore for OpenSslTrustStore {
    fn import_certificates(
        &mut self,
        block: &SignedDataBlock,
        usage: CertUsage,
    ) -> P7vResult<usize> {
        let mut added = 0;
        for (index, der_bytes) in block.certificates.iter().enumerate() {
            let cert = StoredCertificate::from_der(der_bytes).map_err(|e| {
                P7vError::CertImportFailed(format!("embedded certificate {index}: {e}"))
            })?;
            let known = self
                .imported
                .iter()
                .any(|c| c.analysis.fingerprint == cert.analysis.fingerprint);
            if known {
                continue;
            }
            log::debug!(
                "imported certificate '{}' for {usage}",
                cert.analysis.subject
            );
            self.imported.push(cert);
            added += 1;
        }
        Ok(added)
    }

    fn verify_signer(
        &self,
        block: &SignedDataBlock,
        index: usize,
        usage: CertUsage,
    ) -> VerificationStatus {
        signer_check::check_signer(self, block, index, usage)
    }

    fn signer_common_name(&self, block: &SignedDataBlock, index: usize) -> Option<String> {
        let signer = block.signers.get(index)?;
        self.find(&signer.sid)?.analysis.common_name.clone()
    }

    fn shutdown(&mut self) {
        log::debug!(
            "trust store shut down ({} imported certificate(s) dropped)",
            self.imported.len()
        );
        self.imported.clear();
    }
}
