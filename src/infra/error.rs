//! Error types for PKCS#7 decode and verification operations.
//!
//! Every variant belongs to exactly one result category; `exit_status`
//! maps it onto the stable process-level [`ExitStatus`].

use thiserror::Error;

use crate::domain::types::ExitStatus;

/// Result type for decode and verification operations
pub type P7vResult<T> = Result<T, P7vError>;

/// Error types raised across the decode-verify pipeline
#[derive(Error, Debug, miette::Diagnostic)]
pub enum P7vError {
    #[error("Failed to open input: {0}")]
    InputOpenFailed(String),

    #[error("Failed to read input: {0}")]
    InputReadFailed(String),

    #[error("Failed to open output: {0}")]
    OutputOpenFailed(String),

    #[error("Failed to write output: {0}")]
    OutputWriteFailed(String),

    #[error("Signature verification failed: {0}")]
    #[diagnostic(help("the extracted content must not be trusted"))]
    VerificationFailed(String),

    #[error("Trust store initialization failed: {0}")]
    #[diagnostic(help("check the trust store directory passed with -d"))]
    TrustStoreInitFailed(String),

    #[error("CMS decoder start failed: {0}")]
    DecoderStartFailed(String),

    #[error("CMS decoder update failed: {0}")]
    DecoderUpdateFailed(String),

    #[error("CMS decoder finish failed: {0}")]
    DecoderFinishFailed(String),

    #[error("Certificate import failed: {0}")]
    CertImportFailed(String),

    #[error("ASN.1 encoding/decoding error: {0}")]
    Asn1Error(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl P7vError {
    /// Result category reported to the caller for this error.
    #[must_use]
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            P7vError::InputOpenFailed(_) | P7vError::InputReadFailed(_) => {
                ExitStatus::InputOpenFailed
            }
            P7vError::OutputOpenFailed(_) => ExitStatus::OutputOpenFailed,
            P7vError::OutputWriteFailed(_) => ExitStatus::OutputWriteFailed,
            P7vError::VerificationFailed(_) => ExitStatus::VerificationFailed,
            P7vError::TrustStoreInitFailed(_) => ExitStatus::TrustStoreInitFailed,
            P7vError::DecoderStartFailed(_) => ExitStatus::DecoderStartFailed,
            P7vError::DecoderUpdateFailed(_) => ExitStatus::DecoderUpdateFailed,
            P7vError::DecoderFinishFailed(_) | P7vError::Asn1Error(_) => {
                ExitStatus::DecoderFinishFailed
            }
            P7vError::CertImportFailed(_) => ExitStatus::CertImportFailed,
            P7vError::ConfigurationError(_) => ExitStatus::ConfigurationInvalid,
        }
    }
}

impl From<std::io::Error> for P7vError {
    fn from(error: std::io::Error) -> Self {
        P7vError::InputReadFailed(error.to_string())
    }
}

impl From<der::Error> for P7vError {
    fn from(error: der::Error) -> Self {
        P7vError::Asn1Error(error.to_string())
    }
}
