//! Type-safe wrappers using new-type pattern
//!
//! Categorical run results, certificate usage policy and validated chunk
//! sizes shared by the pipeline, the CLI and the configuration layer.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::constants::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use crate::infra::error::{P7vError, P7vResult};

/// Final categorical outcome of one verification run.
///
/// The numeric codes are stable and exposed as the process exit status so
/// automation can distinguish bad input from untrusted signers and I/O
/// failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    Success,
    InputOpenFailed,
    OutputOpenFailed,
    OutputWriteFailed,
    VerificationFailed,
    TrustStoreInitFailed,
    DecoderStartFailed,
    DecoderUpdateFailed,
    DecoderFinishFailed,
    CertImportFailed,
    ConfigurationInvalid,
}

impl ExitStatus {
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::InputOpenFailed => 1,
            ExitStatus::OutputOpenFailed => 2,
            ExitStatus::OutputWriteFailed => 3,
            ExitStatus::VerificationFailed => 4,
            ExitStatus::TrustStoreInitFailed => 5,
            ExitStatus::DecoderStartFailed => 6,
            ExitStatus::DecoderUpdateFailed => 7,
            ExitStatus::DecoderFinishFailed => 8,
            ExitStatus::CertImportFailed => 9,
            ExitStatus::ConfigurationInvalid => 10,
        }
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self == ExitStatus::Success
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitStatus::Success => "success",
            ExitStatus::InputOpenFailed => "input-open-failed",
            ExitStatus::OutputOpenFailed => "output-open-failed",
            ExitStatus::OutputWriteFailed => "output-write-failed",
            ExitStatus::VerificationFailed => "verification-failed",
            ExitStatus::TrustStoreInitFailed => "trust-store-init-failed",
            ExitStatus::DecoderStartFailed => "decoder-start-failed",
            ExitStatus::DecoderUpdateFailed => "decoder-update-failed",
            ExitStatus::DecoderFinishFailed => "decoder-finish-failed",
            ExitStatus::CertImportFailed => "certificate-import-failed",
            ExitStatus::ConfigurationInvalid => "configuration-invalid",
        };
        write!(f, "{name}")
    }
}

/// Certificate usage category that signer certificates are checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum CertUsage {
    /// Code / package signing (the default for package verification)
    #[default]
    #[value(alias = "code-signing")]
    ObjectSigning,
    /// S/MIME style signer
    #[value(alias = "smime")]
    EmailSigner,
    /// No usage restriction beyond a valid chain
    Any,
}

impl CertUsage {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CertUsage::ObjectSigning => "object-signing",
            CertUsage::EmailSigner => "email-signer",
            CertUsage::Any => "any",
        }
    }
}

impl fmt::Display for CertUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-safe wrapper for the input block size fed to the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSize(usize);

impl ChunkSize {
    /// Create a new `ChunkSize` after validation
    pub fn new(size: usize) -> P7vResult<Self> {
        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(P7vError::ConfigurationError(format!(
                "Chunk size must be between 1 and {MAX_CHUNK_SIZE} bytes, got {size}"
            )));
        }
        Ok(ChunkSize(size))
    }

    #[must_use]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        ChunkSize(DEFAULT_CHUNK_SIZE)
    }
}

impl fmt::Display for ChunkSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
