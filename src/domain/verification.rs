//! Verification domain types for signed CMS packages.
//!
//! Per-signer statuses are produced by the trust store adapter; the
//! verification engine folds them into a single `TrustDecision`. This keeps
//! the domain layer free of direct crypto dependencies while providing a
//! stable reporting contract to the pipeline.

use std::fmt;

/// Categorical outcome of checking one signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationStatus {
    /// Verification has not been attempted yet.
    Unverified,
    /// Signature, digest and certificate chain all check out.
    Valid,
    BadSignature,
    DigestMismatch,
    SigningCertNotFound,
    SigningCertNotTrusted,
    /// Digest algorithm unknown or not computed while streaming.
    SignatureAlgorithmUnknown,
    /// Signature algorithm known but not supported by the backend.
    UnsupportedSignatureAlgorithm,
    MalformedSignature,
    ProcessingError,
}

impl VerificationStatus {
    #[must_use]
    pub fn is_valid(self) -> bool {
        self == VerificationStatus::Valid
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Unverified => "Unverified",
            VerificationStatus::Valid => "GoodSignature",
            VerificationStatus::BadSignature => "BadSignature",
            VerificationStatus::DigestMismatch => "DigestMismatch",
            VerificationStatus::SigningCertNotFound => "SigningCertNotFound",
            VerificationStatus::SigningCertNotTrusted => "SigningCertNotTrusted",
            VerificationStatus::SignatureAlgorithmUnknown => "SignatureAlgorithmUnknown",
            VerificationStatus::UnsupportedSignatureAlgorithm => "UnsupportedSignatureAlgorithm",
            VerificationStatus::MalformedSignature => "MalformedSignature",
            VerificationStatus::ProcessingError => "ProcessingError",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The first signer that failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerFailure {
    /// Content level index (0 = outermost).
    pub level: usize,
    /// Signer index within that level.
    pub signer: usize,
    pub status: VerificationStatus,
    pub common_name: Option<String>,
}

impl fmt::Display for SignerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "level {} signer {}: {}",
            self.level, self.signer, self.status
        )?;
        if let Some(cn) = &self.common_name {
            write!(f, " (signed by '{cn}')")?;
        }
        Ok(())
    }
}

/// Counters describing a successful verification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustSummary {
    /// Number of signed-data levels that were checked.
    pub signed_levels: usize,
    /// Number of signers that verified as valid.
    pub signers_verified: usize,
}

impl TrustSummary {
    /// True when the message carried no signed-data level at all.
    #[must_use]
    pub fn is_unsigned(&self) -> bool {
        self.signed_levels == 0
    }
}

/// Aggregate trust decision for a decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustDecision {
    /// Every signer of every signed level verified.
    Trusted(TrustSummary),
    /// Verification was explicitly bypassed by configuration.
    Skipped,
    /// Verification stopped at the first failing signer.
    Untrusted(SignerFailure),
}

impl TrustDecision {
    /// Whether the extracted content may be retained.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, TrustDecision::Trusted(_) | TrustDecision::Skipped)
    }
}
