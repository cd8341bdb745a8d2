//! Service layer module root.
//! Certificate policy analysis, signer verification and output rollback.

pub mod cert_validator;
pub mod rollback;
pub mod signer_verification;

pub use cert_validator::{CertificateAnalysis, CertificateValidator};
pub use rollback::{Disposition, OutputSink, OutputTarget, RollbackController};
pub use signer_verification::SignerVerificationEngine;
