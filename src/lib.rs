//! p7verify library
//!
//! Streams a PKCS#7 / CMS signed package, writes the encapsulated content as
//! it is decoded and verifies every signer against an OpenSSL trust store
//! once the input is complete. Output produced by a run that does not verify
//! is removed again.

pub mod adapters;
pub mod domain;
pub mod infra;
pub mod pipelines;
pub mod services;

pub use domain::types::{CertUsage, ChunkSize, ExitStatus};
pub use domain::verification::{TrustDecision, VerificationStatus};
pub use infra::config::{ConfigManager, VerifierConfiguration};
pub use infra::diagnostics::Diagnostics;
pub use infra::error::{P7vError, P7vResult};
pub use pipelines::verify::{InputSource, RunOutcome, VerifyOptions, VerifyRequest, VerifyWorkflow};
pub use services::rollback::{Disposition, OutputTarget};

/// Decode and verify one package as described by `request`.
pub fn verify_package(request: VerifyRequest, diagnostics: &Diagnostics) -> RunOutcome {
    VerifyWorkflow::new(request).run(diagnostics)
}
