//! Certificate / trust store adapter.
//!
//! The verification engine talks to the store only through [`TrustStore`],
//! so the fail-fast aggregation can be exercised with in-memory stores.

mod signer_check;
pub mod store;

pub use store::OpenSslTrustStore;

use crate::domain::cms::SignedDataBlock;
use crate::domain::types::CertUsage;
use crate::domain::verification::VerificationStatus;
use crate::infra::error::P7vResult;

pub trait TrustStore {
    /// Import the certificates embedded in `block` as chain material for
    /// `usage`. Returns the number of newly imported certificates.
    fn import_certificates(&mut self, block: &SignedDataBlock, usage: CertUsage)
        -> P7vResult<usize>;

    /// Cryptographically verify signer `index` of `block`.
    fn verify_signer(
        &self,
        block: &SignedDataBlock,
        index: usize,
        usage: CertUsage,
    ) -> VerificationStatus;

    /// Subject common name of the certificate of signer `index`, if found.
    fn signer_common_name(&self, block: &SignedDataBlock, index: usize) -> Option<String>;

    /// Release backend resources. Called exactly once by the owning context.
    fn shutdown(&mut self) {}
}
