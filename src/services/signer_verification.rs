//! Signer verification engine.
//!
//! Walks the content levels of a decoded message from outer to inner,
//! imports each signed level's certificates and then checks its signers in
//! index order. The first signer that does not verify ends the walk: later
//! signers and levels are never evaluated.

use crate::adapters::trust::TrustStore;
use crate::domain::cms::DecodedMessage;
use crate::domain::types::CertUsage;
use crate::domain::verification::{SignerFailure, TrustDecision, TrustSummary};
use crate::infra::diagnostics::Diagnostics;
use crate::infra::error::P7vResult;

pub struct SignerVerificationEngine<'a, S: TrustStore> {
    store: &'a mut S,
    usage: CertUsage,
    diagnostics: &'a Diagnostics,
}

impl<'a, S: TrustStore> SignerVerificationEngine<'a, S> {
    pub fn new(store: &'a mut S, usage: CertUsage, diagnostics: &'a Diagnostics) -> Self {
        Self {
            store,
            usage,
            diagnostics,
        }
    }

    /// Report that verification was bypassed on request.
    pub fn note_skipped(&self) {
        log::warn!("signature verification skipped by request");
        self.diagnostics
            .info("p7verify: warning: verification skipped as requested!");
    }

    /// Verify every signer of every signed level.
    ///
    /// A message without signed levels is trusted, and so is a signed level
    /// with no signers. Certificate import failures are errors; a signer
    /// that does not verify yields [`TrustDecision::Untrusted`].
    pub fn verify_message(&mut self, message: &mut DecodedMessage) -> P7vResult<TrustDecision> {
        let mut summary = TrustSummary::default();

        for (level_index, level) in message.levels_mut().iter_mut().enumerate() {
            let Some(block) = level.signed_data.as_mut() else {
                continue;
            };
            summary.signed_levels += 1;

            let imported = self.store.import_certificates(block, self.usage)?;
            log::debug!(
                "level {level_index}: imported {imported} of {} certificate(s), {} signer(s)",
                block.certificates.len(),
                block.signer_count()
            );

            for signer_index in 0..block.signer_count() {
                let status = self.store.verify_signer(block, signer_index, self.usage);
                block.signers[signer_index].set_status(status);

                let common_name = self.store.signer_common_name(block, signer_index);
                self.diagnostics.info(format!(
                    "signed by '{}'",
                    common_name.as_deref().unwrap_or("")
                ));

                if !status.is_valid() {
                    let failure = SignerFailure {
                        level: level_index,
                        signer: signer_index,
                        status,
                        common_name,
                    };
                    log::warn!("signer verification failed: {failure}");
                    self.diagnostics
                        .info(format!("signer {signer_index}: {status}"));
                    return Ok(TrustDecision::Untrusted(failure));
                }
                summary.signers_verified += 1;
            }
        }

        if summary.is_unsigned() {
            log::debug!("message carries no signed data; nothing to verify");
        } else {
            log::info!(
                "verified {} signer(s) on {} signed level(s)",
                summary.signers_verified,
                summary.signed_levels
            );
        }
        Ok(TrustDecision::Trusted(summary))
    }
}
