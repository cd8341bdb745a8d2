//! Verify workflow pipeline.
//!
//! Opens the input and the output, initializes the crypto context, streams
//! the input through a decoder session and verifies the decoded message.
//! The output artifact is deleted again when the run does not succeed.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use crate::adapters::crypto_context::CryptoContext;
use crate::adapters::decoder::{CmsStreamDecoder, DecodeEngine};
use crate::adapters::trust::TrustStore;
use crate::domain::types::{CertUsage, ChunkSize, ExitStatus};
use crate::domain::verification::TrustDecision;
use crate::infra::diagnostics::Diagnostics;
use crate::infra::error::{P7vError, P7vResult};
use crate::pipelines::session::DecoderSession;
use crate::services::rollback::{Disposition, OutputSink, OutputTarget, RollbackController};
use crate::services::signer_verification::SignerVerificationEngine;

/// Where the signed message is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    File(PathBuf),
}

impl InputSource {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            InputSource::Stdin => None,
            InputSource::File(path) => Some(path),
        }
    }

    fn open(&self) -> P7vResult<Box<dyn Read>> {
        match self {
            InputSource::Stdin => Ok(Box::new(io::stdin().lock())),
            InputSource::File(path) => {
                let file = File::open(path).map_err(|e| {
                    P7vError::InputOpenFailed(format!("'{}': {e}", path.display()))
                })?;
                Ok(Box::new(BufReader::new(file)))
            }
        }
    }
}

/// Policy knobs for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VerifyOptions {
    pub skip_verification: bool,
    pub require_signed: bool,
    pub usage: CertUsage,
    pub chunk_size: ChunkSize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyRequest {
    pub input: InputSource,
    pub output: OutputTarget,
    pub trust_store_dir: Option<PathBuf>,
    pub options: VerifyOptions,
}

/// Everything a caller needs to report a finished run.
#[derive(Debug)]
pub struct RunOutcome {
    pub status: ExitStatus,
    /// Trust decision of a successful run.
    pub decision: Option<TrustDecision>,
    /// The error that ended an unsuccessful run.
    pub error: Option<P7vError>,
    pub disposition: Disposition,
}

pub struct VerifyWorkflow {
    request: VerifyRequest,
}

impl VerifyWorkflow {
    #[must_use]
    pub fn new(request: VerifyRequest) -> Self {
        Self { request }
    }

    #[must_use]
    pub fn request(&self) -> &VerifyRequest {
        &self.request
    }

    /// Run the whole decode-verify transaction and settle the output.
    pub fn run(&self, diagnostics: &Diagnostics) -> RunOutcome {
        diagnostics.info(format!(
            "{} version {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ));
        log::trace!("verify workflow started: {:?}", self.request);

        let mut created = false;
        let (status, decision, error) = match self.execute(diagnostics, &mut created) {
            Ok(decision) => (ExitStatus::Success, Some(decision), None),
            Err(e) => {
                log::debug!("verify workflow failed: {e}");
                (e.exit_status(), None, Some(e))
            }
        };

        let disposition =
            RollbackController::new(&self.request.output, created).settle(status, diagnostics);
        diagnostics.info(format!("exiting with status {}", status.code()));
        log::trace!("verify workflow finished: {status} ({disposition:?})");

        RunOutcome {
            status,
            decision,
            error,
            disposition,
        }
    }

    fn execute(&self, diagnostics: &Diagnostics, created: &mut bool) -> P7vResult<TrustDecision> {
        let input = self.request.input.open().map_err(|e| {
            if let Some(path) = self.request.input.path() {
                diagnostics.always(format!(
                    "failed to open input file '{}'!",
                    path.display()
                ));
            }
            e
        })?;
        if let Some(path) = self.request.input.path() {
            diagnostics.info(format!("opened '{}' for reading.", path.display()));
        }

        let sink = OutputSink::open(&self.request.output).map_err(|e| {
            if let Some(path) = self.request.output.path() {
                diagnostics.always(format!(
                    "failed to open output file '{}'!",
                    path.display()
                ));
            }
            e
        })?;
        if let Some(path) = self.request.output.path() {
            *created = true;
            diagnostics.info(format!("opened '{}' for writing.", path.display()));
        }

        let ctx = CryptoContext::init(self.request.trust_store_dir.as_deref()).map_err(|e| {
            diagnostics.always(format!(
                "initialization failed ({})!",
                e.exit_status().code()
            ));
            e
        })?;
        diagnostics.info("initialized.");

        let decision = stream_and_verify(
            CmsStreamDecoder::new(),
            ctx,
            input,
            sink,
            &self.request.options,
            diagnostics,
        )?;
        diagnostics.info("data extracted.");
        Ok(decision)
    }
}

/// Stream `input` through `engine` into `sink` and verify the result.
///
/// The crypto context is shut down before returning on every path. A
/// message that does not verify, or an unsigned one when signed content is
/// required, is reported as [`P7vError::VerificationFailed`].
pub fn stream_and_verify<E, S, R, W>(
    engine: E,
    mut ctx: CryptoContext<S>,
    mut input: R,
    sink: W,
    options: &VerifyOptions,
    diagnostics: &Diagnostics,
) -> P7vResult<TrustDecision>
where
    E: DecodeEngine,
    S: TrustStore,
    R: Read,
    W: Write,
{
    let result = run_session(engine, &mut ctx, &mut input, sink, options, diagnostics);
    ctx.shutdown();
    result
}

fn run_session<E, S, R, W>(
    engine: E,
    ctx: &mut CryptoContext<S>,
    input: &mut R,
    sink: W,
    options: &VerifyOptions,
    diagnostics: &Diagnostics,
) -> P7vResult<TrustDecision>
where
    E: DecodeEngine,
    S: TrustStore,
    R: Read,
    W: Write,
{
    let mut session = DecoderSession::start(engine, sink).map_err(|e| {
        diagnostics.always(format!(
            "failed to setup decoder ({})",
            e.exit_status().code()
        ));
        e
    })?;

    let mut buffer = vec![0u8; options.chunk_size.get()];
    loop {
        let read = match input.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                session.abort();
                return Err(e.into());
            }
        };
        if let Err(e) = session.feed(&buffer[..read]) {
            session.abort();
            return Err(e);
        }
        if session.write_failed() {
            session.abort();
            return Err(P7vError::OutputWriteFailed(
                "output did not accept all decoded bytes".to_string(),
            ));
        }
    }

    if let Err(e) = session.flush_sink() {
        session.abort();
        return Err(e);
    }

    let mut verifier =
        SignerVerificationEngine::new(ctx.store_mut(), options.usage, diagnostics);
    let finished = session.finish(options.skip_verification, &mut verifier)?;
    log::debug!(
        "{} content byte(s) extracted from {} level(s)",
        finished.bytes_written,
        finished.message.level_count()
    );

    match finished.decision {
        TrustDecision::Untrusted(failure) => {
            Err(P7vError::VerificationFailed(failure.to_string()))
        }
        TrustDecision::Trusted(summary) if options.require_signed && summary.is_unsigned() => {
            Err(P7vError::VerificationFailed(
                "message carries no signed data".to_string(),
            ))
        }
        decision => Ok(decision),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cms::SignedDataBlock;
    use crate::domain::verification::VerificationStatus;
    use std::cell::Cell;
    use std::rc::Rc;

    // ContentInfo { data, [0] OCTET STRING "abc" }
    const DATA_MESSAGE: [u8; 20] = [
        0x30, 0x12, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x01, 0xa0, 0x05,
        0x04, 0x03, b'a', b'b', b'c',
    ];

    struct NullStore(Rc<Cell<usize>>);

    impl TrustStore for NullStore {
        fn import_certificates(&mut self, _: &SignedDataBlock, _: CertUsage) -> P7vResult<usize> {
            Ok(0)
        }

        fn verify_signer(&self, _: &SignedDataBlock, _: usize, _: CertUsage) -> VerificationStatus {
            VerificationStatus::Valid
        }

        fn signer_common_name(&self, _: &SignedDataBlock, _: usize) -> Option<String> {
            None
        }

        fn shutdown(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "device error"))
        }
    }

    fn context(shutdowns: &Rc<Cell<usize>>) -> CryptoContext<NullStore> {
        CryptoContext::with_store(NullStore(Rc::clone(shutdowns)))
    }

    #[test]
    fn unsigned_data_streams_through() {
        let shutdowns = Rc::new(Cell::new(0));
        let mut out = Vec::new();
        let options = VerifyOptions {
            chunk_size: ChunkSize::new(3).unwrap(),
            ..VerifyOptions::default()
        };
        let decision = stream_and_verify(
            CmsStreamDecoder::new(),
            context(&shutdowns),
            &DATA_MESSAGE[..],
            &mut out,
            &options,
            &Diagnostics::silent(),
        )
        .unwrap();
        assert!(decision.is_accepted());
        assert_eq!(out, b"abc");
        assert_eq!(shutdowns.get(), 1);
    }

    #[test]
    fn require_signed_rejects_plain_data() {
        let shutdowns = Rc::new(Cell::new(0));
        let options = VerifyOptions {
            require_signed: true,
            ..VerifyOptions::default()
        };
        let err = stream_and_verify(
            CmsStreamDecoder::new(),
            context(&shutdowns),
            &DATA_MESSAGE[..],
            io::sink(),
            &options,
            &Diagnostics::silent(),
        )
        .unwrap_err();
        assert_eq!(err.exit_status(), ExitStatus::VerificationFailed);
        assert_eq!(shutdowns.get(), 1);
    }

    #[test]
    fn read_error_is_an_input_failure() {
        let shutdowns = Rc::new(Cell::new(0));
        let err = stream_and_verify(
            CmsStreamDecoder::new(),
            context(&shutdowns),
            FailingReader,
            io::sink(),
            &VerifyOptions::default(),
            &Diagnostics::silent(),
        )
        .unwrap_err();
        assert!(matches!(err, P7vError::InputReadFailed(_)));
        assert_eq!(shutdowns.get(), 1);
    }

    #[test]
    fn truncated_input_fails_at_finish() {
        let shutdowns = Rc::new(Cell::new(0));
        let err = stream_and_verify(
            CmsStreamDecoder::new(),
            context(&shutdowns),
            &DATA_MESSAGE[..15],
            io::sink(),
            &VerifyOptions::default(),
            &Diagnostics::silent(),
        )
        .unwrap_err();
        assert_eq!(err.exit_status(), ExitStatus::DecoderFinishFailed);
        assert_eq!(shutdowns.get(), 1);
    }
}
