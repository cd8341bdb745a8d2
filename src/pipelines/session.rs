//! One decode-verify transaction.
//!
//! A [`DecoderSession`] owns the scratch arena, the decode engine and the
//! output sink. It is created by [`DecoderSession::start`], fed input
//! chunks, and consumed exactly once by either [`DecoderSession::finish`]
//! or [`DecoderSession::abort`]; both release the arena and the engine.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::adapters::decoder::{Arena, DecodeEngine};
use crate::adapters::trust::TrustStore;
use crate::domain::cms::DecodedMessage;
use crate::domain::constants::ARENA_INITIAL_CAPACITY;
use crate::domain::verification::TrustDecision;
use crate::infra::error::{P7vError, P7vResult};
use crate::services::signer_verification::SignerVerificationEngine;

/// Sticky sink failure flag: set at most once, never cleared.
#[derive(Debug, Default)]
pub struct WriteFailure(AtomicBool);

impl WriteFailure {
    #[must_use]
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Record a failure. Returns true only for the first one.
    pub fn latch(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Started,
    Feeding,
    Failed,
}

/// Result of a finished session.
pub struct FinishedSession<W> {
    pub decision: TrustDecision,
    pub message: DecodedMessage,
    pub sink: W,
    /// Content bytes accepted by the sink.
    pub bytes_written: u64,
}

pub struct DecoderSession<E: DecodeEngine, W: Write> {
    arena: Arena,
    engine: E,
    sink: W,
    write_failed: WriteFailure,
    state: SessionState,
    bytes_fed: u64,
    bytes_written: u64,
}

impl<E: DecodeEngine, W: Write> DecoderSession<E, W> {
    /// Allocate the session arena and start `engine` writing to `sink`.
    pub fn start(engine: E, sink: W) -> P7vResult<Self> {
        let arena = Arena::with_capacity(ARENA_INITIAL_CAPACITY)?;
        Self::start_with_arena(engine, sink, arena)
    }

    /// Start a session on a caller supplied arena.
    pub fn start_with_arena(mut engine: E, sink: W, mut arena: Arena) -> P7vResult<Self> {
        engine.begin(&mut arena).map_err(|e| match e {
            P7vError::DecoderStartFailed(_) => e,
            other => P7vError::DecoderStartFailed(other.to_string()),
        })?;
        log::trace!("decoder session started");
        Ok(Self {
            arena,
            engine,
            sink,
            write_failed: WriteFailure::new(),
            state: SessionState::Started,
            bytes_fed: 0,
            bytes_written: 0,
        })
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether any sink write has failed so far.
    #[must_use]
    pub fn write_failed(&self) -> bool {
        self.write_failed.is_set()
    }

    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Push one input chunk through the engine.
    ///
    /// Decoded content is written to the sink as the engine produces it. A
    /// failed write latches the write failure flag and decoding carries on;
    /// callers check [`Self::write_failed`] after each feed.
    ///
    /// # Panics
    /// When called on a session whose engine has already failed.
    pub fn feed(&mut self, chunk: &[u8]) -> P7vResult<()> {
        assert!(
            self.state != SessionState::Failed,
            "feed called on a failed decoder session"
        );
        self.state = SessionState::Feeding;
        self.bytes_fed += chunk.len() as u64;

        let sink = &mut self.sink;
        let write_failed = &self.write_failed;
        let bytes_written = &mut self.bytes_written;
        let mut on_content = |bytes: &[u8]| match sink.write_all(bytes) {
            Ok(()) => *bytes_written += bytes.len() as u64,
            Err(e) => {
                if write_failed.latch() {
                    log::error!("output write failed: {e}");
                }
            }
        };

        self.engine
            .update(&mut self.arena, chunk, &mut on_content)
            .map_err(|e| {
                self.state = SessionState::Failed;
                log::debug!("decoder update failed after {} bytes: {e}", self.bytes_fed);
                e
            })
    }

    /// Flush buffered output. A failed flush counts as a failed write.
    pub fn flush_sink(&mut self) -> P7vResult<()> {
        if let Err(e) = self.sink.flush() {
            self.write_failed.latch();
            return Err(P7vError::OutputWriteFailed(format!("flush failed: {e}")));
        }
        Ok(())
    }

    /// Finalize decoding and, unless `skip_verification`, verify the
    /// decoded message. The arena and engine are released on every path.
    pub fn finish<S: TrustStore>(
        self,
        skip_verification: bool,
        verifier: &mut SignerVerificationEngine<'_, S>,
    ) -> P7vResult<FinishedSession<W>> {
        let Self {
            arena,
            engine,
            sink,
            state,
            bytes_fed,
            bytes_written,
            ..
        } = self;
        if state == SessionState::Failed {
            drop(engine);
            arena.release();
            return Err(P7vError::DecoderFinishFailed(
                "decoder session already failed".to_string(),
            ));
        }

        let decoded = engine.finish(&arena);
        arena.release();
        let mut message = decoded?;
        log::debug!(
            "decoded {bytes_fed} input bytes into {bytes_written} content bytes ({} level(s))",
            message.level_count()
        );

        let decision = if skip_verification {
            verifier.note_skipped();
            TrustDecision::Skipped
        } else {
            verifier.verify_message(&mut message)?
        };
        Ok(FinishedSession {
            decision,
            message,
            sink,
            bytes_written,
        })
    }

    /// Tear the session down after an earlier error.
    pub fn abort(self) {
        let Self {
            arena,
            engine,
            state,
            bytes_fed,
            ..
        } = self;
        drop(engine);
        arena.release();
        log::debug!("decoder session aborted in state {state:?} after {bytes_fed} bytes");
    }
}
