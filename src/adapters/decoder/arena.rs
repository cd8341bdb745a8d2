//! Session scratch arena.
//!
//! Append-only byte region owned by one decoder session. The decode engine
//! retains the structural elements it needs after streaming (certificates,
//! signer infos, object identifiers) here and refers to them through
//! [`ArenaSpan`] handles. Released exactly once, when the owning session is
//! torn down.

use std::fmt;

use crate::infra::error::{P7vError, P7vResult};

/// Byte range inside an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaSpan {
    start: usize,
    len: usize,
}

impl ArenaSpan {
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

type ReleaseHook = Box<dyn FnOnce(usize)>;

pub struct Arena {
    buf: Vec<u8>,
    release_hook: Option<ReleaseHook>,
}

impl Arena {
    /// Allocate an arena with `capacity` bytes reserved up front.
    pub fn with_capacity(capacity: usize) -> P7vResult<Self> {
        let mut buf = Vec::new();
        buf.try_reserve(capacity).map_err(|e| {
            P7vError::DecoderStartFailed(format!("cannot allocate {capacity} byte arena: {e}"))
        })?;
        Ok(Self {
            buf,
            release_hook: None,
        })
    }

    /// Register a callback invoked with the arena size when it is released.
    pub fn on_release(&mut self, hook: impl FnOnce(usize) + 'static) {
        self.release_hook = Some(Box::new(hook));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn push(&mut self, bytes: &[u8]) -> P7vResult<()> {
        self.buf.try_reserve(bytes.len()).map_err(|e| {
            P7vError::DecoderUpdateFailed(format!("arena exhausted ({} bytes): {e}", self.buf.len()))
        })?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Span covering everything appended since offset `start`.
    #[must_use]
    pub fn span_from(&self, start: usize) -> ArenaSpan {
        let start = start.min(self.buf.len());
        ArenaSpan {
            start,
            len: self.buf.len() - start,
        }
    }

    #[must_use]
    pub fn get(&self, span: ArenaSpan) -> &[u8] {
        &self.buf[span.start..span.start + span.len]
    }

    /// Release the arena. Consuming `self` makes a second release impossible.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        let size = self.buf.len();
        log::trace!("releasing session arena ({size} bytes)");
        if let Some(hook) = self.release_hook.take() {
            hook(size);
        }
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Arena(len={})", self.buf.len())
    }
}
