//! Streaming CMS / PKCS#7 decode engine.
//!
//! The engine is a push parser: the pipeline hands it input slices of any
//! size and it reports decoded content through a callback as soon as the
//! content octets arrive. Structural elements needed after streaming are
//! kept in the session [`Arena`]; the parsed [`DecodedMessage`] is only
//! produced by [`DecodeEngine::finish`].

pub mod arena;
mod cms_stream;
pub mod der_reader;
pub mod signer_info;
pub mod tlv;

pub use arena::{Arena, ArenaSpan};

use crate::domain::cms::DecodedMessage;
use crate::infra::error::P7vResult;

use cms_stream::{LevelDecoder, RootKind};

/// Incremental decoder bound to one session arena.
pub trait DecodeEngine {
    /// Called once before the first update.
    fn begin(&mut self, _arena: &mut Arena) -> P7vResult<()> {
        Ok(())
    }

    /// Decode `chunk`, invoking `on_content` zero or more times with decoded
    /// content bytes in order.
    fn update(
        &mut self,
        arena: &mut Arena,
        chunk: &[u8],
        on_content: &mut dyn FnMut(&[u8]),
    ) -> P7vResult<()>;

    /// Finalize decoding. Fails when the input was malformed or truncated.
    fn finish(self, arena: &Arena) -> P7vResult<DecodedMessage>
    where
        Self: Sized;
}

/// BER/DER `ContentInfo` decoder supporting data and (nested) signed data.
pub struct CmsStreamDecoder {
    root: LevelDecoder,
    chunks: u64,
}

impl CmsStreamDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: LevelDecoder::new(RootKind::ContentInfo, 0),
            chunks: 0,
        }
    }
}

impl Default for CmsStreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeEngine for CmsStreamDecoder {
    fn begin(&mut self, arena: &mut Arena) -> P7vResult<()> {
        log::trace!("cms decoder started ({arena:?})");
        Ok(())
    }

    fn update(
        &mut self,
        arena: &mut Arena,
        chunk: &[u8],
        on_content: &mut dyn FnMut(&[u8]),
    ) -> P7vResult<()> {
        self.chunks += 1;
        self.root.update(arena, chunk, on_content)
    }

    fn finish(self, arena: &Arena) -> P7vResult<DecodedMessage> {
        let consumed = self.root.offset();
        let levels = self.root.finish(arena)?;
        let message = DecodedMessage::new(levels);
        log::debug!(
            "cms decoder finished: {consumed} bytes in {} chunk(s), {} level(s), {} signer(s), arena {} bytes",
            self.chunks,
            message.level_count(),
            message.signer_total(),
            arena.len()
        );
        Ok(message)
    }
}
