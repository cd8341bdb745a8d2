//! Adapter layer modules for external system integration.
//!
//! Provides adapters for:
//! - Streaming BER/DER decoding of CMS / PKCS#7 messages
//! - OpenSSL message digests for streamed content
//! - OpenSSL trust store and per-signer signature verification
//! - Scoped initialization and shutdown of the crypto library

pub mod crypto_context;
pub mod decoder;
pub mod digest;
pub mod trust;

pub use crypto_context::CryptoContext;
pub use decoder::{Arena, CmsStreamDecoder, DecodeEngine};
pub use trust::{OpenSslTrustStore, TrustStore};
