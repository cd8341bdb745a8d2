//! Infrastructure layer for cross-cutting concerns.
//!
//! Provides foundational infrastructure including:
//! - Configuration file loading and validation
//! - Error handling and result types
//! - The verbose diagnostic channel on stderr

pub mod config;
pub mod diagnostics;
pub mod error;
