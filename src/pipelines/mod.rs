//! Workflow pipelines orchestrating adapters and services.

pub mod session;
pub mod verify;

pub use session::{DecoderSession, FinishedSession, SessionState, WriteFailure};
pub use verify::{
    stream_and_verify, InputSource, RunOutcome, VerifyOptions, VerifyRequest, VerifyWorkflow,
};
