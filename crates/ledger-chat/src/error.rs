//! Error types for the chat flow.

use ledger_core::error::LedgerError;

/// Errors from the chat engine.
///
/// `ClassificationFailure` and `SynthesisFailure` are recovered inside the
/// orchestrator; they only escape from the `try_*` entry points.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("intent classification failed: {0}")]
    ClassificationFailure(String),
    #[error("answer synthesis failed: {0}")]
    SynthesisFailure(String),
    #[error("LLM error: {0}")]
    Llm(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("session error: {0}")]
    Session(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<LedgerError> for ChatError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Config(msg) => ChatError::Config(msg),
            other => ChatError::Storage(other.to_string()),
        }
    }
}
