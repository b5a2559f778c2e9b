//! Rejection taxonomy for a single hook invocation.
//!
//! Every variant aborts the whole invocation. The host surfaces the numeric
//! [`HookError::code`] together with the human-readable message; nothing is
//! retried internally.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    /// Payload too short, unknown mode flag, or an out-of-range field.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// No campaign or pledge exists for the given identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// Wrong lifecycle state, closed window, duplicate vote, insufficient
    /// amount, authorization mismatch, already refunded or paid.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A stored buffer violates its layout.
    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    /// The store refused a write (e.g. no reserve capacity left).
    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl HookError {
    /// Stable numeric code reported alongside the rejection message.
    pub fn code(&self) -> u32 {
        match self {
            Self::MalformedInput(_) => 1,
            Self::NotFound(_) => 2,
            Self::PreconditionFailed(_) => 3,
            Self::CorruptRecord(_) => 4,
            Self::StorageFailure(_) => 5,
        }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptRecord(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, HookError>;
