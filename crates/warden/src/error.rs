//! Engine error types.

use thiserror::Error;
use warden_policy::{ParseError, PolicySetError};
use warden_types::StoreError;

/// Errors surfaced by [`Engine`](crate::Engine) calls.
///
/// Per-policy evaluation errors never appear here; they are reported in the
/// response diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Policy text is malformed. The previous snapshot stays active.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Policies parsed but could not form a set (duplicate `@id`).
    #[error(transparent)]
    PolicySet(PolicySetError),

    /// Entities could not be loaded. The previous snapshot stays active.
    #[error("failed to load entities: {0}")]
    Load(#[from] StoreError),

    /// Entity or request JSON is malformed.
    #[error("malformed JSON: {message}")]
    Json { message: String },

    /// A UID string is not of the form `Type::"id"`.
    #[error("invalid entity uid `{input}`")]
    InvalidUid { input: String },

    /// Evaluation was requested before policies or entities were loaded.
    #[error("engine not initialized: no {missing} loaded")]
    NotInitialized { missing: &'static str },

    /// The caller's cancellation flag was raised between policies.
    #[error("evaluation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        EngineError::Internal(message.into())
    }

    pub(crate) fn json(message: impl Into<String>) -> Self {
        EngineError::Json {
            message: message.into(),
        }
    }
}

impl From<PolicySetError> for EngineError {
    fn from(err: PolicySetError) -> Self {
        match err {
            PolicySetError::Parse(parse) => EngineError::Parse(parse),
            other => EngineError::PolicySet(other),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::json(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
