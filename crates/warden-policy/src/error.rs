//! Error types for parsing and evaluation.

use thiserror::Error;

/// Malformed policy text.
///
/// Line and column are 1-based and point at the offending token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Failure to assemble a policy set from parsed policies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicySetError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// An explicit `@id` repeats or collides with another policy's generated id.
    #[error("duplicate policy id `{id}`")]
    DuplicatePolicyId { id: String },
}

/// Evaluation stopped by a cancellation flag between policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("evaluation cancelled")]
pub struct Cancelled;

/// Coarse classification of an [`EvalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvalErrorKind {
    TypeMismatch,
    AttributeNotFound,
    EntityNotFound,
    UndeclaredName,
    IntegerOverflow,
    WrongArity,
}

/// Failure while evaluating a condition expression.
///
/// Scoped to a single policy: the authorizer records it in the response
/// diagnostics and treats the policy as not satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("type error: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("attribute `{attr}` not found on {on}")]
    AttributeNotFound { attr: String, on: String },

    #[error("entity {uid} does not exist")]
    EntityNotFound { uid: String },

    #[error("undeclared name `{name}`")]
    UndeclaredName { name: String },

    #[error("integer overflow in `{op}`")]
    IntegerOverflow { op: &'static str },

    #[error("`{method}` expects {expected} argument(s), got {actual}")]
    WrongArity {
        method: String,
        expected: usize,
        actual: usize,
    },
}

impl EvalError {
    /// Returns the error's kind.
    pub fn kind(&self) -> EvalErrorKind {
        match self {
            EvalError::TypeMismatch { .. } => EvalErrorKind::TypeMismatch,
            EvalError::AttributeNotFound { .. } => EvalErrorKind::AttributeNotFound,
            EvalError::EntityNotFound { .. } => EvalErrorKind::EntityNotFound,
            EvalError::UndeclaredName { .. } => EvalErrorKind::UndeclaredName,
            EvalError::IntegerOverflow { .. } => EvalErrorKind::IntegerOverflow,
            EvalError::WrongArity { .. } => EvalErrorKind::WrongArity,
        }
    }

    pub(crate) fn type_mismatch(expected: &'static str, actual: &'static str) -> Self {
        EvalError::TypeMismatch { expected, actual }
    }
}
