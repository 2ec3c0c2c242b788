//! Errors raised at the runtime boundary.

use thiserror::Error;

/// Failure surfaced by the runtime to whoever invoked a function through it.
///
/// `Call` carries the human-readable message produced by a native function;
/// it is the runtime's equivalent of a script-level error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("stack overflow (limit {limit} slots)")]
    StackOverflow { limit: usize },
    #[error("call depth exceeded (limit {limit})")]
    CallDepthExceeded { limit: usize },
    #[error("attempt to call a {0} value")]
    NotCallable(&'static str),
    #[error("stack underflow: call needs {needed} slots, frame holds {available}")]
    StackUnderflow { needed: usize, available: usize },
    #[error("invalid table key: {0}")]
    InvalidKey(&'static str),
    #[error("attempt to index a {0} value")]
    NotIndexable(&'static str),
    #[error("{value} ({ty}) does not fit in a runtime integer")]
    IntegerOutOfRange { value: String, ty: &'static str },
    #[error("stale registry key")]
    StaleRegistryKey,
    #[error("{0}")]
    Call(String),
}

impl RuntimeError {
    /// Shorthand for a script-visible error message.
    pub fn call(message: impl Into<String>) -> Self {
        RuntimeError::Call(message.into())
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
