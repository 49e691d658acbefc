//! Runtime errors with trap semantics for the reference interpreter.

use thiserror::Error;

/// Trap conditions that halt interpretation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    #[error("divide by zero")]
    DivideByZero,

    #[error("step limit exceeded")]
    StepLimitExceeded,

    #[error("recursion depth limit ({limit}) exceeded")]
    RecursionLimitExceeded { limit: usize },

    #[error("out of bounds access: offset {offset}, size {size}")]
    OutOfBounds { offset: i64, size: usize },

    #[error("input exhausted")]
    InputExhausted,

    #[error("function '{name}' not found")]
    FunctionNotFound { name: String },

    #[error("runtime type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },

    #[error("internal error: {message}")]
    Internal { message: String },
}
