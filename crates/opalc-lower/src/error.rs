//! Lowering errors.
//!
//! All of these are programmer bugs in the input program (or the front-end
//! that produced the AST): lowering fails fast with a diagnostic and the
//! compilation aborts.

use opalc_ir::IrError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LowerError {
    #[error("unknown identifier '{name}'")]
    UnknownIdentifier { name: String },

    #[error("'{name}' is not a function")]
    NotAFunction { name: String },

    #[error("function '{name}' used as a value")]
    FunctionAsValue { name: String },

    #[error("call to '{callee}' expects {expected} arguments, found {found}")]
    ArityMismatch {
        callee: String,
        expected: usize,
        found: usize,
    },

    #[error("'{name}' cannot have void type")]
    VoidType { name: String },

    /// A type mismatch the implicit conversion rules cannot reconcile,
    /// surfaced by the builder's operand checks.
    #[error(transparent)]
    Ir(#[from] IrError),
}
