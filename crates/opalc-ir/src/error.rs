//! IR construction errors.
//!
//! Uses `thiserror` for structured, matchable variants. These surface
//! programmer bugs in whatever is driving the builder (malformed operand
//! types, arity mismatches); compilation aborts on them. Invariant breakage
//! inside the IR itself is asserted, not returned -- see
//! [`Module::assert_consistency`](crate::module::Module::assert_consistency).

use thiserror::Error;

/// Errors produced while constructing instructions through the builder.
#[derive(Debug, Error)]
pub enum IrError {
    /// A `create_*` call was made with no insertion block set.
    #[error("no insertion point set")]
    NoInsertPoint,

    /// An operand's type does not match the opcode's signature.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// An operand has the wrong shape for the opcode (e.g. loading through a
    /// non-pointer, indexing with the wrong index count).
    #[error("invalid operand: {reason}")]
    InvalidOperand { reason: String },

    /// A call supplies the wrong number of arguments.
    #[error("call to '{callee}' expects {expected} arguments, found {found}")]
    ArityMismatch {
        callee: String,
        expected: usize,
        found: usize,
    },
}
