//! AST definition and AST → IR lowering for the opalc middle-end.

pub mod ast;
pub mod error;
pub mod lower;
pub mod scope;

// Re-export commonly used types
pub use ast::{
    AstType, BinOp, Block, Decl, Expr, FuncDecl, Param, Program, RelOp, Stmt, VarAccess, VarDecl,
};
pub use error::LowerError;
pub use lower::lower_program;
pub use scope::ScopeStack;
