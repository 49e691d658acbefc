//! The abstract syntax tree consumed by lowering.
//!
//! This is the input contract of the middle-end: whatever front-end produces
//! it (the bundled CLI reads it as JSON via serde), lowering turns it into an
//! IR module. The shape mirrors the source language: declarations, compound
//! statements, `if`/`while`/`return`, variable access with optional
//! subscript, assignment, arithmetic and relational expressions, calls.

use serde::{Deserialize, Serialize};

/// Source-level types. `Void` is only valid as a function return type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AstType {
    Int,
    Float,
    Void,
}

/// A whole translation unit: globals and functions in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub decls: Vec<Decl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decl {
    Var(VarDecl),
    Func(FuncDecl),
}

/// A variable declaration; `len` makes it an array of that fixed size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub ty: AstType,
    pub len: Option<u32>,
}

/// A function parameter; array parameters decay to element pointers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: AstType,
    pub is_array: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDecl {
    pub name: String,
    pub ret: AstType,
    pub params: Vec<Param>,
    pub body: Block,
}

/// A compound statement: local declarations, then statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub decls: Vec<VarDecl>,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// An expression evaluated for effect; `None` is the empty statement.
    Expr(Option<Expr>),
    Compound(Block),
    If {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    Return(Option<Expr>),
}

/// A variable use: plain, or subscripted by one index expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarAccess {
    pub name: String,
    pub index: Option<Box<Expr>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Int(i32),
    Float(f32),
    Var(VarAccess),
    Assign {
        target: VarAccess,
        value: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Compare {
        op: RelOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// A plain variable reference.
    pub fn var(name: &str) -> Expr {
        Expr::Var(VarAccess {
            name: name.into(),
            index: None,
        })
    }

    /// A subscripted variable reference.
    pub fn index(name: &str, idx: Expr) -> Expr {
        Expr::Var(VarAccess {
            name: name.into(),
            index: Some(Box::new(idx)),
        })
    }

    pub fn assign(name: &str, value: Expr) -> Expr {
        Expr::Assign {
            target: VarAccess {
                name: name.into(),
                index: None,
            },
            value: Box::new(value),
        }
    }

    pub fn assign_index(name: &str, idx: Expr, value: Expr) -> Expr {
        Expr::Assign {
            target: VarAccess {
                name: name.into(),
                index: Some(Box::new(idx)),
            },
            value: Box::new(value),
        }
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn compare(op: RelOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn call(callee: &str, args: Vec<Expr>) -> Expr {
        Expr::Call {
            callee: callee.into(),
            args,
        }
    }
}

impl Block {
    pub fn stmts(stmts: Vec<Stmt>) -> Block {
        Block {
            decls: Vec::new(),
            stmts,
        }
    }
}

impl VarDecl {
    pub fn scalar(name: &str, ty: AstType) -> VarDecl {
        VarDecl {
            name: name.into(),
            ty,
            len: None,
        }
    }

    pub fn array(name: &str, ty: AstType, len: u32) -> VarDecl {
        VarDecl {
            name: name.into(),
            ty,
            len: Some(len),
        }
    }
}
