//! Value references and use lists.
//!
//! [`ValueRef`] is the tagged union over everything an instruction operand
//! can be: an inline constant, a global, a function, a function argument,
//! another instruction's result, or a basic block (branch targets and φ
//! predecessors are plain operands, so use-list bookkeeping covers them
//! uniformly).
//!
//! Constants are immediates without identity: two `ConstantInt(7)` operands
//! are the same value and nothing tracks their uses. Every other variant
//! resolves to an arena entity that owns a [`UseList`].

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::id::{ArgId, BlockId, FuncId, GlobalId, InstId};
use crate::types::TypeId;

/// A compile-time constant.
///
/// `Float` stores an `f32`, which does not implement `Eq`/`Hash`; equality
/// and hashing go through the bit pattern so constants can key hash maps
/// (the inliner's value map in particular). NaN payloads and signed zeros
/// compare by bits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Constant {
    Int(i32),
    Float(f32),
    /// Aggregate zero initializer of the given type.
    Zero(TypeId),
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Zero(a), Constant::Zero(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Constant::Int(v) => {
                0u8.hash(state);
                v.hash(state);
            }
            Constant::Float(v) => {
                1u8.hash(state);
                v.to_bits().hash(state);
            }
            Constant::Zero(t) => {
                2u8.hash(state);
                t.hash(state);
            }
        }
    }
}

/// Reference to any IR value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueRef {
    Const(Constant),
    Global(GlobalId),
    Func(FuncId),
    Arg(ArgId),
    Inst(InstId),
    Block(BlockId),
}

impl ValueRef {
    /// Shorthand for an `i32` immediate.
    pub fn int(v: i32) -> ValueRef {
        ValueRef::Const(Constant::Int(v))
    }

    /// Shorthand for an `f32` immediate.
    pub fn float(v: f32) -> ValueRef {
        ValueRef::Const(Constant::Float(v))
    }

    /// The integer payload, if this is an integer constant.
    pub fn as_const_int(&self) -> Option<i32> {
        match self {
            ValueRef::Const(Constant::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// The float payload, if this is a float constant.
    pub fn as_const_float(&self) -> Option<f32> {
        match self {
            ValueRef::Const(Constant::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn as_inst(&self) -> Option<InstId> {
        match self {
            ValueRef::Inst(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<BlockId> {
        match self {
            ValueRef::Block(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<FuncId> {
        match self {
            ValueRef::Func(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, ValueRef::Const(_))
    }
}

/// One occurrence of a value as an operand: which instruction, which slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Use {
    pub user: InstId,
    pub slot: usize,
}

/// The set of (user, slot) pairs referring to a value.
pub type UseList = SmallVec<[Use; 4]>;
