//! Instruction opcodes and the instruction record.
//!
//! The opcode vocabulary is grouped: binary arithmetic and comparisons carry
//! a sub-enum payload selecting the concrete operation, split by operand
//! family (integer vs float) the way the emitted code distinguishes
//! `add`/`fadd` and `icmp`/`fcmp`.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::id::BlockId;
use crate::types::TypeId;
use crate::value::{UseList, ValueRef};

/// Binary arithmetic operators, shared by the integer and float families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    /// Signed division for the integer family, `fdiv` for the float family.
    Div,
}

/// Comparison predicates, shared by `icmp` and `fcmp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpPred {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Instruction opcodes.
///
/// Operand shapes (positional, see [`Instruction::operands`]):
/// - `Alloca` -- none; the result type is the pointer to the allocated slot.
/// - `Load` -- `[ptr]`; `Store` -- `[val, ptr]`.
/// - `IntBinary`/`FloatBinary`/`IntCmp`/`FloatCmp` -- `[lhs, rhs]`.
/// - `SiToFp`/`FpToSi`/`Zext` -- `[val]`.
/// - `Br` -- `[target]`; `CondBr` -- `[cond, then, else]`;
///   `Ret` -- `[]` or `[val]`.
/// - `Call` -- `[callee, args...]`.
/// - `GetElementPtr` -- `[ptr, idx...]`.
/// - `Phi` -- `[val, block]` pairs, flattened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opcode {
    // -- Memory --
    Alloca,
    Load,
    Store,

    // -- Arithmetic --
    IntBinary(ArithOp),
    FloatBinary(ArithOp),

    // -- Comparison --
    IntCmp(CmpPred),
    FloatCmp(CmpPred),

    // -- Conversions --
    SiToFp,
    FpToSi,
    Zext,

    // -- Control --
    Br,
    CondBr,
    Ret,

    // -- Calls & addressing --
    Call,
    GetElementPtr,
    Phi,
}

impl Opcode {
    /// Terminators end a basic block and transfer control elsewhere.
    pub fn is_terminator(&self) -> bool {
        matches!(self, Opcode::Br | Opcode::CondBr | Opcode::Ret)
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Opcode::Phi)
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Opcode::Call)
    }

    pub fn is_int_binary(&self) -> bool {
        matches!(self, Opcode::IntBinary(_))
    }

    pub fn is_float_binary(&self) -> bool {
        matches!(self, Opcode::FloatBinary(_))
    }

    pub fn is_cmp(&self) -> bool {
        matches!(self, Opcode::IntCmp(_) | Opcode::FloatCmp(_))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pred = |p: &CmpPred| match p {
            CmpPred::Eq => "eq",
            CmpPred::Ne => "ne",
            CmpPred::Lt => "lt",
            CmpPred::Le => "le",
            CmpPred::Gt => "gt",
            CmpPred::Ge => "ge",
        };
        match self {
            Opcode::Alloca => write!(f, "alloca"),
            Opcode::Load => write!(f, "load"),
            Opcode::Store => write!(f, "store"),
            Opcode::IntBinary(ArithOp::Add) => write!(f, "add"),
            Opcode::IntBinary(ArithOp::Sub) => write!(f, "sub"),
            Opcode::IntBinary(ArithOp::Mul) => write!(f, "mul"),
            Opcode::IntBinary(ArithOp::Div) => write!(f, "sdiv"),
            Opcode::FloatBinary(ArithOp::Add) => write!(f, "fadd"),
            Opcode::FloatBinary(ArithOp::Sub) => write!(f, "fsub"),
            Opcode::FloatBinary(ArithOp::Mul) => write!(f, "fmul"),
            Opcode::FloatBinary(ArithOp::Div) => write!(f, "fdiv"),
            Opcode::IntCmp(p) => write!(f, "icmp {}", pred(p)),
            Opcode::FloatCmp(p) => write!(f, "fcmp {}", pred(p)),
            Opcode::SiToFp => write!(f, "sitofp"),
            Opcode::FpToSi => write!(f, "fptosi"),
            Opcode::Zext => write!(f, "zext"),
            Opcode::Br => write!(f, "br"),
            Opcode::CondBr => write!(f, "cond_br"),
            Opcode::Ret => write!(f, "ret"),
            Opcode::Call => write!(f, "call"),
            Opcode::GetElementPtr => write!(f, "getelementptr"),
            Opcode::Phi => write!(f, "phi"),
        }
    }
}

/// One instruction: opcode, result type, positional operands, owning block,
/// and the uses of its result.
///
/// `ty` is [`TypeId::VOID`] for instructions that produce no value
/// (`store`, terminators, calls to void functions).
#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    pub ty: TypeId,
    pub operands: SmallVec<[ValueRef; 4]>,
    pub parent: BlockId,
    pub uses: UseList,
}

impl Instruction {
    pub fn is_terminator(&self) -> bool {
        self.opcode.is_terminator()
    }

    pub fn is_phi(&self) -> bool {
        self.opcode.is_phi()
    }

    /// For a `Call`, the callee operand.
    pub fn callee(&self) -> Option<crate::id::FuncId> {
        if self.opcode.is_call() {
            self.operands.first().and_then(|v| v.as_func())
        } else {
            None
        }
    }

    /// For a `Call`, the argument operands.
    pub fn call_args(&self) -> &[ValueRef] {
        if self.opcode.is_call() {
            &self.operands[1..]
        } else {
            &[]
        }
    }

    /// For a `Phi`, the `(value, predecessor)` pairs.
    pub fn phi_pairs(&self) -> Vec<(ValueRef, BlockId)> {
        debug_assert!(self.is_phi());
        self.operands
            .chunks(2)
            .filter_map(|pair| match pair {
                [val, block] => block.as_block().map(|b| (*val, b)),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminator_predicates() {
        assert!(Opcode::Br.is_terminator());
        assert!(Opcode::CondBr.is_terminator());
        assert!(Opcode::Ret.is_terminator());
        assert!(!Opcode::Call.is_terminator());
        assert!(!Opcode::IntBinary(ArithOp::Add).is_terminator());
        assert!(!Opcode::Phi.is_terminator());
    }

    #[test]
    fn cmp_predicates_cover_both_families() {
        assert!(Opcode::IntCmp(CmpPred::Lt).is_cmp());
        assert!(Opcode::FloatCmp(CmpPred::Ge).is_cmp());
        assert!(!Opcode::Zext.is_cmp());
    }

    #[test]
    fn opcode_mnemonics() {
        assert_eq!(Opcode::IntBinary(ArithOp::Div).to_string(), "sdiv");
        assert_eq!(Opcode::FloatBinary(ArithOp::Add).to_string(), "fadd");
        assert_eq!(Opcode::IntCmp(CmpPred::Le).to_string(), "icmp le");
        assert_eq!(Opcode::GetElementPtr.to_string(), "getelementptr");
    }
}
