//! Functions and their arguments.

use crate::id::{ArgId, BlockId, FuncId};
use crate::types::TypeId;
use crate::value::UseList;

/// A formal argument, owned by a function and carrying its ordinal.
#[derive(Debug, Clone)]
pub struct Argument {
    pub ty: TypeId,
    pub index: u32,
    pub parent: FuncId,
    pub uses: UseList,
}

/// A function: named, typed, owning an ordered block list and its arguments.
///
/// A function with no blocks is an external declaration (the runtime
/// library); its body is resolved at link time.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    /// The interned function type.
    pub ty: TypeId,
    /// Return type, duplicated out of `ty` for cheap access.
    pub ret: TypeId,
    pub args: Vec<ArgId>,
    /// Ordered blocks; the first is the entry.
    pub blocks: Vec<BlockId>,
    /// Uses of this function as an operand (call sites).
    pub uses: UseList,
}

impl Function {
    /// `true` when this function has no body.
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The entry block, if the function has a body.
    pub fn entry(&self) -> Option<BlockId> {
        self.blocks.first().copied()
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }
}
