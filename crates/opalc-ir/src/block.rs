//! Basic blocks.

use indexmap::IndexSet;

use crate::id::{BlockId, FuncId, InstId};
use crate::value::UseList;

/// A basic block: an ordered instruction list plus its CFG neighborhood.
///
/// Predecessor/successor sets use [`IndexSet`] so iteration order is the
/// insertion order, keeping traversals and printed output deterministic.
/// A well-formed reachable block ends with exactly one terminator; the
/// neighbor sets always mirror what the terminators say (maintained by the
/// owning [`Module`](crate::module::Module)).
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// Label; empty for synthesized blocks, which print with a positional
    /// label instead.
    pub name: String,
    pub parent: FuncId,
    pub insts: Vec<InstId>,
    pub preds: IndexSet<BlockId>,
    pub succs: IndexSet<BlockId>,
    /// Uses of this block as an operand (branch targets, φ predecessors).
    pub uses: UseList,
}

impl BasicBlock {
    pub fn new(parent: FuncId, name: &str) -> Self {
        BasicBlock {
            name: name.to_string(),
            parent,
            insts: Vec::new(),
            preds: IndexSet::new(),
            succs: IndexSet::new(),
            uses: UseList::new(),
        }
    }
}
