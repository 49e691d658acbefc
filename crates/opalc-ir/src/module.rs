//! The module: arena owner of all IR entities and the only mutation surface.
//!
//! Functions, globals, blocks, arguments and instructions live in tombstoned
//! arenas indexed by their id newtypes. Every cross-reference between values
//! is a [`ValueRef`] mediated by use lists, and every mutation goes through
//! `Module` methods so both endpoints stay consistent: writing an operand
//! slot always adjusts the old and new operand's use lists in the same call.
//!
//! A debug-mode [`assert_consistency`](Module::assert_consistency) validates
//! the use-def and CFG invariants; pass drivers run it between passes.

use std::collections::HashSet;

use smallvec::SmallVec;

use crate::block::BasicBlock;
use crate::func::{Argument, Function};
use crate::id::{ArgId, BlockId, FuncId, GlobalId, InstId};
use crate::inst::{Instruction, Opcode};
use crate::types::{TypeId, TypeInterner};
use crate::value::{Constant, Use, UseList, ValueRef};

/// A global variable: named, typed, zero-or-constant initialized,
/// module-owned. `ty` is the pointee type; the value of the global *as an
/// operand* is a pointer (`ptr_ty`).
#[derive(Debug, Clone)]
pub struct GlobalVariable {
    pub name: String,
    /// Type of the stored data.
    pub ty: TypeId,
    /// Interned `*ty`, the type this global has in operand position.
    pub ptr_ty: TypeId,
    pub init: Constant,
    pub uses: UseList,
}

/// The IR module: type interner plus ordered functions and globals.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub types: TypeInterner,
    insts: Vec<Option<Instruction>>,
    blocks: Vec<Option<BasicBlock>>,
    args: Vec<Option<Argument>>,
    funcs: Vec<Option<Function>>,
    global_slots: Vec<Option<GlobalVariable>>,
    /// Live functions in creation order.
    functions: Vec<FuncId>,
    /// Live globals in creation order.
    globals: Vec<GlobalId>,
}

impl Module {
    pub fn new() -> Self {
        Module {
            types: TypeInterner::new(),
            ..Default::default()
        }
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Adds a function with the given signature. The function starts with no
    /// blocks, i.e. as an external declaration; adding an entry block turns
    /// it into a definition.
    pub fn new_function(&mut self, name: &str, param_tys: Vec<TypeId>, ret: TypeId) -> FuncId {
        let id = FuncId(self.funcs.len() as u32);
        let ty = self.types.func_of(ret, param_tys.clone());
        let mut args = Vec::with_capacity(param_tys.len());
        for (index, ty) in param_tys.into_iter().enumerate() {
            let arg_id = ArgId(self.args.len() as u32);
            self.args.push(Some(Argument {
                ty,
                index: index as u32,
                parent: id,
                uses: UseList::new(),
            }));
            args.push(arg_id);
        }
        self.funcs.push(Some(Function {
            name: name.to_string(),
            ty,
            ret,
            args,
            blocks: Vec::new(),
            uses: UseList::new(),
        }));
        self.functions.push(id);
        id
    }

    /// Adds a global variable of pointee type `ty` with the given initializer.
    pub fn new_global(&mut self, name: &str, ty: TypeId, init: Constant) -> GlobalId {
        let id = GlobalId(self.global_slots.len() as u32);
        let ptr_ty = self.types.ptr_to(ty);
        self.global_slots.push(Some(GlobalVariable {
            name: name.to_string(),
            ty,
            ptr_ty,
            init,
            uses: UseList::new(),
        }));
        self.globals.push(id);
        id
    }

    /// Appends a fresh empty block to a function.
    pub fn new_block(&mut self, func: FuncId, name: &str) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Some(BasicBlock::new(func, name)));
        self.func_mut(func).blocks.push(id);
        id
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn inst(&self, id: InstId) -> &Instruction {
        self.insts[id.0 as usize]
            .as_ref()
            .expect("reference to removed instruction")
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut Instruction {
        self.insts[id.0 as usize]
            .as_mut()
            .expect("reference to removed instruction")
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.blocks[id.0 as usize]
            .as_ref()
            .expect("reference to erased block")
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        self.blocks[id.0 as usize]
            .as_mut()
            .expect("reference to erased block")
    }

    pub fn arg(&self, id: ArgId) -> &Argument {
        self.args[id.0 as usize]
            .as_ref()
            .expect("reference to removed argument")
    }

    pub fn func(&self, id: FuncId) -> &Function {
        self.funcs[id.0 as usize]
            .as_ref()
            .expect("reference to removed function")
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut Function {
        self.funcs[id.0 as usize]
            .as_mut()
            .expect("reference to removed function")
    }

    pub fn global(&self, id: GlobalId) -> &GlobalVariable {
        self.global_slots[id.0 as usize]
            .as_ref()
            .expect("reference to removed global")
    }

    /// Live functions in creation order.
    pub fn functions(&self) -> &[FuncId] {
        &self.functions
    }

    /// Live globals in creation order.
    pub fn globals(&self) -> &[GlobalId] {
        &self.globals
    }

    pub fn find_function(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .copied()
            .find(|&f| self.func(f).name == name)
    }

    /// The type a value has in operand position.
    pub fn type_of(&self, val: ValueRef) -> TypeId {
        match val {
            ValueRef::Const(Constant::Int(_)) => TypeId::I32,
            ValueRef::Const(Constant::Float(_)) => TypeId::F32,
            ValueRef::Const(Constant::Zero(t)) => t,
            ValueRef::Global(g) => self.global(g).ptr_ty,
            ValueRef::Func(f) => self.func(f).ty,
            ValueRef::Arg(a) => self.arg(a).ty,
            ValueRef::Inst(i) => self.inst(i).ty,
            ValueRef::Block(_) => TypeId::VOID,
        }
    }

    /// Uses of a value. Constants are immediates and have none.
    pub fn uses_of(&self, val: ValueRef) -> &[Use] {
        match val {
            ValueRef::Const(_) => &[],
            ValueRef::Global(g) => &self.global(g).uses,
            ValueRef::Func(f) => &self.func(f).uses,
            ValueRef::Arg(a) => &self.arg(a).uses,
            ValueRef::Inst(i) => &self.inst(i).uses,
            ValueRef::Block(b) => &self.block(b).uses,
        }
    }

    pub fn has_uses(&self, val: ValueRef) -> bool {
        !self.uses_of(val).is_empty()
    }

    /// The function owning an instruction.
    pub fn inst_func(&self, id: InstId) -> FuncId {
        self.block(self.inst(id).parent).parent
    }

    /// The block's terminator, when its last instruction is one.
    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        let last = *self.block(block).insts.last()?;
        self.inst(last).is_terminator().then_some(last)
    }

    pub fn is_terminated(&self, block: BlockId) -> bool {
        self.terminator(block).is_some()
    }

    // -----------------------------------------------------------------------
    // Instruction construction
    // -----------------------------------------------------------------------

    /// Appends an instruction to a block, registering operand uses. Creating
    /// a `Br`/`CondBr` also records the CFG edges to its targets.
    ///
    /// This is the raw constructor: operand typing is the caller's contract
    /// (the [`Builder`](crate::builder::Builder) checks it; passes construct
    /// already-typed instructions).
    pub fn build_inst(
        &mut self,
        block: BlockId,
        opcode: Opcode,
        ty: TypeId,
        operands: Vec<ValueRef>,
    ) -> InstId {
        let at = self.block(block).insts.len();
        self.build_inst_at(block, at, opcode, ty, operands)
    }

    /// Like [`build_inst`](Self::build_inst) but inserts before the block's
    /// terminator when one is present (used for entry-block allocas).
    pub fn build_inst_before_terminator(
        &mut self,
        block: BlockId,
        opcode: Opcode,
        ty: TypeId,
        operands: Vec<ValueRef>,
    ) -> InstId {
        let len = self.block(block).insts.len();
        let at = if self.is_terminated(block) { len - 1 } else { len };
        self.build_inst_at(block, at, opcode, ty, operands)
    }

    fn build_inst_at(
        &mut self,
        block: BlockId,
        at: usize,
        opcode: Opcode,
        ty: TypeId,
        operands: Vec<ValueRef>,
    ) -> InstId {
        let id = InstId(self.insts.len() as u32);
        for (slot, &op) in operands.iter().enumerate() {
            self.add_use(op, id, slot);
        }
        self.insts.push(Some(Instruction {
            opcode,
            ty,
            operands: SmallVec::from_vec(operands),
            parent: block,
            uses: UseList::new(),
        }));
        self.block_mut(block).insts.insert(at, id);
        match opcode {
            Opcode::Br => {
                let target = self.inst(id).operands[0].as_block().expect("br target");
                self.add_edge(block, target);
            }
            Opcode::CondBr => {
                let then = self.inst(id).operands[1].as_block().expect("br target");
                let els = self.inst(id).operands[2].as_block().expect("br target");
                self.add_edge(block, then);
                self.add_edge(block, els);
            }
            _ => {}
        }
        id
    }

    /// Appends `br target` to a block.
    pub fn build_br(&mut self, block: BlockId, target: BlockId) -> InstId {
        self.build_inst(block, Opcode::Br, TypeId::VOID, vec![ValueRef::Block(target)])
    }

    fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.block_mut(from).succs.insert(to);
        self.block_mut(to).preds.insert(from);
    }

    // -----------------------------------------------------------------------
    // Use-list bookkeeping
    // -----------------------------------------------------------------------

    /// The use list behind a value, or `None` for constants and for entities
    /// that are already tombstoned (sweeps remove interdependent dead
    /// instructions in arbitrary order, so a detach may race a removal).
    fn use_list_mut(&mut self, val: ValueRef) -> Option<&mut UseList> {
        match val {
            ValueRef::Const(_) => None,
            ValueRef::Global(g) => self.global_slots[g.0 as usize]
                .as_mut()
                .map(|global| &mut global.uses),
            ValueRef::Func(f) => self.funcs[f.0 as usize].as_mut().map(|func| &mut func.uses),
            ValueRef::Arg(a) => self.args[a.0 as usize].as_mut().map(|arg| &mut arg.uses),
            ValueRef::Inst(i) => self.insts[i.0 as usize].as_mut().map(|inst| &mut inst.uses),
            ValueRef::Block(b) => self.blocks[b.0 as usize].as_mut().map(|block| &mut block.uses),
        }
    }

    fn add_use(&mut self, val: ValueRef, user: InstId, slot: usize) {
        if let Some(uses) = self.use_list_mut(val) {
            uses.push(Use { user, slot });
        }
    }

    fn remove_use(&mut self, val: ValueRef, user: InstId, slot: usize) {
        if let Some(uses) = self.use_list_mut(val) {
            if let Some(pos) = uses.iter().position(|u| u.user == user && u.slot == slot) {
                uses.swap_remove(pos);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Rewrites one operand slot, keeping both operands' use lists in sync.
    pub fn set_operand(&mut self, user: InstId, slot: usize, new: ValueRef) {
        let old = self.inst(user).operands[slot];
        if old == new {
            return;
        }
        self.remove_use(old, user, slot);
        self.add_use(new, user, slot);
        self.inst_mut(user).operands[slot] = new;
    }

    /// Replaces the full operand list of an instruction. Slot indices in use
    /// lists shift when the operand count changes, so all old slots are
    /// detached and the new list is attached from scratch.
    pub fn set_operands(&mut self, user: InstId, new_ops: Vec<ValueRef>) {
        let old: Vec<ValueRef> = self.inst(user).operands.to_vec();
        for (slot, op) in old.into_iter().enumerate() {
            self.remove_use(op, user, slot);
        }
        for (slot, &op) in new_ops.iter().enumerate() {
            self.add_use(op, user, slot);
        }
        self.inst_mut(user).operands = SmallVec::from_vec(new_ops);
    }

    /// Replaces every use of `old` with `new`.
    pub fn replace_all_uses(&mut self, old: ValueRef, new: ValueRef) {
        if old == new {
            return;
        }
        let uses: Vec<Use> = self.uses_of(old).to_vec();
        if let Some(list) = self.use_list_mut(old) {
            list.clear();
        }
        for u in &uses {
            self.inst_mut(u.user).operands[u.slot] = new;
        }
        if let Some(list) = self.use_list_mut(new) {
            list.extend(uses);
        }
    }

    /// Removes an instruction from its block, detaching each operand slot
    /// from the operand's use list first.
    pub fn remove_inst(&mut self, id: InstId) {
        let operands: Vec<ValueRef> = self.inst(id).operands.to_vec();
        for (slot, op) in operands.into_iter().enumerate() {
            self.remove_use(op, id, slot);
        }
        let parent = self.inst(id).parent;
        self.block_mut(parent).insts.retain(|&i| i != id);
        self.insts[id.0 as usize] = None;
    }

    /// Moves an instruction to the end of another block. Uses are untouched;
    /// callers fix the CFG afterwards when terminators move.
    pub fn move_inst(&mut self, id: InstId, to: BlockId) {
        let from = self.inst(id).parent;
        self.block_mut(from).insts.retain(|&i| i != id);
        self.block_mut(to).insts.push(id);
        self.inst_mut(id).parent = to;
    }

    /// Erases a block: removes all its instructions (detaching their operand
    /// uses), unlinks it from its CFG neighbors, and drops it from the
    /// owning function.
    pub fn erase_block(&mut self, id: BlockId) {
        for i in self.block(id).insts.clone() {
            let operands: Vec<ValueRef> = self.inst(i).operands.to_vec();
            for (slot, op) in operands.into_iter().enumerate() {
                self.remove_use(op, i, slot);
            }
            self.insts[i.0 as usize] = None;
        }
        let preds: Vec<BlockId> = self.block(id).preds.iter().copied().collect();
        let succs: Vec<BlockId> = self.block(id).succs.iter().copied().collect();
        for p in preds {
            self.block_mut(p).succs.shift_remove(&id);
        }
        for s in succs {
            self.block_mut(s).preds.shift_remove(&id);
        }
        let func = self.block(id).parent;
        self.func_mut(func).blocks.retain(|&b| b != id);
        self.blocks[id.0 as usize] = None;
    }

    /// Removes a whole function: all blocks, instructions (detaching their
    /// operand uses so callees and globals see the references disappear),
    /// arguments, and the function itself.
    pub fn remove_function(&mut self, id: FuncId) {
        debug_assert!(
            self.func(id).uses.is_empty(),
            "removing a function that still has call sites"
        );
        for block in self.func(id).blocks.clone() {
            for i in self.block(block).insts.clone() {
                let operands: Vec<ValueRef> = self.inst(i).operands.to_vec();
                for (slot, op) in operands.into_iter().enumerate() {
                    self.remove_use(op, i, slot);
                }
                self.insts[i.0 as usize] = None;
            }
            self.blocks[block.0 as usize] = None;
        }
        for arg in self.func(id).args.clone() {
            self.args[arg.0 as usize] = None;
        }
        self.functions.retain(|&f| f != id);
        self.funcs[id.0 as usize] = None;
    }

    /// Removes a global variable.
    pub fn remove_global(&mut self, id: GlobalId) {
        debug_assert!(
            self.global(id).uses.is_empty(),
            "removing a global that still has uses"
        );
        self.globals.retain(|&g| g != id);
        self.global_slots[id.0 as usize] = None;
    }

    /// Recomputes every block's predecessor/successor sets of a function
    /// from its terminators.
    pub fn rebuild_cfg(&mut self, func: FuncId) {
        let blocks = self.func(func).blocks.clone();
        for &b in &blocks {
            let bb = self.block_mut(b);
            bb.preds.clear();
            bb.succs.clear();
        }
        for &b in &blocks {
            let Some(term) = self.terminator(b) else {
                continue;
            };
            let targets: Vec<BlockId> = match self.inst(term).opcode {
                Opcode::Br => vec![self.inst(term).operands[0].as_block().expect("br target")],
                Opcode::CondBr => vec![
                    self.inst(term).operands[1].as_block().expect("br target"),
                    self.inst(term).operands[2].as_block().expect("br target"),
                ],
                _ => Vec::new(),
            };
            for t in targets {
                self.add_edge(b, t);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Consistency checking
    // -----------------------------------------------------------------------

    /// Blocks reachable from a function's entry along successor edges.
    pub fn reachable_blocks(&self, func: FuncId) -> HashSet<BlockId> {
        let mut seen = HashSet::new();
        let Some(entry) = self.func(func).entry() else {
            return seen;
        };
        let mut work = vec![entry];
        while let Some(b) = work.pop() {
            if seen.insert(b) {
                work.extend(self.block(b).succs.iter().copied());
            }
        }
        seen
    }

    /// Validates the structural invariants; panics on violation. A broken
    /// use list or CFG set is an internal compiler error.
    ///
    /// Checked:
    /// - every reachable block ends with a terminator, and no block has a
    ///   terminator mid-block;
    /// - pred/succ sets match exactly what the terminators target;
    /// - every operand slot is mirrored in the operand's use list and every
    ///   use-list entry points back at a live operand slot.
    pub fn assert_consistency(&self) {
        for &f in &self.functions {
            let func = self.func(f);
            let reachable = self.reachable_blocks(f);
            for &b in &func.blocks {
                let bb = self.block(b);
                for (pos, &i) in bb.insts.iter().enumerate() {
                    let inst = self.inst(i);
                    assert_eq!(inst.parent, b, "instruction parent out of sync");
                    if inst.is_terminator() && pos + 1 != bb.insts.len() {
                        panic!("terminator mid-block in function '{}'", func.name);
                    }
                    for (slot, &op) in inst.operands.iter().enumerate() {
                        let mirrored = self
                            .uses_of(op)
                            .iter()
                            .any(|u| u.user == i && u.slot == slot);
                        assert!(
                            op.is_const() || mirrored,
                            "operand {:?} of {:?} missing from use list",
                            op,
                            i
                        );
                    }
                }
                if reachable.contains(&b) {
                    let terminated = bb
                        .insts
                        .last()
                        .is_some_and(|&i| self.inst(i).is_terminator());
                    assert!(
                        terminated,
                        "reachable block without terminator in '{}'",
                        func.name
                    );
                }
                let mut expected: Vec<BlockId> = Vec::new();
                if let Some(term) = self.terminator(b) {
                    match self.inst(term).opcode {
                        Opcode::Br => {
                            expected.push(self.inst(term).operands[0].as_block().unwrap())
                        }
                        Opcode::CondBr => {
                            expected.push(self.inst(term).operands[1].as_block().unwrap());
                            expected.push(self.inst(term).operands[2].as_block().unwrap());
                        }
                        _ => {}
                    }
                }
                for t in &expected {
                    assert!(bb.succs.contains(t), "successor set missing branch target");
                    assert!(
                        self.block(*t).preds.contains(&b),
                        "predecessor set missing incoming edge"
                    );
                }
                for s in &bb.succs {
                    assert!(
                        expected.contains(s),
                        "stale successor edge in '{}'",
                        func.name
                    );
                }
                for p in &bb.preds {
                    assert!(
                        self.block(*p).succs.contains(&b),
                        "pred/succ sets disagree"
                    );
                }
            }
        }
        // Reverse direction: every recorded use points at a live operand slot.
        let check_uses = |val: ValueRef, uses: &UseList| {
            for u in uses {
                let inst = self.insts[u.user.0 as usize]
                    .as_ref()
                    .unwrap_or_else(|| panic!("use list entry for removed instruction"));
                assert!(
                    u.slot < inst.operands.len() && inst.operands[u.slot] == val,
                    "use list entry does not match operand slot"
                );
            }
        };
        for &f in &self.functions {
            check_uses(ValueRef::Func(f), &self.func(f).uses);
            for &a in &self.func(f).args {
                check_uses(ValueRef::Arg(a), &self.arg(a).uses);
            }
            for &b in &self.func(f).blocks {
                check_uses(ValueRef::Block(b), &self.block(b).uses);
                for &i in &self.block(b).insts {
                    check_uses(ValueRef::Inst(i), &self.inst(i).uses);
                }
            }
        }
        for &g in &self.globals {
            check_uses(ValueRef::Global(g), &self.global(g).uses);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inst::ArithOp;

    fn test_module() -> (Module, FuncId, BlockId) {
        let mut m = Module::new();
        let f = m.new_function("f", vec![TypeId::I32], TypeId::I32);
        let entry = m.new_block(f, "entry");
        (m, f, entry)
    }

    #[test]
    fn build_inst_registers_uses() {
        let (mut m, f, entry) = test_module();
        let a = ValueRef::Arg(m.func(f).args[0]);
        let add = m.build_inst(
            entry,
            Opcode::IntBinary(ArithOp::Add),
            TypeId::I32,
            vec![a, ValueRef::int(1)],
        );
        assert_eq!(m.uses_of(a), &[Use { user: add, slot: 0 }]);
        // Constants are immediates: no bookkeeping.
        assert!(m.uses_of(ValueRef::int(1)).is_empty());
        m.build_inst(entry, Opcode::Ret, TypeId::VOID, vec![ValueRef::Inst(add)]);
        m.assert_consistency();
    }

    #[test]
    fn replace_all_uses_rewires_operands() {
        let (mut m, f, entry) = test_module();
        let a = ValueRef::Arg(m.func(f).args[0]);
        let add = m.build_inst(
            entry,
            Opcode::IntBinary(ArithOp::Add),
            TypeId::I32,
            vec![a, a],
        );
        let ret = m.build_inst(entry, Opcode::Ret, TypeId::VOID, vec![ValueRef::Inst(add)]);
        m.replace_all_uses(ValueRef::Inst(add), ValueRef::int(7));
        assert_eq!(m.inst(ret).operands[0], ValueRef::int(7));
        assert!(m.uses_of(ValueRef::Inst(add)).is_empty());
        m.assert_consistency();
    }

    #[test]
    fn remove_inst_detaches_operand_uses() {
        let (mut m, f, entry) = test_module();
        let a = ValueRef::Arg(m.func(f).args[0]);
        let add = m.build_inst(
            entry,
            Opcode::IntBinary(ArithOp::Add),
            TypeId::I32,
            vec![a, ValueRef::int(2)],
        );
        assert_eq!(m.uses_of(a).len(), 1);
        m.remove_inst(add);
        assert!(m.uses_of(a).is_empty());
        assert!(m.block(entry).insts.is_empty());
    }

    #[test]
    fn branch_construction_maintains_cfg_edges() {
        let (mut m, f, entry) = test_module();
        let next = m.new_block(f, "next");
        m.build_br(entry, next);
        assert!(m.block(entry).succs.contains(&next));
        assert!(m.block(next).preds.contains(&entry));
        m.build_inst(next, Opcode::Ret, TypeId::VOID, vec![ValueRef::int(0)]);
        m.assert_consistency();
    }

    #[test]
    fn erase_block_unlinks_neighbors() {
        let (mut m, f, entry) = test_module();
        let dead = m.new_block(f, "dead");
        let next = m.new_block(f, "next");
        m.build_br(entry, next);
        m.build_br(dead, next);
        m.build_inst(next, Opcode::Ret, TypeId::VOID, vec![ValueRef::int(0)]);
        assert_eq!(m.block(next).preds.len(), 2);
        m.erase_block(dead);
        assert_eq!(m.block(next).preds.len(), 1);
        assert_eq!(m.func(f).blocks.len(), 2);
        m.assert_consistency();
    }

    #[test]
    fn rebuild_cfg_recomputes_from_terminators() {
        let (mut m, f, entry) = test_module();
        let next = m.new_block(f, "next");
        m.build_br(entry, next);
        m.build_inst(next, Opcode::Ret, TypeId::VOID, vec![ValueRef::int(0)]);
        // Scramble the sets, then rebuild.
        m.block_mut(entry).succs.clear();
        m.block_mut(next).preds.clear();
        m.rebuild_cfg(f);
        assert!(m.block(entry).succs.contains(&next));
        assert!(m.block(next).preds.contains(&entry));
        m.assert_consistency();
    }

    #[test]
    fn remove_function_releases_callee_uses() {
        let mut m = Module::new();
        let callee = m.new_function("callee", vec![], TypeId::I32);
        let caller = m.new_function("caller", vec![], TypeId::I32);
        let entry = m.new_block(caller, "entry");
        let call = m.build_inst(
            entry,
            Opcode::Call,
            TypeId::I32,
            vec![ValueRef::Func(callee)],
        );
        m.build_inst(entry, Opcode::Ret, TypeId::VOID, vec![ValueRef::Inst(call)]);
        assert_eq!(m.uses_of(ValueRef::Func(callee)).len(), 1);
        m.remove_function(caller);
        assert!(m.uses_of(ValueRef::Func(callee)).is_empty());
        assert_eq!(m.functions(), &[callee]);
    }

    #[test]
    fn set_operands_reindexes_use_slots() {
        let (mut m, f, entry) = test_module();
        let a = ValueRef::Arg(m.func(f).args[0]);
        let phi = m.build_inst(
            entry,
            Opcode::Phi,
            TypeId::I32,
            vec![a, ValueRef::Block(entry), ValueRef::int(0), ValueRef::Block(entry)],
        );
        // Shrink to a single pair; slot bookkeeping must survive.
        m.set_operands(phi, vec![a, ValueRef::Block(entry)]);
        assert_eq!(m.uses_of(a), &[Use { user: phi, slot: 0 }]);
        assert_eq!(m.inst(phi).operands.len(), 2);
    }
}
