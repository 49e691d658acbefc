//! Dead-code elimination.
//!
//! Mark-and-sweep per function, iterated to a fixed point: unreachable
//! blocks (non-entry, no predecessors) are pruned, critical instructions
//! seed a work-list that marks everything they depend on, and the unmarked
//! remainder is swept. Once per iteration, functions and globals with empty
//! use lists are dropped from the module (`main` survives). Purity comes
//! from [`FuncInfo`].

use std::collections::{HashSet, VecDeque};

use opalc_ir::{FuncId, InstId, Module, Opcode, ValueRef};

use crate::analysis::FuncInfo;
use crate::pass::Pass;

#[derive(Default)]
pub struct DeadCode;

impl Pass for DeadCode {
    fn name(&self) -> &'static str {
        "dead-code"
    }

    fn run(&mut self, m: &mut Module) {
        let info = FuncInfo::analyze(m);
        let mut erased = 0usize;
        loop {
            let mut changed = false;
            for f in m.functions().to_vec() {
                changed |= clear_dead_blocks(m, f);
                let marked = mark(m, f, &info);
                changed |= sweep(m, f, &marked, &mut erased);
            }
            sweep_globals(m);
            if !changed {
                break;
            }
        }
        tracing::debug!(erased, "dead code pass finished");
    }
}

/// Deletes every non-entry block with no predecessors.
fn clear_dead_blocks(m: &mut Module, f: FuncId) -> bool {
    let entry = m.func(f).entry();
    let dead: Vec<_> = m
        .func(f)
        .blocks
        .iter()
        .copied()
        .filter(|&b| Some(b) != entry && m.block(b).preds.is_empty())
        .collect();
    for b in &dead {
        m.erase_block(*b);
    }
    !dead.is_empty()
}

/// Work-list marking from the critical seeds.
fn mark(m: &Module, f: FuncId, info: &FuncInfo) -> HashSet<InstId> {
    let mut marked = HashSet::new();
    let mut work = VecDeque::new();
    for &b in &m.func(f).blocks {
        for &i in &m.block(b).insts {
            if is_critical(m, i, info) {
                marked.insert(i);
                work.push_back(i);
            }
        }
    }
    while let Some(i) = work.pop_front() {
        for &op in &m.inst(i).operands {
            let Some(def) = op.as_inst() else {
                continue;
            };
            if marked.contains(&def) || m.inst_func(def) != f {
                continue;
            }
            marked.insert(def);
            work.push_back(def);
        }
    }
    marked
}

/// Critical instructions anchor liveness: side effects, control flow, and
/// anything whose result is consumed. Calls are judged by their callee's
/// purity alone; a pure call survives only when a marked consumer reaches
/// it through the work-list.
fn is_critical(m: &Module, i: InstId, info: &FuncInfo) -> bool {
    let inst = m.inst(i);
    match inst.opcode {
        Opcode::Call => inst.callee().is_some_and(|callee| !info.is_pure(callee)),
        Opcode::Store | Opcode::Ret | Opcode::Br | Opcode::CondBr | Opcode::Phi => true,
        _ => !inst.uses.is_empty(),
    }
}

fn sweep(m: &mut Module, f: FuncId, marked: &HashSet<InstId>, erased: &mut usize) -> bool {
    let dead: Vec<InstId> = m
        .func(f)
        .blocks
        .iter()
        .flat_map(|&b| m.block(b).insts.iter().copied())
        .filter(|i| !marked.contains(i))
        .collect();
    for &i in &dead {
        m.remove_inst(i);
        *erased += 1;
    }
    !dead.is_empty()
}

/// Drops functions (except `main`) and globals nobody references. Chains of
/// dead functions unravel across outer iterations.
fn sweep_globals(m: &mut Module) {
    let dead_funcs: Vec<FuncId> = m
        .functions()
        .iter()
        .copied()
        .filter(|&f| !m.has_uses(ValueRef::Func(f)) && m.func(f).name != "main")
        .collect();
    let dead_globals: Vec<_> = m
        .globals()
        .iter()
        .copied()
        .filter(|&g| !m.has_uses(ValueRef::Global(g)))
        .collect();
    for f in dead_funcs {
        m.remove_function(f);
    }
    for g in dead_globals {
        m.remove_global(g);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opalc_ir::{ArithOp, Builder, Constant, TypeId};

    fn run(m: &mut Module) {
        DeadCode.run(m);
        m.assert_consistency();
    }

    fn inst_count(m: &Module, f: FuncId) -> usize {
        m.func(f)
            .blocks
            .iter()
            .map(|&b| m.block(b).insts.len())
            .sum()
    }

    #[test]
    fn sweeps_unused_arithmetic_chains() {
        let mut m = Module::new();
        let f = m.new_function("main", vec![], TypeId::I32);
        let entry = m.new_block(f, "entry");
        let mut b = Builder::at(&mut m, entry);
        let unused = b
            .create_int_binary(ArithOp::Add, ValueRef::int(1), ValueRef::int(2))
            .unwrap();
        // `unused` has a consumer, but the consumer itself is dead.
        let _chained = b
            .create_int_binary(ArithOp::Mul, unused, ValueRef::int(3))
            .unwrap();
        b.create_ret(ValueRef::int(0)).unwrap();
        assert_eq!(inst_count(&m, f), 3);
        run(&mut m);
        assert_eq!(inst_count(&m, f), 1);
    }

    #[test]
    fn stores_and_their_operands_survive() {
        let mut m = Module::new();
        let f = m.new_function("main", vec![], TypeId::I32);
        let entry = m.new_block(f, "entry");
        let mut b = Builder::at(&mut m, entry);
        let slot = b.create_alloca(TypeId::I32).unwrap();
        let sum = b
            .create_int_binary(ArithOp::Add, ValueRef::int(1), ValueRef::int(2))
            .unwrap();
        b.create_store(sum, slot).unwrap();
        b.create_ret(ValueRef::int(0)).unwrap();
        run(&mut m);
        // alloca, add, store, ret all anchored by the store.
        assert_eq!(inst_count(&m, f), 4);
    }

    #[test]
    fn impure_calls_survive_pure_calls_do_not() {
        let mut m = Module::new();
        let putint = m.new_function("putint", vec![TypeId::I32], TypeId::VOID);

        let sq = m.new_function("sq", vec![TypeId::I32], TypeId::I32);
        let entry = m.new_block(sq, "entry");
        let mut b = Builder::at(&mut m, entry);
        let arg = ValueRef::Arg(b.module().func(sq).args[0]);
        let v = b.create_int_binary(ArithOp::Mul, arg, arg).unwrap();
        b.create_ret(v).unwrap();

        let f = m.new_function("main", vec![], TypeId::I32);
        let entry = m.new_block(f, "entry");
        let mut b = Builder::at(&mut m, entry);
        b.create_call(putint, vec![ValueRef::int(1)]).unwrap();
        // Result never used: a pure call is not critical.
        b.create_call(sq, vec![ValueRef::int(2)]).unwrap();
        b.create_ret(ValueRef::int(0)).unwrap();

        run(&mut m);
        let opcodes: Vec<_> = m
            .block(m.func(f).entry().unwrap())
            .insts
            .iter()
            .map(|&i| (m.inst(i).opcode, m.inst(i).callee()))
            .collect();
        assert_eq!(opcodes.len(), 2);
        assert_eq!(opcodes[0].1, Some(putint));
        assert_eq!(opcodes[1].0, Opcode::Ret);
    }

    #[test]
    fn prunes_unreachable_blocks() {
        let mut m = Module::new();
        let f = m.new_function("main", vec![], TypeId::I32);
        let entry = m.new_block(f, "entry");
        let orphan = m.new_block(f, "");
        m.build_inst(entry, Opcode::Ret, TypeId::VOID, vec![ValueRef::int(0)]);
        m.build_inst(orphan, Opcode::Ret, TypeId::VOID, vec![ValueRef::int(1)]);
        run(&mut m);
        assert_eq!(m.func(f).blocks.len(), 1);
        assert_eq!(m.func(f).entry(), Some(entry));
    }

    #[test]
    fn unreachable_chains_unravel() {
        // orphan1 -> orphan2; erasing orphan1 exposes orphan2 next round.
        let mut m = Module::new();
        let f = m.new_function("main", vec![], TypeId::I32);
        let entry = m.new_block(f, "entry");
        let orphan1 = m.new_block(f, "");
        let orphan2 = m.new_block(f, "");
        m.build_inst(entry, Opcode::Ret, TypeId::VOID, vec![ValueRef::int(0)]);
        m.build_br(orphan1, orphan2);
        m.build_inst(orphan2, Opcode::Ret, TypeId::VOID, vec![ValueRef::int(1)]);
        run(&mut m);
        assert_eq!(m.func(f).blocks.len(), 1);
    }

    #[test]
    fn global_sweep_removes_unused_functions_and_globals() {
        let mut m = Module::new();
        m.new_global("unused", TypeId::I32, Constant::Zero(TypeId::I32));
        let helper = m.new_function("helper", vec![], TypeId::I32);
        let entry = m.new_block(helper, "entry");
        m.build_inst(entry, Opcode::Ret, TypeId::VOID, vec![ValueRef::int(3)]);

        let f = m.new_function("main", vec![], TypeId::I32);
        let entry = m.new_block(f, "entry");
        m.build_inst(entry, Opcode::Ret, TypeId::VOID, vec![ValueRef::int(0)]);

        run(&mut m);
        assert!(m.find_function("helper").is_none());
        assert!(m.find_function("main").is_some());
        assert!(m.globals().is_empty());
    }

    #[test]
    fn main_is_never_swept() {
        let mut m = Module::new();
        let f = m.new_function("main", vec![], TypeId::I32);
        let entry = m.new_block(f, "entry");
        m.build_inst(entry, Opcode::Ret, TypeId::VOID, vec![ValueRef::int(0)]);
        run(&mut m);
        assert_eq!(m.functions().len(), 1);
    }

    #[test]
    fn dce_is_idempotent() {
        let mut m = Module::new();
        let f = m.new_function("main", vec![], TypeId::I32);
        let entry = m.new_block(f, "entry");
        let mut b = Builder::at(&mut m, entry);
        let slot = b.create_alloca(TypeId::I32).unwrap();
        b.create_store(ValueRef::int(1), slot).unwrap();
        let _dead = b
            .create_int_binary(ArithOp::Add, ValueRef::int(1), ValueRef::int(1))
            .unwrap();
        let v = b.create_load(slot).unwrap();
        b.create_ret(v).unwrap();
        run(&mut m);
        let once: Vec<_> = m.block(m.func(f).entry().unwrap()).insts.clone();
        run(&mut m);
        assert_eq!(m.block(m.func(f).entry().unwrap()).insts, once);
    }
}
