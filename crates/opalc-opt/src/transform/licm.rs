//! Loop-invariant code motion.
//!
//! Walks the loop forest inner-first. For each loop it gathers the loop's
//! instructions, the set of globals stored to, and whether any impure call
//! appears; identifies invariant instructions by fixed point (never
//! `alloca`/`store`/`ret`/branches/φ, never impure calls, and loads only
//! from globals that the loop neither stores to nor can clobber through an
//! impure call); then synthesizes a preheader, reroutes every non-latch
//! entry edge through it, splits header φs so initial values arrive via the
//! preheader, and hoists the invariants there in discovery order.

use indexmap::IndexSet;

use opalc_ir::{GlobalId, InstId, Module, Opcode, ValueRef};

use crate::analysis::{FuncInfo, LoopForest, LoopId};
use crate::pass::Pass;

#[derive(Default)]
pub struct LoopInvariantCodeMotion;

impl Pass for LoopInvariantCodeMotion {
    fn name(&self) -> &'static str {
        "licm"
    }

    fn run(&mut self, m: &mut Module) {
        let mut forest = LoopForest::analyze(m);
        let info = FuncInfo::analyze(m);
        for top in forest.top_level.clone() {
            traverse_loop(m, &mut forest, top, &info);
        }
    }
}

/// Sub-loops first, so invariants can bubble outward one level at a time.
fn traverse_loop(m: &mut Module, forest: &mut LoopForest, id: LoopId, info: &FuncInfo) {
    for sub in forest.get(id).sub_loops.clone() {
        traverse_loop(m, forest, sub, info);
    }
    run_on_loop(m, forest, id, info);
}

struct LoopInfo {
    instructions: IndexSet<InstId>,
    updated_globals: IndexSet<GlobalId>,
    contains_impure_call: bool,
}

fn collect_loop_info(m: &Module, forest: &LoopForest, id: LoopId, info: &FuncInfo) -> LoopInfo {
    let mut out = LoopInfo {
        instructions: IndexSet::new(),
        updated_globals: IndexSet::new(),
        contains_impure_call: false,
    };
    collect_into(m, forest, id, info, &mut out);
    out
}

fn collect_into(
    m: &Module,
    forest: &LoopForest,
    id: LoopId,
    info: &FuncInfo,
    out: &mut LoopInfo,
) {
    for &sub in &forest.get(id).sub_loops {
        collect_into(m, forest, sub, info, out);
    }
    for &b in &forest.get(id).blocks {
        for &i in &m.block(b).insts {
            out.instructions.insert(i);
            let inst = m.inst(i);
            if inst.opcode == Opcode::Store {
                if let ValueRef::Global(g) = inst.operands[1] {
                    out.updated_globals.insert(g);
                }
            }
            if let Some(callee) = inst.callee() {
                if !info.is_pure(callee) {
                    out.contains_impure_call = true;
                }
            }
        }
    }
}

fn run_on_loop(m: &mut Module, forest: &mut LoopForest, id: LoopId, info: &FuncInfo) {
    let loop_info = collect_loop_info(m, forest, id, info);
    let mut loop_insts = loop_info.instructions;

    // Fixed point: an instruction is invariant once every operand is either
    // defined outside the loop or already invariant.
    let mut invariant: Vec<InstId> = Vec::new();
    let mut inv_set: IndexSet<InstId> = IndexSet::new();
    loop {
        let mut changed = false;
        for b in forest.get(id).blocks.clone() {
            for i in m.block(b).insts.clone() {
                if inv_set.contains(&i) {
                    continue;
                }
                if !is_hoist_candidate(m, i, &loop_info.updated_globals,
                    loop_info.contains_impure_call, info)
                {
                    continue;
                }
                let all_invariant = m.inst(i).operands.iter().all(|op| match op.as_inst() {
                    Some(def) => !loop_insts.contains(&def) || inv_set.contains(&def),
                    None => true,
                });
                if all_invariant {
                    inv_set.insert(i);
                    loop_insts.shift_remove(&i);
                    invariant.push(i);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    // The preheader slot is filled even when nothing hoists (the empty block
    // is unreachable and dead-code elimination prunes it).
    let header = forest.get(id).header;
    if forest.get(id).preheader.is_none() {
        let func = m.block(header).parent;
        let preheader = m.new_block(func, "");
        forest.get_mut(id).preheader = Some(preheader);
    }
    if inv_set.is_empty() {
        return;
    }
    let preheader = forest.get(id).preheader.expect("preheader just ensured");

    // Split header φs: the non-latch pairs move to a fresh φ in the
    // preheader, and the original φ reads that φ through the preheader edge.
    for i in m.block(header).insts.clone() {
        if !m.inst(i).is_phi() {
            break;
        }
        let pairs = m.inst(i).phi_pairs();
        let (latch_pairs, entry_pairs): (Vec<_>, Vec<_>) = pairs
            .into_iter()
            .partition(|(_, pred)| forest.get(id).latches.contains(pred));
        if entry_pairs.is_empty() {
            continue;
        }
        let ty = m.inst(i).ty;
        let mut entry_ops = Vec::with_capacity(entry_pairs.len() * 2);
        for (v, pred) in entry_pairs {
            entry_ops.push(v);
            entry_ops.push(ValueRef::Block(pred));
        }
        let new_phi = m.build_inst(preheader, Opcode::Phi, ty, entry_ops);
        let mut ops = Vec::with_capacity(latch_pairs.len() * 2 + 2);
        for (v, pred) in latch_pairs {
            ops.push(v);
            ops.push(ValueRef::Block(pred));
        }
        ops.push(ValueRef::Inst(new_phi));
        ops.push(ValueRef::Block(preheader));
        m.set_operands(i, ops);
    }

    // Reroute every non-latch entry edge through the preheader, updating
    // both ends' predecessor/successor sets.
    let preds: Vec<_> = m.block(header).preds.iter().copied().collect();
    let mut rerouted = Vec::new();
    for pred in preds {
        if forest.get(id).latches.contains(&pred) {
            continue;
        }
        let Some(term) = m.terminator(pred) else {
            continue;
        };
        for slot in 0..m.inst(term).operands.len() {
            if m.inst(term).operands[slot] == ValueRef::Block(header) {
                m.set_operand(term, slot, ValueRef::Block(preheader));
            }
        }
        m.block_mut(pred).succs.shift_remove(&header);
        m.block_mut(pred).succs.insert(preheader);
        m.block_mut(preheader).preds.insert(pred);
        rerouted.push(pred);
    }
    for pred in rerouted {
        m.block_mut(header).preds.shift_remove(&pred);
    }

    // Hoist in discovery order, then fall through into the loop.
    for &i in &invariant {
        m.move_inst(i, preheader);
    }
    m.build_br(preheader, header);

    // Outer-loop analysis must see the new block.
    if let Some(parent) = forest.get(id).parent {
        forest.get_mut(parent).blocks.insert(preheader);
    }
}

/// The opcode-level filter: never hoist memory-shape, control, or φ
/// instructions; calls only when pure; loads only from globals the loop
/// provably leaves alone.
fn is_hoist_candidate(
    m: &Module,
    i: InstId,
    updated_globals: &IndexSet<GlobalId>,
    contains_impure_call: bool,
    info: &FuncInfo,
) -> bool {
    let inst = m.inst(i);
    match inst.opcode {
        Opcode::Alloca | Opcode::Store | Opcode::Ret | Opcode::Br | Opcode::CondBr
        | Opcode::Phi => false,
        Opcode::Call => inst.callee().is_some_and(|callee| info.is_pure(callee)),
        Opcode::Load => match inst.operands[0] {
            ValueRef::Global(g) => !updated_globals.contains(&g) && !contains_impure_call,
            _ => false,
        },
        _ => true,
    }
}
