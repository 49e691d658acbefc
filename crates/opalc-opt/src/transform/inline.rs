//! Function inlining.
//!
//! Recursion-aware and size-bounded: a call site is inlined when the callee
//! is not self-recursive, not the caller itself, not a runtime intrinsic,
//! has a body, and is smaller than the block cap. The callee's blocks are
//! cloned into the caller, operands rewired through a value map, return
//! paths merged into a join block (with a φ when several non-void returns
//! exist), and the instructions after the call migrate into the join block.
//! After a successful inline the scan of that function restarts.

use std::collections::{HashMap, HashSet};

use opalc_ir::{FuncId, InstId, Module, Opcode, TypeId, ValueRef};

use crate::pass::Pass;

/// External runtime symbols that are never inlined (and never scanned as
/// callers -- they have no bodies).
const RUNTIME_FUNCS: [&str; 14] = [
    "getint",
    "getch",
    "getfloat",
    "getarray",
    "getfarray",
    "putint",
    "putch",
    "putarray",
    "putfloat",
    "putfarray",
    "memset_int",
    "memset_float",
    "_sysy_starttime",
    "_sysy_stoptime",
];

pub struct FunctionInline {
    /// Callees with at least this many blocks are skipped. The default
    /// preserves the "fewer than 6 basic blocks" rule.
    pub max_callee_blocks: usize,
}

impl Default for FunctionInline {
    fn default() -> Self {
        FunctionInline {
            max_callee_blocks: 6,
        }
    }
}

impl Pass for FunctionInline {
    fn name(&self) -> &'static str {
        "function-inline"
    }

    fn run(&mut self, m: &mut Module) {
        let recursive = self_recursive_functions(m);
        for f in m.functions().to_vec() {
            if RUNTIME_FUNCS.contains(&m.func(f).name.as_str()) {
                continue;
            }
            // Restart the scan after every successful inline.
            while let Some((call, callee)) = self.find_inlineable_site(m, f, &recursive) {
                inline_site(m, call, callee);
                tracing::debug!(
                    caller = %m.func(f).name,
                    callee = %m.func(callee).name,
                    "inlined call site"
                );
            }
        }
    }
}

impl FunctionInline {
    fn find_inlineable_site(
        &self,
        m: &Module,
        f: FuncId,
        recursive: &HashSet<FuncId>,
    ) -> Option<(InstId, FuncId)> {
        for &b in &m.func(f).blocks {
            for &i in &m.block(b).insts {
                let Some(callee) = m.inst(i).callee() else {
                    continue;
                };
                if callee == f
                    || recursive.contains(&callee)
                    || RUNTIME_FUNCS.contains(&m.func(callee).name.as_str())
                    || m.func(callee).is_declaration()
                    || m.func(callee).blocks.len() >= self.max_callee_blocks
                {
                    continue;
                }
                // A non-void callee that never returns has nothing to
                // forward to the call's users; leave such sites alone.
                if m.func(callee).ret != TypeId::VOID && count_value_rets(m, callee) == 0 {
                    continue;
                }
                return Some((i, callee));
            }
        }
        None
    }
}

/// Functions containing a call to themselves.
fn self_recursive_functions(m: &Module) -> HashSet<FuncId> {
    let mut recursive = HashSet::new();
    for &f in m.functions() {
        'blocks: for &b in &m.func(f).blocks {
            for &i in &m.block(b).insts {
                if m.inst(i).callee() == Some(f) {
                    recursive.insert(f);
                    break 'blocks;
                }
            }
        }
    }
    recursive
}

fn count_value_rets(m: &Module, f: FuncId) -> usize {
    m.func(f)
        .blocks
        .iter()
        .flat_map(|&b| m.block(b).insts.iter())
        .filter(|&&i| m.inst(i).opcode == Opcode::Ret && !m.inst(i).operands.is_empty())
        .count()
}

/// Splices `callee` into the caller at `call`.
fn inline_site(m: &mut Module, call: InstId, callee: FuncId) {
    let call_bb = m.inst(call).parent;
    let caller = m.block(call_bb).parent;
    let ret_is_void = m.func(callee).ret == TypeId::VOID;

    // Value map: formals to actuals at this site.
    let mut vmap: HashMap<ValueRef, ValueRef> = HashMap::new();
    for (idx, &arg) in m.func(callee).args.clone().iter().enumerate() {
        vmap.insert(ValueRef::Arg(arg), m.inst(call).operands[idx + 1]);
    }

    // Clone every block and instruction. Void returns are dropped here (the
    // blocks branch to the join instead); non-void return clones are
    // collected for the merge below. φ-nodes keep their block-leading
    // position because cloning preserves instruction order.
    let origin_blocks = m.func(callee).blocks.clone();
    let mut new_blocks = Vec::with_capacity(origin_blocks.len());
    let mut ret_void_bbs = Vec::new();
    let mut ret_list: Vec<InstId> = Vec::new();
    for &ob in &origin_blocks {
        let nb = m.new_block(caller, "");
        vmap.insert(ValueRef::Block(ob), ValueRef::Block(nb));
        new_blocks.push(nb);
    }
    for (&ob, &nb) in origin_blocks.iter().zip(&new_blocks) {
        for &oi in &m.block(ob).insts.clone() {
            let opcode = m.inst(oi).opcode;
            if opcode == Opcode::Ret && ret_is_void {
                ret_void_bbs.push(nb);
                continue;
            }
            let ty = m.inst(oi).ty;
            let operands = m.inst(oi).operands.to_vec();
            let ni = m.build_inst(nb, opcode, ty, operands);
            vmap.insert(ValueRef::Inst(oi), ValueRef::Inst(ni));
            if opcode == Opcode::Ret {
                ret_list.push(ni);
            }
        }
    }

    // Rewrite operands of every clone through the value map: arguments,
    // cloned instructions, and cloned blocks (φ predecessors included) all
    // remap the same way.
    for &nb in &new_blocks {
        for &ni in &m.block(nb).insts.clone() {
            for slot in 0..m.inst(ni).operands.len() {
                let op = m.inst(ni).operands[slot];
                if let Some(&mapped) = vmap.get(&op) {
                    m.set_operand(ni, slot, mapped);
                }
            }
        }
    }

    // The join block receives everything that followed the call.
    let join = m.new_block(caller, "");

    // Merge the return paths.
    let mut ret_val: Option<ValueRef> = None;
    if !ret_is_void {
        if ret_list.len() == 1 {
            let ret = ret_list[0];
            let v = m.inst(ret).operands[0];
            let ret_bb = m.inst(ret).parent;
            m.remove_inst(ret);
            m.build_br(ret_bb, join);
            ret_val = Some(v);
        } else {
            // Several returns: merge through a φ in a dedicated block.
            let phi_bb = m.new_block(caller, "");
            let mut phi_ops = Vec::with_capacity(ret_list.len() * 2);
            for ret in ret_list {
                let v = m.inst(ret).operands[0];
                let ret_bb = m.inst(ret).parent;
                m.remove_inst(ret);
                m.build_br(ret_bb, phi_bb);
                phi_ops.push(v);
                phi_ops.push(ValueRef::Block(ret_bb));
            }
            let ret_ty = m.func(callee).ret;
            let phi = m.build_inst(phi_bb, Opcode::Phi, ret_ty, phi_ops);
            m.build_br(phi_bb, join);
            ret_val = Some(ValueRef::Inst(phi));
        }
    } else {
        for rb in ret_void_bbs {
            m.build_br(rb, join);
        }
    }

    // Splice at the call: trailing instructions move to the join block, the
    // call's users read the merged return value, and the call block branches
    // into the first clone.
    let insts = m.block(call_bb).insts.clone();
    let pos = insts
        .iter()
        .position(|&i| i == call)
        .expect("call site in its own block");
    for &t in &insts[pos + 1..] {
        m.move_inst(t, join);
    }
    if let Some(v) = ret_val {
        m.replace_all_uses(ValueRef::Inst(call), v);
    }
    m.remove_inst(call);
    m.build_br(call_bb, new_blocks[0]);

    // Cloned terminators recorded edges against the callee's blocks; rebuild
    // both functions from their terminators.
    m.rebuild_cfg(caller);
    m.rebuild_cfg(callee);
}

#[cfg(test)]
mod tests {
    use super::*;
    use opalc_ir::{ArithOp, Builder, CmpPred};

    fn run(m: &mut Module) {
        FunctionInline::default().run(m);
        m.assert_consistency();
    }

    fn call_count(m: &Module, f: FuncId) -> usize {
        m.func(f)
            .blocks
            .iter()
            .flat_map(|&b| m.block(b).insts.iter())
            .filter(|&&i| m.inst(i).opcode == Opcode::Call)
            .count()
    }

    /// int add(int x, int y) { return x + y; }
    fn make_add(m: &mut Module) -> FuncId {
        let add = m.new_function("add", vec![TypeId::I32, TypeId::I32], TypeId::I32);
        let entry = m.new_block(add, "entry");
        let x = ValueRef::Arg(m.func(add).args[0]);
        let y = ValueRef::Arg(m.func(add).args[1]);
        let mut b = Builder::at(m, entry);
        let sum = b.create_int_binary(ArithOp::Add, x, y).unwrap();
        b.create_ret(sum).unwrap();
        add
    }

    #[test]
    fn inlines_single_return_callee() {
        let mut m = Module::new();
        let add = make_add(&mut m);
        let main = m.new_function("main", vec![], TypeId::I32);
        let entry = m.new_block(main, "entry");
        let mut b = Builder::at(&mut m, entry);
        let v = b.create_call(add, vec![ValueRef::int(2), ValueRef::int(3)]).unwrap();
        b.create_ret(v).unwrap();

        run(&mut m);
        assert_eq!(call_count(&m, main), 0);
        // entry + cloned entry + join
        assert_eq!(m.func(main).blocks.len(), 3);
        // The cloned add feeds main's ret directly.
        let join = m.func(main).blocks[2];
        let ret = m.terminator(join).unwrap();
        let ret_op = m.inst(ret).operands[0].as_inst().unwrap();
        assert_eq!(m.inst(ret_op).opcode, Opcode::IntBinary(ArithOp::Add));
        assert_eq!(m.inst(ret_op).operands[0], ValueRef::int(2));
        assert_eq!(m.inst(ret_op).operands[1], ValueRef::int(3));
    }

    #[test]
    fn multi_return_callee_merges_through_phi() {
        // int pick(int c) { if (c) return 1; return 2; } -- shaped by hand.
        let mut m = Module::new();
        let pick = m.new_function("pick", vec![TypeId::I32], TypeId::I32);
        let entry = m.new_block(pick, "entry");
        let then_bb = m.new_block(pick, "");
        let else_bb = m.new_block(pick, "");
        let c = ValueRef::Arg(m.func(pick).args[0]);
        let mut b = Builder::at(&mut m, entry);
        let flag = b.create_icmp(CmpPred::Ne, c, ValueRef::int(0)).unwrap();
        b.create_cond_br(flag, then_bb, else_bb).unwrap();
        b.set_insert_point(then_bb);
        b.create_ret(ValueRef::int(1)).unwrap();
        b.set_insert_point(else_bb);
        b.create_ret(ValueRef::int(2)).unwrap();

        let main = m.new_function("main", vec![], TypeId::I32);
        let entry = m.new_block(main, "entry");
        let mut b = Builder::at(&mut m, entry);
        let v = b.create_call(pick, vec![ValueRef::int(7)]).unwrap();
        b.create_ret(v).unwrap();

        run(&mut m);
        assert_eq!(call_count(&m, main), 0);
        // One φ merges the two returned values; main's ret reads it.
        let phis: Vec<InstId> = m
            .func(main)
            .blocks
            .iter()
            .flat_map(|&b| m.block(b).insts.iter().copied())
            .filter(|&i| m.inst(i).is_phi())
            .collect();
        assert_eq!(phis.len(), 1);
        let pairs = m.inst(phis[0]).phi_pairs();
        let vals: Vec<ValueRef> = pairs.iter().map(|&(v, _)| v).collect();
        assert!(vals.contains(&ValueRef::int(1)));
        assert!(vals.contains(&ValueRef::int(2)));
        let join_ret = m
            .func(main)
            .blocks
            .iter()
            .filter_map(|&b| m.terminator(b))
            .find(|&t| m.inst(t).opcode == Opcode::Ret)
            .unwrap();
        assert_eq!(m.inst(join_ret).operands[0], ValueRef::Inst(phis[0]));
    }

    #[test]
    fn void_callee_branches_to_join() {
        let mut m = Module::new();
        let g = m.new_global("g", TypeId::I32, opalc_ir::Constant::Zero(TypeId::I32));
        let bump = m.new_function("bump", vec![], TypeId::VOID);
        let entry = m.new_block(bump, "entry");
        let mut b = Builder::at(&mut m, entry);
        b.create_store(ValueRef::int(1), ValueRef::Global(g)).unwrap();
        b.create_ret_void().unwrap();

        let main = m.new_function("main", vec![], TypeId::I32);
        let entry = m.new_block(main, "entry");
        let mut b = Builder::at(&mut m, entry);
        b.create_call(bump, vec![]).unwrap();
        b.create_ret(ValueRef::int(0)).unwrap();

        run(&mut m);
        assert_eq!(call_count(&m, main), 0);
        // The store was spliced into main.
        let stores = m
            .func(main)
            .blocks
            .iter()
            .flat_map(|&b| m.block(b).insts.iter())
            .filter(|&&i| m.inst(i).opcode == Opcode::Store)
            .count();
        assert_eq!(stores, 1);
    }

    #[test]
    fn recursive_callees_are_skipped() {
        let mut m = Module::new();
        // int fact(int n) { return n * fact(n - 1); } -- recursion only.
        let fact = m.new_function("fact", vec![TypeId::I32], TypeId::I32);
        let entry = m.new_block(fact, "entry");
        let n = ValueRef::Arg(m.func(fact).args[0]);
        let mut b = Builder::at(&mut m, entry);
        let dec = b.create_int_binary(ArithOp::Sub, n, ValueRef::int(1)).unwrap();
        let rec = b.create_call(fact, vec![dec]).unwrap();
        let v = b.create_int_binary(ArithOp::Mul, n, rec).unwrap();
        b.create_ret(v).unwrap();

        let main = m.new_function("main", vec![], TypeId::I32);
        let entry = m.new_block(main, "entry");
        let mut b = Builder::at(&mut m, entry);
        let v = b.create_call(fact, vec![ValueRef::int(5)]).unwrap();
        b.create_ret(v).unwrap();

        run(&mut m);
        assert_eq!(call_count(&m, main), 1);
        assert_eq!(call_count(&m, fact), 1);
    }

    #[test]
    fn block_cap_is_respected() {
        let mut m = Module::new();
        // A 6-block callee: entry -> b1 -> ... -> b5, then ret.
        let big = m.new_function("big", vec![], TypeId::I32);
        let entry = m.new_block(big, "entry");
        let mut prev = entry;
        for _ in 0..5 {
            let next = m.new_block(big, "");
            m.build_br(prev, next);
            prev = next;
        }
        m.build_inst(prev, Opcode::Ret, TypeId::VOID, vec![ValueRef::int(1)]);

        let main = m.new_function("main", vec![], TypeId::I32);
        let entry = m.new_block(main, "entry");
        let mut b = Builder::at(&mut m, entry);
        let v = b.create_call(big, vec![]).unwrap();
        b.create_ret(v).unwrap();

        run(&mut m);
        assert_eq!(call_count(&m, main), 1);

        // Raising the cap makes the same site inlineable.
        let mut pass = FunctionInline {
            max_callee_blocks: 7,
        };
        pass.run(&mut m);
        m.assert_consistency();
        assert_eq!(call_count(&m, main), 0);
    }

    #[test]
    fn runtime_intrinsics_are_never_inlined() {
        let mut m = Module::new();
        let putint = m.new_function("putint", vec![TypeId::I32], TypeId::VOID);
        let main = m.new_function("main", vec![], TypeId::I32);
        let entry = m.new_block(main, "entry");
        let mut b = Builder::at(&mut m, entry);
        b.create_call(putint, vec![ValueRef::int(1)]).unwrap();
        b.create_ret(ValueRef::int(0)).unwrap();
        run(&mut m);
        assert_eq!(call_count(&m, main), 1);
    }

    #[test]
    fn nested_call_chains_inline_transitively() {
        // add is inlined into mid; then mid (now call-free) inlines into main.
        let mut m = Module::new();
        let add = make_add(&mut m);
        let mid = m.new_function("mid", vec![TypeId::I32], TypeId::I32);
        let entry = m.new_block(mid, "entry");
        let arg = ValueRef::Arg(m.func(mid).args[0]);
        let mut b = Builder::at(&mut m, entry);
        let v = b.create_call(add, vec![arg, ValueRef::int(10)]).unwrap();
        b.create_ret(v).unwrap();

        let main = m.new_function("main", vec![], TypeId::I32);
        let entry = m.new_block(main, "entry");
        let mut b = Builder::at(&mut m, entry);
        let v = b.create_call(mid, vec![ValueRef::int(1)]).unwrap();
        b.create_ret(v).unwrap();

        run(&mut m);
        assert_eq!(call_count(&m, mid), 0);
        assert_eq!(call_count(&m, main), 0);
    }

    #[test]
    fn trailing_instructions_move_to_the_join_block() {
        let mut m = Module::new();
        let add = make_add(&mut m);
        let main = m.new_function("main", vec![], TypeId::I32);
        let entry = m.new_block(main, "entry");
        let mut b = Builder::at(&mut m, entry);
        let v = b.create_call(add, vec![ValueRef::int(2), ValueRef::int(3)]).unwrap();
        let doubled = b.create_int_binary(ArithOp::Mul, v, ValueRef::int(2)).unwrap();
        b.create_ret(doubled).unwrap();

        run(&mut m);
        // The entry now ends in a br into the clone; mul and ret live in the
        // join block, with mul reading the forwarded return value.
        let entry_term = m.terminator(m.func(main).entry().unwrap()).unwrap();
        assert_eq!(m.inst(entry_term).opcode, Opcode::Br);
        let mul = m
            .func(main)
            .blocks
            .iter()
            .flat_map(|&b| m.block(b).insts.iter().copied())
            .find(|&i| m.inst(i).opcode == Opcode::IntBinary(ArithOp::Mul))
            .unwrap();
        let fed = m.inst(mul).operands[0].as_inst().unwrap();
        assert_eq!(m.inst(fed).opcode, Opcode::IntBinary(ArithOp::Add));
    }
}
