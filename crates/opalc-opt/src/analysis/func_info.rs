//! Function purity analysis.
//!
//! A function is pure when it performs no stores to memory reachable outside
//! itself and transitively calls only pure functions. External declarations
//! (the runtime library) are impure. Impurity propagates callee-to-caller
//! over the call graph until a fixed point.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use opalc_ir::{FuncId, Module, Opcode, ValueRef};

/// Per-function purity, computed once over a module snapshot.
pub struct FuncInfo {
    pure: HashMap<FuncId, bool>,
}

impl FuncInfo {
    pub fn analyze(m: &Module) -> FuncInfo {
        // Call graph: one node per function, an edge per call site.
        let mut graph: DiGraph<FuncId, ()> = DiGraph::new();
        let mut nodes: HashMap<FuncId, NodeIndex> = HashMap::new();
        for &f in m.functions() {
            nodes.insert(f, graph.add_node(f));
        }
        for &f in m.functions() {
            for &b in &m.func(f).blocks {
                for &i in &m.block(b).insts {
                    if let Some(callee) = m.inst(i).callee() {
                        graph.add_edge(nodes[&f], nodes[&callee], ());
                    }
                }
            }
        }

        // Locally impure: declarations and functions with escaping stores.
        let mut impure: HashSet<FuncId> = HashSet::new();
        let mut work: Vec<FuncId> = Vec::new();
        for &f in m.functions() {
            if m.func(f).is_declaration() || has_escaping_store(m, f) {
                impure.insert(f);
                work.push(f);
            }
        }

        // Propagate to callers until the set stops growing.
        while let Some(f) = work.pop() {
            for caller in graph.neighbors_directed(nodes[&f], Direction::Incoming) {
                let caller = graph[caller];
                if impure.insert(caller) {
                    work.push(caller);
                }
            }
        }

        let pure = m
            .functions()
            .iter()
            .map(|&f| (f, !impure.contains(&f)))
            .collect();
        FuncInfo { pure }
    }

    /// `true` when the function was pure at analysis time. Unknown functions
    /// (created after the analysis) count as impure.
    pub fn is_pure(&self, f: FuncId) -> bool {
        self.pure.get(&f).copied().unwrap_or(false)
    }
}

/// Does the function store anywhere that is not provably one of its own
/// stack slots? Pointer chains are traced through `getelementptr`; anything
/// else (globals, loaded pointers such as array parameters) escapes.
fn has_escaping_store(m: &Module, f: FuncId) -> bool {
    for &b in &m.func(f).blocks {
        for &i in &m.block(b).insts {
            if m.inst(i).opcode != Opcode::Store {
                continue;
            }
            if !resolves_to_local_alloca(m, m.inst(i).operands[1]) {
                return true;
            }
        }
    }
    false
}

fn resolves_to_local_alloca(m: &Module, mut ptr: ValueRef) -> bool {
    loop {
        let Some(i) = ptr.as_inst() else {
            return false;
        };
        match m.inst(i).opcode {
            Opcode::Alloca => return true,
            Opcode::GetElementPtr => ptr = m.inst(i).operands[0],
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opalc_ir::TypeId;

    #[test]
    fn declarations_are_impure() {
        let mut m = Module::new();
        let getint = m.new_function("getint", vec![], TypeId::I32);
        let info = FuncInfo::analyze(&m);
        assert!(!info.is_pure(getint));
    }

    #[test]
    fn local_stores_stay_pure() {
        let mut m = Module::new();
        let f = m.new_function("f", vec![TypeId::I32], TypeId::I32);
        let entry = m.new_block(f, "entry");
        let mut b = opalc_ir::Builder::at(&mut m, entry);
        let slot = b.create_alloca(TypeId::I32).unwrap();
        let arg = ValueRef::Arg(b.module().func(f).args[0]);
        b.create_store(arg, slot).unwrap();
        let v = b.create_load(slot).unwrap();
        b.create_ret(v).unwrap();

        let info = FuncInfo::analyze(&m);
        assert!(info.is_pure(f));
    }

    #[test]
    fn global_stores_are_impure() {
        let mut m = Module::new();
        let g = m.new_global("g", TypeId::I32, opalc_ir::Constant::Zero(TypeId::I32));
        let f = m.new_function("f", vec![], TypeId::VOID);
        let entry = m.new_block(f, "entry");
        let mut b = opalc_ir::Builder::at(&mut m, entry);
        b.create_store(ValueRef::int(1), ValueRef::Global(g)).unwrap();
        b.create_ret_void().unwrap();

        let info = FuncInfo::analyze(&m);
        assert!(!info.is_pure(f));
    }

    #[test]
    fn stores_through_pointer_parameters_are_impure() {
        let mut m = Module::new();
        let i32p = m.types.ptr_to(TypeId::I32);
        let f = m.new_function("f", vec![i32p], TypeId::VOID);
        let entry = m.new_block(f, "entry");
        let mut b = opalc_ir::Builder::at(&mut m, entry);
        // Parameter spill, then a store through the loaded pointer.
        let slot = b.create_alloca(i32p).unwrap();
        let arg = ValueRef::Arg(b.module().func(f).args[0]);
        b.create_store(arg, slot).unwrap();
        let base = b.create_load(slot).unwrap();
        let elem = b.create_gep(base, vec![ValueRef::int(0)]).unwrap();
        b.create_store(ValueRef::int(9), elem).unwrap();
        b.create_ret_void().unwrap();

        let info = FuncInfo::analyze(&m);
        assert!(!info.is_pure(f));
    }

    #[test]
    fn impurity_propagates_through_calls() {
        let mut m = Module::new();
        let putint = m.new_function("putint", vec![TypeId::I32], TypeId::VOID);
        let mid = m.new_function("mid", vec![], TypeId::VOID);
        let top = m.new_function("top", vec![], TypeId::VOID);

        let entry = m.new_block(mid, "entry");
        let mut b = opalc_ir::Builder::at(&mut m, entry);
        b.create_call(putint, vec![ValueRef::int(1)]).unwrap();
        b.create_ret_void().unwrap();

        let entry = m.new_block(top, "entry");
        let mut b = opalc_ir::Builder::at(&mut m, entry);
        b.create_call(mid, vec![]).unwrap();
        b.create_ret_void().unwrap();

        let info = FuncInfo::analyze(&m);
        assert!(!info.is_pure(putint));
        assert!(!info.is_pure(mid));
        assert!(!info.is_pure(top));
    }

    #[test]
    fn pure_helpers_stay_pure_when_called() {
        let mut m = Module::new();
        let sq = m.new_function("sq", vec![TypeId::I32], TypeId::I32);
        let entry = m.new_block(sq, "entry");
        let mut b = opalc_ir::Builder::at(&mut m, entry);
        let arg = ValueRef::Arg(b.module().func(sq).args[0]);
        let v = b.create_int_binary(opalc_ir::ArithOp::Mul, arg, arg).unwrap();
        b.create_ret(v).unwrap();

        let caller = m.new_function("caller", vec![], TypeId::I32);
        let entry = m.new_block(caller, "entry");
        let mut b = opalc_ir::Builder::at(&mut m, entry);
        let v = b.create_call(sq, vec![ValueRef::int(3)]).unwrap();
        b.create_ret(v).unwrap();

        let info = FuncInfo::analyze(&m);
        assert!(info.is_pure(sq));
        assert!(info.is_pure(caller));
    }
}
