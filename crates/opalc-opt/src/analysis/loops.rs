//! Natural loop detection.
//!
//! Per function: the CFG goes into a petgraph `DiGraph`, dominators come
//! from `petgraph::algo::dominators`, and every edge `latch -> header` where
//! the header dominates the latch is a back edge. The natural loop body is
//! the header plus everything that reaches a latch without passing through
//! the header. Loops sharing a header merge; nesting is recovered by body
//! containment, producing a forest with per-loop header, blocks, latches,
//! sub-loops, parent, and a preheader slot for LICM to fill.

use std::collections::HashMap;

use indexmap::IndexSet;
use petgraph::algo::dominators;
use petgraph::graph::{DiGraph, NodeIndex};

use opalc_ir::{BlockId, Module};

/// Index of a loop within its [`LoopForest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopId(pub usize);

/// One natural loop.
#[derive(Debug)]
pub struct Loop {
    pub header: BlockId,
    /// All blocks of the loop, including those of nested loops.
    pub blocks: IndexSet<BlockId>,
    /// Predecessors of the header along back edges.
    pub latches: IndexSet<BlockId>,
    pub sub_loops: Vec<LoopId>,
    pub parent: Option<LoopId>,
    /// Filled in by LICM when it synthesizes one.
    pub preheader: Option<BlockId>,
}

/// The loop forest of a whole module.
#[derive(Debug, Default)]
pub struct LoopForest {
    pub loops: Vec<Loop>,
    /// Outermost loops, across all functions.
    pub top_level: Vec<LoopId>,
}

impl LoopForest {
    pub fn analyze(m: &Module) -> LoopForest {
        let mut forest = LoopForest::default();
        for &f in m.functions() {
            if m.func(f).is_declaration() {
                continue;
            }
            detect_in_function(m, f, &mut forest);
        }
        forest
    }

    pub fn get(&self, id: LoopId) -> &Loop {
        &self.loops[id.0]
    }

    pub fn get_mut(&mut self, id: LoopId) -> &mut Loop {
        &mut self.loops[id.0]
    }
}

fn detect_in_function(m: &Module, f: opalc_ir::FuncId, forest: &mut LoopForest) {
    let func = m.func(f);
    let mut graph: DiGraph<BlockId, ()> = DiGraph::new();
    let mut nodes: HashMap<BlockId, NodeIndex> = HashMap::new();
    for &b in &func.blocks {
        nodes.insert(b, graph.add_node(b));
    }
    for &b in &func.blocks {
        for &s in &m.block(b).succs {
            graph.add_edge(nodes[&b], nodes[&s], ());
        }
    }
    let Some(entry) = func.entry() else {
        return;
    };
    let doms = dominators::simple_fast(&graph, nodes[&entry]);

    // Back edges, grouped by header.
    let mut latches_of: HashMap<BlockId, IndexSet<BlockId>> = HashMap::new();
    for &b in &func.blocks {
        for &h in &m.block(b).succs {
            let dominated = doms
                .dominators(nodes[&b])
                .is_some_and(|mut chain| chain.any(|d| d == nodes[&h]));
            if dominated {
                latches_of.entry(h).or_default().insert(b);
            }
        }
    }

    // Natural loop bodies: reverse reachability from the latches, stopping
    // at the header.
    let first = forest.loops.len();
    for &b in &func.blocks {
        let Some(latches) = latches_of.get(&b) else {
            continue;
        };
        let header = b;
        let mut blocks: IndexSet<BlockId> = IndexSet::new();
        blocks.insert(header);
        let mut work: Vec<BlockId> = latches.iter().copied().collect();
        while let Some(x) = work.pop() {
            if blocks.insert(x) {
                work.extend(m.block(x).preds.iter().copied());
            }
        }
        forest.loops.push(Loop {
            header,
            blocks,
            latches: latches.clone(),
            sub_loops: Vec::new(),
            parent: None,
            preheader: None,
        });
    }

    // Nesting: the parent of a loop is the smallest other loop containing
    // its header.
    let created: Vec<usize> = (first..forest.loops.len()).collect();
    for &i in &created {
        let mut parent: Option<usize> = None;
        for &j in &created {
            if i == j {
                continue;
            }
            let contains = forest.loops[j].blocks.contains(&forest.loops[i].header)
                && forest.loops[j].header != forest.loops[i].header;
            if contains {
                let better = match parent {
                    None => true,
                    Some(p) => forest.loops[j].blocks.len() < forest.loops[p].blocks.len(),
                };
                if better {
                    parent = Some(j);
                }
            }
        }
        if let Some(p) = parent {
            forest.loops[i].parent = Some(LoopId(p));
            forest.loops[p].sub_loops.push(LoopId(i));
        } else {
            forest.top_level.push(LoopId(i));
        }
    }
}
