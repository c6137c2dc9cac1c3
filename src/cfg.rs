//! Control-flow graph edges: the reference analysis of the framework.
//!
//! For every function, [`CfgAnalysis`] computes a [`FunctionCfgEdges`]: per
//! block, the *direct* successors and predecessors implied by terminators,
//! and the *indirect* (transitive) ones reachable through other blocks. Its
//! interface is what later passes consume, so the representation leans
//! toward cheap queries: each block's edges are one contiguous sorted array
//! partitioned into a direct and an indirect run.

use crate::analysis::{AnalysisKind, AnalysisManager, AnalysisPass, DefaultAnalysis, FunctionAnalysis};
use crate::module::{BlockId, FuncId, Module};
use rustc_hash::{FxHashMap, FxHashSet};
use std::any::Any;

/// The edges of one block, in one direction (successors or predecessors).
///
/// Direct and indirect edges are each sorted, set-like runs; a block may
/// appear once in both runs, so [`all_edges`](Self::all_edges) can contain
/// it twice.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockEdges {
    // the array is effectively
    //
    //   [ direct, direct, direct, indirect, indirect ]
    //                             ^
    //                             direct_end
    //
    // with both runs kept sorted so membership is a binary search
    direct_end: usize,
    edges: Vec<BlockId>,
}

impl BlockEdges {
    /// Creates an empty edge set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty edge set with room for `expected` edges.
    pub fn with_capacity(expected: usize) -> Self {
        BlockEdges {
            direct_end: 0,
            edges: Vec::with_capacity(expected),
        }
    }

    /// Records a direct edge to `block`. Re-adding an existing edge is a
    /// no-op.
    pub fn add_direct_edge(&mut self, block: BlockId) {
        let direct = &self.edges[..self.direct_end];

        match direct.binary_search_by_key(&block.index(), |b| b.index()) {
            Ok(_) => {}
            Err(pos) => {
                self.edges.insert(pos, block);
                self.direct_end += 1;
            }
        }
    }

    /// Records an indirect edge to `block`. Re-adding an existing edge is a
    /// no-op.
    pub fn add_indirect_edge(&mut self, block: BlockId) {
        let indirect = &self.edges[self.direct_end..];

        match indirect.binary_search_by_key(&block.index(), |b| b.index()) {
            Ok(_) => {}
            Err(pos) => self.edges.insert(self.direct_end + pos, block),
        }
    }

    /// The direct edges, sorted.
    #[inline]
    pub fn direct_edges(&self) -> &[BlockId] {
        &self.edges[..self.direct_end]
    }

    /// The indirect edges, sorted.
    #[inline]
    pub fn indirect_edges(&self) -> &[BlockId] {
        &self.edges[self.direct_end..]
    }

    /// Every edge: the direct run followed by the indirect run.
    #[inline]
    pub fn all_edges(&self) -> &[BlockId] {
        &self.edges
    }

    /// Whether a direct edge to `block` exists.
    pub fn has_direct_edge(&self, block: BlockId) -> bool {
        self.direct_edges()
            .binary_search_by_key(&block.index(), |b| b.index())
            .is_ok()
    }

    /// Whether an indirect edge to `block` exists.
    pub fn has_indirect_edge(&self, block: BlockId) -> bool {
        self.indirect_edges()
            .binary_search_by_key(&block.index(), |b| b.index())
            .is_ok()
    }

    /// Whether any edge to `block` exists.
    pub fn has_edge(&self, block: BlockId) -> bool {
        self.has_direct_edge(block) || self.has_indirect_edge(block)
    }
}

/// The successor and predecessor edges of every block in one function.
#[derive(Clone, Debug, Default)]
pub struct FunctionCfgEdges {
    successors: FxHashMap<BlockId, BlockEdges>,
    predecessors: FxHashMap<BlockId, BlockEdges>,
}

impl FunctionCfgEdges {
    /// The successor edges of `block`.
    ///
    /// # Panics
    ///
    /// Panics if `block` is not from the analyzed function.
    pub fn successors(&self, block: BlockId) -> &BlockEdges {
        self.successors
            .get(&block)
            .expect("cannot get successors of a block from a different function")
    }

    /// The predecessor edges of `block`.
    ///
    /// # Panics
    ///
    /// Panics if `block` is not from the analyzed function.
    pub fn predecessors(&self, block: BlockId) -> &BlockEdges {
        self.predecessors
            .get(&block)
            .expect("cannot get predecessors of a block from a different function")
    }

    /// The sorted direct successors of `block`.
    pub fn direct_successors(&self, block: BlockId) -> &[BlockId] {
        self.successors(block).direct_edges()
    }

    /// The sorted indirect successors of `block`.
    pub fn indirect_successors(&self, block: BlockId) -> &[BlockId] {
        self.successors(block).indirect_edges()
    }

    /// Every successor of `block`, direct run first.
    pub fn all_successors(&self, block: BlockId) -> &[BlockId] {
        self.successors(block).all_edges()
    }

    /// The sorted direct predecessors of `block`.
    pub fn direct_predecessors(&self, block: BlockId) -> &[BlockId] {
        self.predecessors(block).direct_edges()
    }

    /// The sorted indirect predecessors of `block`.
    pub fn indirect_predecessors(&self, block: BlockId) -> &[BlockId] {
        self.predecessors(block).indirect_edges()
    }

    /// Every predecessor of `block`, direct run first.
    pub fn all_predecessors(&self, block: BlockId) -> &[BlockId] {
        self.predecessors(block).all_edges()
    }
}

/// Computes the CFG edges of one function.
///
/// Every non-empty block must end in a terminator.
pub fn cfg_edges(module: &Module, func: FuncId) -> FunctionCfgEdges {
    let blocks = module.func(func).blocks();

    let mut successors = FxHashMap::default();
    let mut predecessors = FxHashMap::default();

    // direct successors fall straight out of each terminator
    for &block in blocks {
        let terminator = module.terminator_of(block);
        let targets = module.inst(terminator).possible_branch_targets();

        let mut edges = BlockEdges::with_capacity(targets.len());
        for target in targets {
            edges.add_direct_edge(target);
        }

        successors.insert(block, edges);
    }

    // direct predecessors are the transpose of the direct successors
    for &block in blocks {
        let mut edges = BlockEdges::new();

        for &other in blocks {
            if successors[&other].has_direct_edge(block) {
                edges.add_direct_edge(other);
            }
        }

        predecessors.insert(block, edges);
    }

    if let Some(entry) = module.func(func).entry() {
        let mut stack = Vec::new();
        let mut seen = FxHashSet::default();
        indirect_successors(entry, &mut successors, &mut stack, &mut seen);
    }

    // with indirect successors in hand, indirect predecessors are another
    // transposition
    for &block in blocks {
        for &other in blocks {
            if successors[&other].has_indirect_edge(block) {
                predecessors
                    .get_mut(&block)
                    .expect("every block was seeded above")
                    .add_indirect_edge(other);
            }
        }
    }

    FunctionCfgEdges {
        successors,
        predecessors,
    }
}

// walks the graph depth-first from the entry; when visiting a node, each of
// its successors becomes an indirect successor of everything deeper on the
// walk. the seen set keeps cycles from recursing forever
fn indirect_successors(
    block: BlockId,
    successors: &mut FxHashMap<BlockId, BlockEdges>,
    stack: &mut Vec<BlockId>,
    seen: &mut FxHashSet<BlockId>,
) {
    if !seen.insert(block) {
        return;
    }

    let direct: Vec<BlockId> = successors[&block].direct_edges().to_vec();

    for successor in direct {
        for &above in stack.iter() {
            successors
                .get_mut(&above)
                .expect("the walk only visits seeded blocks")
                .add_indirect_edge(successor);
        }

        stack.push(block);
        indirect_successors(successor, successors, stack, seen);
        stack.pop();
    }
}

/// The cached CFG-edges analysis, one [`FunctionCfgEdges`] per function.
#[derive(Debug, Default)]
pub struct CfgAnalysis {
    edges: FxHashMap<FuncId, FunctionCfgEdges>,
}

impl CfgAnalysis {
    /// The edges of `func`.
    ///
    /// # Panics
    ///
    /// Panics if the analysis has not been run over `func`'s module.
    pub fn edges(&self, func: FuncId) -> &FunctionCfgEdges {
        self.edges
            .get(&func)
            .expect("cannot get CFG edges of a function from a different module")
    }
}

impl FunctionAnalysis for CfgAnalysis {
    fn run_on_function(
        &mut self,
        module: &Module,
        func: FuncId,
        _manager: &mut AnalysisManager<'_>,
    ) {
        self.edges.insert(func, cfg_edges(module, func));
    }
}

impl AnalysisPass for CfgAnalysis {
    fn run(&mut self, module: &Module, manager: &mut AnalysisManager<'_>) {
        self.edges.clear();
        self.run_on_module(module, manager);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl DefaultAnalysis for CfgAnalysis {
    const KIND: AnalysisKind = AnalysisKind::CfgEdges;
}
