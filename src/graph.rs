use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::MutexGuard;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Result, SccError};
use crate::forest::DynamicForest;
use crate::graph::arc::Arc;
use crate::graph::node::{GraphNode, NodeState, Visited};

pub mod arc;
pub mod graph_query;
pub mod loader;
pub mod node;

/// The graph searched by the SCC engine.
///
/// Vertices live in an arena indexed by dense `usize` indices. Original ids
/// are only used at the boundary (ingestion, results). Besides the mutable
/// vertex records the graph keeps the original topology in CSR form, which
/// never changes and can be queried through
/// [`GraphQuery`](crate::graph::graph_query::GraphQuery).
///
/// Contraction never removes a record. It redirects the absorbed index to the
/// surviving one in `redirect`, so every later lookup of an arc target lands
/// on the survivor. A graph is consumed by one search: afterwards all reached
/// vertices are POST.
#[derive(Debug)]
pub struct Graph {
    /// Dense index -> original id.
    ids: Vec<u64>,
    /// Original id -> dense index.
    index: FxHashMap<u64, usize>,
    nodes: Vec<GraphNode>,
    /// Dense index -> index of the record that currently represents it.
    redirect: Vec<AtomicUsize>,
    /// Designated initial vertices, in insertion order.
    init: Vec<usize>,
    /// CSR offsets of the original topology.
    offsets: Vec<usize>,
    /// CSR neighbor list of the original topology.
    neighbor_list: Vec<usize>,
}

/// The locks taken by [`Graph::try_lock_trees`].
///
/// `root_index` is the root of w's tree at the time the locks were taken. The
/// root's lock is only held when it differs from both w and the caller's own
/// vertex. Dropping the value releases everything.
pub struct TreeLocks<'a> {
    pub w: MutexGuard<'a, NodeState>,
    pub root_index: usize,
    _root: Option<MutexGuard<'a, NodeState>>,
}

impl Graph {
    pub fn vertex_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct arcs of the original topology.
    pub fn arc_count(&self) -> usize {
        self.neighbor_list.len()
    }

    pub fn id_of(&self, idx: usize) -> u64 {
        self.ids[idx]
    }

    pub fn index_of(&self, id: u64) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    pub fn node(&self, idx: usize) -> &GraphNode {
        &self.nodes[idx]
    }

    pub fn init_vertices(&self) -> &[usize] {
        &self.init
    }

    /// Original successors of `idx` as dense indices.
    pub fn neighbors(&self, idx: usize) -> &[usize] {
        &self.neighbor_list[self.offsets[idx]..self.offsets[idx + 1]]
    }

    /// Returns the record that currently represents `idx`, compressing the
    /// redirect chain on the way.
    pub fn resolve(&self, idx: usize) -> usize {
        let mut live = idx;
        loop {
            let next = self.redirect[live].load(Ordering::Acquire);
            if next == live {
                break;
            }
            live = next;
        }

        // `live` may be absorbed meanwhile, and later compressions may have
        // moved slots past it. A slot always points at a vertex absorbed after
        // it (or still live), so writing `live` into a dead slot keeps every
        // chain acyclic. A live slot is never written.
        let mut current = idx;
        while current != live {
            let next = self.redirect[current].load(Ordering::Acquire);
            if next == current || next == live {
                break;
            }
            let _ = self.redirect[current].compare_exchange(next, live, Ordering::AcqRel, Ordering::Relaxed);
            current = next;
        }
        live
    }

    /// Returns `true` if `idx` still represents itself.
    pub fn is_live(&self, idx: usize) -> bool {
        self.redirect[idx].load(Ordering::Acquire) == idx
    }

    /// Returns `true` if `idx` became POST through finalization rather than by
    /// being absorbed into another vertex.
    pub fn is_finalized(&self, idx: usize) -> bool {
        self.nodes[idx].is(Visited::Post) && self.is_live(idx)
    }

    /// Non-blocking acquisition of the lock of `idx`.
    pub fn try_lock(&self, idx: usize) -> Option<MutexGuard<'_, NodeState>> {
        self.nodes[idx].try_lock()
    }

    /// Locks `w` and the root of its tree so that a link or contraction
    /// between `v` and `w` can proceed.
    ///
    /// `v` must be a root already locked by the caller. Its lock is never taken
    /// here. When w's root is neither w nor v it is locked too and checked to
    /// still be a live root of w's tree afterwards.
    ///
    /// # Returns
    /// * `None` on any contention or stale observation. Nothing stays locked
    ///   and the caller is expected to retry the whole step later.
    pub fn try_lock_trees<'a>(&'a self, forest: &dyn DynamicForest, w: usize, v: usize) -> Option<TreeLocks<'a>> {
        debug_assert_ne!(w, v);
        let w_guard = self.try_lock(w)?;

        let root = forest.root(w);
        if root == w || root == v {
            return Some(TreeLocks { w: w_guard, root_index: root, _root: None });
        }

        let root_guard = self.try_lock(root)?;
        if self.nodes[root].is(Visited::Post) || !forest.is_root(root) || forest.root(w) != root {
            return None;
        }
        Some(TreeLocks { w: w_guard, root_index: root, _root: Some(root_guard) })
    }

    /// Merges the record of `src` into `dst`.
    ///
    /// Arcs, absorbed members and the self-loop flag of `src` move to `dst`,
    /// every lookup of `src` is redirected to `dst` from now on, and `src` is
    /// marked POST. Both locks must be held by the caller, which makes this
    /// also the barrier that no other worker is still inside `src`.
    /// Contracting a vertex into itself does nothing.
    ///
    /// # Errors
    /// * `SccError::UnknownVertex` if `dst` is no longer a live record
    /// * `SccError::IllegalTransition` if `src` was already POST
    pub fn contract(
        &self,
        dst: usize,
        dst_state: &mut NodeState,
        src: usize,
        src_state: &mut NodeState,
    ) -> Result<()> {
        if dst == src {
            return Ok(());
        }
        if !self.is_live(dst) {
            return Err(SccError::UnknownVertex(self.ids[dst]));
        }
        if self.nodes[src].is(Visited::Post) {
            return Err(SccError::IllegalTransition {
                vertex: self.ids[src],
                from: Visited::Post,
                to: Visited::Post,
            });
        }
        dst_state.absorb(self.ids[src], src_state);
        // Redirect before POST: a reader seeing POST also sees the redirect.
        self.redirect[src].store(dst, Ordering::Release);
        self.nodes[src].advance(Visited::Post)?;
        Ok(())
    }

    /// Verifies the state of the graph after a complete search.
    ///
    /// Every live vertex must be POST, without untraversed arcs, without
    /// forest children, a forest root, and unlocked. Every arc of the input
    /// must have been traversed exactly once, and every original id must
    /// resolve to a live vertex. Only meaningful for searches seeded from
    /// every vertex.
    pub fn check_post_condition(&self, forest: &dyn DynamicForest) -> Result<()> {
        let mut traversed = 0;
        for idx in 0..self.vertex_count() {
            let live = self.resolve(idx);
            if !self.is_live(live) {
                return Err(SccError::PostCondition(format!("vertex {} resolves to a dead record", self.ids[idx])));
            }
            if live != idx {
                continue;
            }

            let id = self.ids[idx];
            if !self.nodes[idx].is(Visited::Post) {
                return Err(SccError::PostCondition(format!("vertex {} is {:?}", id, self.nodes[idx].visited())));
            }
            if !forest.is_root(idx) {
                return Err(SccError::PostCondition(format!("vertex {} still has a forest parent", id)));
            }
            if !forest.children(idx).is_empty() {
                return Err(SccError::PostCondition(format!("vertex {} still has forest children", id)));
            }
            let state = self.try_lock(idx)
                .ok_or_else(|| SccError::PostCondition(format!("vertex {} is still locked", id)))?;
            if state.has_untraversed_arc() {
                return Err(SccError::PostCondition(format!(
                    "vertex {} has {} untraversed arcs", id, state.untraversed_count()
                )));
            }
            traversed += state.traversed_count();
        }

        if traversed != self.arc_count() {
            return Err(SccError::PostCondition(format!(
                "{} arcs traversed, {} in the graph", traversed, self.arc_count()
            )));
        }
        Ok(())
    }
}

/// Incrementally assembles a [`Graph`].
///
/// Vertices get dense indices in order of first appearance. Arcs auto-create
/// both endpoints, duplicate arcs collapse when the graph is built.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    ids: Vec<u64>,
    index: FxHashMap<u64, usize>,
    arcs: Vec<(usize, usize)>,
    init: Vec<usize>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        GraphBuilder::default()
    }

    /// Creates a builder holding the given arcs.
    pub fn from_arcs<I: IntoIterator<Item = (u64, u64)>>(arcs: I) -> Self {
        let mut builder = GraphBuilder::new();
        for (from, to) in arcs {
            builder.add_arc(from, to);
        }
        builder
    }

    /// Adds a vertex if it is not present yet and returns its dense index.
    pub fn add_node(&mut self, id: u64) -> usize {
        if let Some(&idx) = self.index.get(&id) {
            return idx;
        }
        let idx = self.ids.len();
        self.ids.push(id);
        self.index.insert(id, idx);
        idx
    }

    pub fn add_arc(&mut self, from: u64, to: u64) {
        let from = self.add_node(from);
        let to = self.add_node(to);
        self.arcs.push((from, to));
    }

    /// Designates `id` as an initial vertex of the search.
    ///
    /// # Errors
    /// * `SccError::UnknownVertex` if `id` has not been added
    pub fn add_init(&mut self, id: u64) -> Result<()> {
        let idx = *self.index.get(&id).ok_or(SccError::UnknownVertex(id))?;
        if !self.init.contains(&idx) {
            self.init.push(idx);
        }
        Ok(())
    }

    pub fn vertex_count(&self) -> usize {
        self.ids.len()
    }

    pub fn build(self) -> Graph {
        let n = self.ids.len();

        // Step 1. Drop duplicate arcs, keeping input order.
        let mut seen = FxHashSet::default();
        let arcs: Vec<(usize, usize)> = self.arcs.into_iter().filter(|arc| seen.insert(*arc)).collect();

        // Step 2. Count out-degrees and lay out the CSR offsets.
        let mut offsets = vec![0usize; n + 1];
        for &(from, _) in &arcs {
            offsets[from + 1] += 1;
        }
        for v in 0..n {
            offsets[v + 1] += offsets[v];
        }

        // Step 3. Scatter the targets.
        let mut cursor = offsets.clone();
        let mut neighbor_list = vec![0usize; arcs.len()];
        for &(from, to) in &arcs {
            neighbor_list[cursor[from]] = to;
            cursor[from] += 1;
        }

        // Step 4. Build the mutable vertex records.
        let nodes = (0..n)
            .map(|v| {
                let out = neighbor_list[offsets[v]..offsets[v + 1]]
                    .iter()
                    .map(|&to| Arc::new(v, to))
                    .collect();
                GraphNode::new(self.ids[v], out)
            })
            .collect();

        Graph {
            ids: self.ids,
            index: self.index,
            nodes,
            redirect: (0..n).map(AtomicUsize::new).collect(),
            init: self.init,
            offsets,
            neighbor_list,
        }
    }
}

#[cfg(test)]
mod test_graph {
    use crate::config::ForestKind;
    use crate::error::SccError;
    use crate::forest::build_forest;
    use crate::graph::node::Visited;
    use crate::graph::GraphBuilder;

    #[test]
    fn test_builder_dedup_and_autocreate() {
        let mut builder = GraphBuilder::from_arcs([(10, 20), (10, 20), (20, 30), (30, 30)]);
        builder.add_node(40);
        builder.add_init(10).unwrap();
        assert!(matches!(builder.add_init(99), Err(SccError::UnknownVertex(99))));

        let graph = builder.build();
        assert_eq!(graph.vertex_count(), 4);
        assert_eq!(graph.arc_count(), 3);
        assert_eq!(graph.index_of(30), Some(2));
        assert_eq!(graph.neighbors(2), &[2]);
        assert!(graph.neighbors(3).is_empty());
        assert_eq!(graph.init_vertices(), &[0]);
    }

    #[test]
    fn test_contract_redirects_and_moves_arcs() {
        let graph = GraphBuilder::from_arcs([(1, 2), (2, 1), (2, 3), (3, 1)]).build();
        let (a, b, c) = (0, 1, 2);
        for idx in [a, b, c] {
            graph.node(idx).advance(Visited::Pre).unwrap();
        }

        {
            let mut dst = graph.try_lock(a).unwrap();
            let mut src = graph.try_lock(b).unwrap();
            graph.contract(a, &mut dst, b, &mut src).unwrap();
            assert_eq!(dst.untraversed_count(), 3);
            assert_eq!(dst.absorbed(), &[2]);
            assert!(!src.has_untraversed_arc());
        }
        assert_eq!(graph.resolve(b), a);
        assert!(graph.node(b).is(Visited::Post));
        assert!(!graph.is_finalized(b));

        {
            let mut dst = graph.try_lock(a).unwrap();
            let mut src = graph.try_lock(c).unwrap();
            graph.contract(a, &mut dst, c, &mut src).unwrap();
            assert_eq!(dst.absorbed(), &[2, 3]);

            // Contracting into an absorbed record is refused.
            let mut dead = graph.try_lock(b).unwrap();
            assert!(matches!(
                graph.contract(b, &mut dead, a, &mut dst),
                Err(SccError::UnknownVertex(2))
            ));
        }
        assert_eq!(graph.resolve(c), a);
    }

    #[test]
    fn test_resolve_compresses_chain() {
        let graph = GraphBuilder::from_arcs([(0, 1), (1, 2), (2, 3)]).build();
        for (dst, src) in [(1, 0), (2, 1), (3, 2)] {
            let mut d = graph.try_lock(dst).unwrap();
            let mut s = graph.try_lock(src).unwrap();
            graph.contract(dst, &mut d, src, &mut s).unwrap();
        }
        assert_eq!(graph.resolve(0), 3);
        assert!(graph.redirect[0].load(std::sync::atomic::Ordering::Acquire) == 3);
    }

    /// Readers compress chains while a writer keeps absorbing the head of the
    /// chain into the next vertex. No live slot may be overwritten.
    #[test]
    fn test_resolve_during_contractions() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let n = 1_500u64;
        for _ in 0..4 {
            let graph = GraphBuilder::from_arcs((0..n - 1).map(|v| (v, v + 1))).build();
            let done = AtomicBool::new(false);

            std::thread::scope(|scope| {
                for reader in 0..3 {
                    let (graph, done) = (&graph, &done);
                    scope.spawn(move || {
                        let mut x = reader;
                        while !done.load(Ordering::Acquire) {
                            graph.resolve(0);
                            graph.resolve(x % n as usize);
                            x += 7;
                        }
                    });
                }
                for i in 0..(n - 1) as usize {
                    let mut dst = graph.try_lock(i + 1).unwrap();
                    let mut src = graph.try_lock(i).unwrap();
                    graph.contract(i + 1, &mut dst, i, &mut src).unwrap();
                }
                done.store(true, Ordering::Release);
            });

            let last = (n - 1) as usize;
            assert!(graph.is_live(last));
            for start in 0..n as usize {
                let mut current = start;
                for _ in 0..=n {
                    let next = graph.redirect[current].load(Ordering::Acquire);
                    if next == current {
                        break;
                    }
                    current = next;
                }
                assert_eq!(current, last, "redirect chain of {} does not end at the live vertex", start);
                assert_eq!(graph.resolve(start), last);
            }
        }
    }

    #[test]
    fn test_try_lock_trees() {
        let graph = GraphBuilder::from_arcs([(0, 1), (1, 2), (3, 0)]).build();
        let forest = build_forest(ForestKind::Naive, graph.vertex_count());
        forest.link(0, 1).unwrap();
        forest.link(1, 2).unwrap();

        // w = 0 lives in the tree of 2, which gets locked as well.
        {
            let locks = graph.try_lock_trees(forest.as_ref(), 0, 3).unwrap();
            assert_eq!(locks.root_index, 2);
            assert!(graph.try_lock(2).is_none());
        }
        assert!(graph.try_lock(2).is_some());

        // Contention on the root releases w again.
        let held = graph.try_lock(2).unwrap();
        assert!(graph.try_lock_trees(forest.as_ref(), 0, 3).is_none());
        assert!(graph.try_lock(0).is_some());
        drop(held);

        // Same tree as the caller: the root is not locked again.
        let locks = graph.try_lock_trees(forest.as_ref(), 0, 2).unwrap();
        assert_eq!(locks.root_index, 2);
    }

    #[test]
    fn test_post_condition_fails_on_fresh_graph() {
        let graph = GraphBuilder::from_arcs([(0, 1)]).build();
        let forest = build_forest(ForestKind::LinkCut, graph.vertex_count());
        assert!(matches!(
            graph.check_post_condition(forest.as_ref()),
            Err(SccError::PostCondition(_))
        ));
    }
}
