use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use log::{debug, error, trace};

use crate::algorithms::liveness::LivenessCheck;
use crate::error::{Result, SccError};
use crate::forest::DynamicForest;
use crate::graph::node::{NodeState, Visited};
use crate::graph::{Graph, TreeLocks};

/// A finalized component as recorded by the worker that finalized it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Sorted original ids, the representative included.
    pub members: Vec<u64>,
    /// Some arc of the component leads back into it.
    pub self_loop: bool,
}

/// State shared by every worker of one search.
pub struct SearchContext<'a> {
    graph: &'a Graph,
    forest: &'a dyn DynamicForest,
    liveness: &'a dyn LivenessCheck,
    aborted: AtomicBool,
    first_error: Mutex<Option<SccError>>,
    /// Representative index -> component.
    sccs: DashMap<usize, Component>,
}

impl<'a> SearchContext<'a> {
    pub fn new(graph: &'a Graph, forest: &'a dyn DynamicForest, liveness: &'a dyn LivenessCheck) -> Self {
        SearchContext {
            graph,
            forest,
            liveness,
            aborted: AtomicBool::new(false),
            first_error: Mutex::new(None),
            sccs: DashMap::new(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Cancels the search. Only the first error is kept.
    pub fn fail(&self, err: SccError) {
        error!("Aborting SCC search: {}", err);
        self.aborted.store(true, Ordering::Release);
        let mut slot = self.first_error.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    pub fn take_error(&self) -> Option<SccError> {
        self.first_error.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub fn into_components(self) -> DashMap<usize, Component> {
        self.sccs
    }
}

/// What the scheduler has to do after one step.
#[derive(Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The work item is finished.
    Done,
    /// Run the same vertex again later, after contention or with arcs left.
    Retry(usize),
    /// The vertex became a child of a root, continue with that root.
    HandOff(usize),
    /// The vertex was finalized. Its former children are new roots.
    Finalized(Vec<usize>),
}

/// One unit of concurrent work: advances the root `v` by a single step.
///
/// A step traverses at most one arc. Locks are only ever taken with
/// `try_lock` and are all released before the step returns, so a contended
/// step is abandoned and resubmitted instead of waiting.
pub struct SccWorker<'c, 'a> {
    ctx: &'c SearchContext<'a>,
    v: usize,
}

impl<'c, 'a> SccWorker<'c, 'a> {
    pub fn new(ctx: &'c SearchContext<'a>, v: usize) -> Self {
        SccWorker { ctx, v }
    }

    pub fn step(&self) -> Result<StepOutcome> {
        let graph = self.ctx.graph;
        let forest = self.ctx.forest;
        let v = self.v;
        let node = graph.node(v);

        if self.ctx.is_aborted() {
            return Ok(StepOutcome::Done);
        }

        // Step 1. POST never goes back, the item is stale.
        if node.is(Visited::Post) {
            trace!("{}: skipping post-visited vertex", node.id());
            return Ok(StepOutcome::Done);
        }

        // Step 2.
        let Some(mut v_state) = graph.try_lock(v) else {
            trace!("{}: vertex lock contended", node.id());
            return Ok(StepOutcome::Retry(v));
        };

        // Step 3. Finalized or contracted between the first check and the
        // lock, or the search was aborted meanwhile.
        if self.ctx.is_aborted() {
            return Ok(StepOutcome::Done);
        }
        if node.is(Visited::Post) {
            debug_assert!(forest.children(v).is_empty());
            debug_assert!(!v_state.has_untraversed_arc());
            return Ok(StepOutcome::Done);
        }

        // Step 4. Children are rescheduled by whoever detaches them.
        if !forest.is_root(v) {
            trace!("{}: skipping non-root vertex", node.id());
            return Ok(StepOutcome::Done);
        }
        node.advance(Visited::Pre)?;

        // Step 5.
        let Some(arc) = v_state.untraversed_arc() else {
            return self.finalize(v_state);
        };
        let w = graph.resolve(arc.to);

        // Step 6. Self-loop, possibly created by an earlier contraction.
        if w == v {
            v_state.traverse_next();
            v_state.mark_self_loop();
            return Ok(StepOutcome::Retry(v));
        }

        // Step 7. Finalized targets never take part in a new cycle.
        if graph.is_finalized(w) {
            v_state.traverse_next();
            return Ok(StepOutcome::Retry(v));
        }

        // Step 8. The arc stays untraversed until both trees are held.
        let Some(locks) = graph.try_lock_trees(forest, w, v) else {
            trace!("{}: tree of {} contended", node.id(), graph.id_of(w));
            return Ok(StepOutcome::Retry(v));
        };

        // Step 9. w may have been absorbed or finalized before we got its lock.
        if self.ctx.is_aborted() {
            return Ok(StepOutcome::Done);
        }
        if graph.resolve(arc.to) != w {
            return Ok(StepOutcome::Retry(v));
        }
        if graph.is_finalized(w) {
            v_state.traverse_next();
            return Ok(StepOutcome::Retry(v));
        }

        if locks.root_index != v {
            // Step 10. Different trees: v becomes a child of w.
            v_state.traverse_next();
            forest.link(v, w)?;
            debug!("{}: linked below {}", node.id(), graph.id_of(w));
            let w_is_root = locks.root_index == w;
            return Ok(if w_is_root {
                StepOutcome::HandOff(w)
            } else {
                StepOutcome::Done
            });
        }

        // Step 11. Same tree: the arc closes a cycle through v.
        self.contract_path(v_state, locks, w)
    }

    /// Collapses the tree path from `w` up to `v` into `v`.
    fn contract_path(&self, mut v_state: MutexGuard<'a, NodeState>, locks: TreeLocks<'a>, w: usize) -> Result<StepOutcome> {
        let graph = self.ctx.graph;
        let forest = self.ctx.forest;
        let v = self.v;

        // Step 1. Walk the path. v's tree cannot change while v is held.
        let mut path = vec![w];
        let mut current = w;
        loop {
            match forest.parent(current) {
                Some(p) if p == v => break,
                Some(p) => {
                    path.push(p);
                    current = p;
                }
                None => {
                    debug_assert!(false, "{} lost its path to root {}", graph.id_of(w), graph.id_of(v));
                    return Ok(StepOutcome::Retry(v));
                }
            }
        }

        // Step 2. Lock the rest of the path, back off on any contention.
        let mut guards = Vec::with_capacity(path.len());
        guards.push(locks.w);
        for &p in &path[1..] {
            match graph.try_lock(p) {
                Some(guard) => guards.push(guard),
                None => {
                    trace!("{}: path vertex {} contended", graph.id_of(v), graph.id_of(p));
                    return Ok(StepOutcome::Retry(v));
                }
            }
        }

        if self.ctx.is_aborted() {
            return Ok(StepOutcome::Done);
        }

        // Step 3. Claim the arc and move everything hanging off the path to v.
        v_state.traverse_next();
        for (i, &p) in path.iter().enumerate() {
            let below = if i > 0 { Some(path[i - 1]) } else { None };
            for child in forest.children(p) {
                if Some(child) != below {
                    forest.relink(child, v)?;
                }
            }
        }
        for &p in &path {
            forest.cut(p);
        }

        // Step 4. Merge the records.
        for (&p, guard) in path.iter().zip(guards.iter_mut()) {
            graph.contract(v, &mut v_state, p, guard)?;
        }
        drop(guards);
        debug!("{}: contracted {} vertices", graph.id_of(v), path.len());

        // Step 5.
        let members = component_members(graph.id_of(v), &v_state);
        if !self.ctx.liveness.check(graph.id_of(v), &members) {
            return Err(SccError::LivenessViolation {
                representative: graph.id_of(v),
                members,
            });
        }

        if v_state.has_untraversed_arc() {
            Ok(StepOutcome::Retry(v))
        } else {
            self.finalize(v_state)
        }
    }

    /// Marks `v` POST, records its component and frees its children.
    fn finalize(&self, v_state: MutexGuard<'a, NodeState>) -> Result<StepOutcome> {
        let graph = self.ctx.graph;
        let v = self.v;
        let node = graph.node(v);
        debug_assert!(!v_state.has_untraversed_arc());

        let previous = node.advance(Visited::Post)?;
        if previous == Visited::Post {
            return Err(SccError::IllegalTransition {
                vertex: node.id(),
                from: previous,
                to: Visited::Post,
            });
        }

        let children = self.ctx.forest.detach_children(v);
        let component = Component {
            members: component_members(node.id(), &v_state),
            self_loop: v_state.has_self_loop(),
        };
        debug!(
            "{}: finalized component of {} members, freed {} children",
            node.id(),
            component.members.len(),
            children.len()
        );
        self.ctx.sccs.insert(v, component);
        Ok(StepOutcome::Finalized(children))
    }
}

fn component_members(representative: u64, state: &NodeState) -> Vec<u64> {
    let mut members = Vec::with_capacity(state.absorbed().len() + 1);
    members.push(representative);
    members.extend_from_slice(state.absorbed());
    members.sort_unstable();
    members
}

#[cfg(test)]
mod test_scc_worker {
    use std::collections::VecDeque;

    use crate::algorithms::liveness::AcceptAll;
    use crate::algorithms::scc_worker::{SccWorker, SearchContext, StepOutcome};
    use crate::config::ForestKind;
    use crate::error::SccError;
    use crate::forest::build_forest;
    use crate::graph::node::Visited;
    use crate::graph::GraphBuilder;

    /// Runs work items one by one on the current thread until none is left.
    fn drain(ctx: &SearchContext<'_>, seeds: Vec<usize>) {
        let mut queue: VecDeque<usize> = seeds.into();
        while let Some(v) = queue.pop_front() {
            match SccWorker::new(ctx, v).step().unwrap() {
                StepOutcome::Done => {}
                StepOutcome::Retry(x) | StepOutcome::HandOff(x) => queue.push_back(x),
                StepOutcome::Finalized(children) => queue.extend(children),
            }
        }
    }

    #[test]
    fn test_link_then_contract() {
        for kind in [ForestKind::Naive, ForestKind::LinkCut] {
            let graph = GraphBuilder::from_arcs([(1, 2), (2, 1)]).build();
            let forest = build_forest(kind, graph.vertex_count());
            let ctx = SearchContext::new(&graph, forest.as_ref(), &AcceptAll);

            assert_eq!(SccWorker::new(&ctx, 0).step().unwrap(), StepOutcome::HandOff(1));
            assert_eq!(forest.parent(0), Some(1));
            assert!(graph.node(0).is(Visited::Pre));

            // A work item for a child is dropped.
            assert_eq!(SccWorker::new(&ctx, 0).step().unwrap(), StepOutcome::Done);

            assert_eq!(SccWorker::new(&ctx, 1).step().unwrap(), StepOutcome::Finalized(vec![]));
            assert_eq!(graph.resolve(0), 1);
            assert!(graph.node(0).is(Visited::Post));
            assert!(graph.is_finalized(1));
            assert!(forest.is_root(0));
            graph.check_post_condition(forest.as_ref()).unwrap();

            let sccs = ctx.into_components();
            assert_eq!(sccs.len(), 1);
            assert_eq!(sccs.get(&1).unwrap().members, vec![1, 2]);
        }
    }

    /// Two cycles sharing vertex 3, closed from different ends of the tree.
    #[test]
    fn test_contractions_graph_c() {
        let arcs = [(1, 3), (2, 3), (3, 4), (3, 5), (4, 1), (5, 2)];
        for kind in [ForestKind::Naive, ForestKind::LinkCut] {
            let graph = GraphBuilder::from_arcs(arcs).build();
            let forest = build_forest(kind, graph.vertex_count());
            let ctx = SearchContext::new(&graph, forest.as_ref(), &AcceptAll);
            drain(&ctx, (0..graph.vertex_count()).collect());

            graph.check_post_condition(forest.as_ref()).unwrap();
            let sccs = ctx.into_components();
            assert_eq!(sccs.len(), 1);
            let component = sccs.iter().next().unwrap();
            assert_eq!(component.members, vec![1, 2, 3, 4, 5]);
        }
    }

    #[test]
    fn test_contention_keeps_arc() {
        let graph = GraphBuilder::from_arcs([(1, 2), (2, 3)]).build();
        let forest = build_forest(ForestKind::Naive, graph.vertex_count());
        let ctx = SearchContext::new(&graph, forest.as_ref(), &AcceptAll);

        {
            let _v = graph.try_lock(0).unwrap();
            assert_eq!(SccWorker::new(&ctx, 0).step().unwrap(), StepOutcome::Retry(0));
        }
        {
            let _w = graph.try_lock(1).unwrap();
            assert_eq!(SccWorker::new(&ctx, 0).step().unwrap(), StepOutcome::Retry(0));
        }
        assert_eq!(graph.try_lock(0).unwrap().untraversed_count(), 1);
        assert!(forest.is_root(0));

        assert_eq!(SccWorker::new(&ctx, 0).step().unwrap(), StepOutcome::HandOff(1));
        assert_eq!(graph.try_lock(0).unwrap().traversed_count(), 1);
    }

    #[test]
    fn test_finalized_target_and_self_loop() {
        let graph = GraphBuilder::from_arcs([(1, 1), (1, 2)]).build();
        let forest = build_forest(ForestKind::LinkCut, graph.vertex_count());
        let ctx = SearchContext::new(&graph, forest.as_ref(), &AcceptAll);

        assert_eq!(SccWorker::new(&ctx, 1).step().unwrap(), StepOutcome::Finalized(vec![]));
        assert_eq!(SccWorker::new(&ctx, 1).step().unwrap(), StepOutcome::Done);

        // 1 -> 1 is a self-loop, 1 -> 2 points at a finalized vertex.
        assert_eq!(SccWorker::new(&ctx, 0).step().unwrap(), StepOutcome::Retry(0));
        assert_eq!(SccWorker::new(&ctx, 0).step().unwrap(), StepOutcome::Retry(0));
        assert!(forest.is_root(0));
        assert_eq!(SccWorker::new(&ctx, 0).step().unwrap(), StepOutcome::Finalized(vec![]));
        graph.check_post_condition(forest.as_ref()).unwrap();

        let sccs = ctx.into_components();
        assert!(sccs.get(&0).unwrap().self_loop);
        assert_eq!(sccs.get(&1).unwrap().members, vec![2]);
        assert!(!sccs.get(&1).unwrap().self_loop);
    }

    #[test]
    fn test_liveness_violation() {
        let graph = GraphBuilder::from_arcs([(1, 2), (2, 1)]).build();
        let forest = build_forest(ForestKind::Naive, graph.vertex_count());
        let reject = |_rep: u64, members: &[u64]| members.len() < 2;
        let ctx = SearchContext::new(&graph, forest.as_ref(), &reject);

        assert_eq!(SccWorker::new(&ctx, 0).step().unwrap(), StepOutcome::HandOff(1));
        match SccWorker::new(&ctx, 1).step() {
            Err(SccError::LivenessViolation { representative, members }) => {
                assert_eq!(representative, 2);
                assert_eq!(members, vec![1, 2]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_aborted_search_does_nothing() {
        let graph = GraphBuilder::from_arcs([(1, 2)]).build();
        let forest = build_forest(ForestKind::Naive, graph.vertex_count());
        let ctx = SearchContext::new(&graph, forest.as_ref(), &AcceptAll);
        ctx.fail(SccError::PostCondition(String::from("test")));

        assert_eq!(SccWorker::new(&ctx, 0).step().unwrap(), StepOutcome::Done);
        assert!(graph.node(0).is(Visited::Un));
        assert!(matches!(ctx.take_error(), Some(SccError::PostCondition(_))));
    }

    /// An abort between two steps leaves the pending cycle untouched.
    #[test]
    fn test_abort_mid_search_stops_mutation() {
        for kind in [ForestKind::Naive, ForestKind::LinkCut] {
            let graph = GraphBuilder::from_arcs([(1, 2), (2, 1), (2, 3)]).build();
            let forest = build_forest(kind, graph.vertex_count());
            let ctx = SearchContext::new(&graph, forest.as_ref(), &AcceptAll);

            assert_eq!(SccWorker::new(&ctx, 0).step().unwrap(), StepOutcome::HandOff(1));
            ctx.fail(SccError::PostCondition(String::from("test")));

            assert_eq!(SccWorker::new(&ctx, 1).step().unwrap(), StepOutcome::Done);
            assert_eq!(forest.parent(0), Some(1));
            assert!(forest.is_root(1));
            assert_eq!(graph.resolve(0), 0);
            assert!(graph.node(1).is(Visited::Un));
            assert_eq!(graph.try_lock(1).unwrap().untraversed_count(), 2);
            assert!(ctx.into_components().is_empty());
        }
    }
}
