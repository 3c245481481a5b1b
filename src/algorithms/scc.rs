use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::{ScopeFifo, ThreadPoolBuilder};
use rustc_hash::FxHashMap;

use crate::algorithms::liveness::{AcceptAll, LivenessCheck};
use crate::algorithms::scc_worker::{SccWorker, SearchContext, StepOutcome};
use crate::config::SccConfig;
use crate::error::Result;
use crate::forest::{build_forest, DynamicForest};
use crate::graph::node::Visited;
use crate::graph::Graph;

/// Trait for computing Strongly Connected Components (SCC) of a graph.
///
/// Implementors explore the graph from its initial vertices (or from every
/// vertex when none are designated) and report one component per finalized
/// representative.
pub trait SccSearch {
    /// Computes the strongly connected components of `graph`.
    ///
    /// # Arguments
    ///
    /// * `graph` - The graph to search
    ///
    /// # Returns
    ///
    /// * `Result<SccPartition>` - The components found, or the error that
    ///   aborted the search
    fn search(&self, graph: &Graph) -> Result<SccPartition>;
}

/// The components found by a search.
///
/// Maps the original id of every representative to the sorted original ids
/// merged into it. Every vertex reached by the search belongs to exactly one
/// component, singletons included.
#[derive(Debug, Clone, Default)]
pub struct SccPartition {
    components: BTreeMap<u64, Vec<u64>>,
    /// Representatives of singleton components carrying a self-loop.
    self_loops: BTreeSet<u64>,
    /// Member -> representative.
    member_index: FxHashMap<u64, u64>,
}

impl SccPartition {
    /// Adds a component. `members` must contain `representative`.
    pub fn insert(&mut self, representative: u64, mut members: Vec<u64>, self_loop: bool) {
        members.sort_unstable();
        debug_assert!(members.binary_search(&representative).is_ok());
        if self_loop && members.len() == 1 {
            self.self_loops.insert(representative);
        }
        for &member in &members {
            self.member_index.insert(member, representative);
        }
        self.components.insert(representative, members);
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Iterates over `(representative, members)` pairs ordered by representative.
    pub fn components(&self) -> impl Iterator<Item = (u64, &[u64])> + '_ {
        self.components.iter().map(|(&rep, members)| (rep, members.as_slice()))
    }

    /// Returns the members of the component containing `id`.
    pub fn component_of(&self, id: u64) -> Option<&[u64]> {
        let rep = self.member_index.get(&id)?;
        self.components.get(rep).map(Vec::as_slice)
    }

    /// Returns `true` if `representative` is a singleton with an arc to itself.
    pub fn has_self_loop(&self, representative: u64) -> bool {
        self.self_loops.contains(&representative)
    }

    /// Components relevant to liveness: more than one member, or a single
    /// member with a self-loop.
    pub fn non_trivial(&self) -> impl Iterator<Item = (u64, &[u64])> + '_ {
        self.components()
            .filter(|(rep, members)| members.len() > 1 || self.self_loops.contains(rep))
    }

    /// Sizes of all components, ordered by representative.
    pub fn compute_sizes(&self) -> Vec<usize> {
        self.components.values().map(Vec::len).collect()
    }

    /// Canonical form independent of the chosen representatives: sorted
    /// member lists, sorted by their smallest member.
    pub fn sorted_components(&self) -> Vec<Vec<u64>> {
        let mut sorted: Vec<Vec<u64>> = self.components.values().cloned().collect();
        sorted.sort_unstable();
        sorted
    }

    /// Returns `true` if the components are pairwise disjoint and their union
    /// is exactly `ids`.
    pub fn is_partition_of(&self, ids: &[u64]) -> bool {
        let total: usize = self.components.values().map(Vec::len).sum();
        total == self.member_index.len()
            && total == ids.len()
            && ids.iter().all(|id| self.member_index.contains_key(id))
    }
}

/// Concurrent on-the-fly SCC search over a tentative DFS forest.
///
/// Every work item advances one root by one step (see
/// [`SccWorker`](crate::algorithms::scc_worker::SccWorker)) on a rayon pool.
/// Contended steps are resubmitted as fresh tasks, finalized roots hand their
/// children back to the pool, and the search ends when the pool runs out of
/// work. The first error (a liveness violation or a protocol fault) cancels
/// every remaining work item and is returned instead of a partition.
pub struct ConcurrentFastScc {
    config: SccConfig,
    liveness: Arc<dyn LivenessCheck>,
}

impl ConcurrentFastScc {
    pub fn new(config: SccConfig) -> Self {
        ConcurrentFastScc { config, liveness: Arc::new(AcceptAll) }
    }

    /// Replaces the liveness predicate applied to every contracted component.
    pub fn with_liveness<L: LivenessCheck + 'static>(mut self, liveness: L) -> Self {
        self.liveness = Arc::new(liveness);
        self
    }

    /// Runs the search with a caller-provided forest, which can be inspected
    /// afterwards.
    pub fn search_with_forest(&self, graph: &Graph, forest: &dyn DynamicForest) -> Result<SccPartition> {
        let start = Instant::now();
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.thread_num)
            .thread_name(|i| format!("scc-worker-{}", i))
            .build()?;
        info!(
            "SCC search: {} vertices, {} arcs, {} threads, {:?} forest",
            graph.vertex_count(),
            graph.arc_count(),
            pool.current_num_threads(),
            self.config.forest
        );

        // Step 1. Seed one work item per eligible root.
        let seeds = self.seeds(graph, forest);
        let ctx = SearchContext::new(graph, forest, self.liveness.as_ref());

        // Step 2. Run until quiescence.
        pool.scope_fifo(|scope| {
            for v in seeds {
                spawn_step(scope, &ctx, v);
            }
        });
        if let Some(err) = ctx.take_error() {
            return Err(err);
        }

        // Step 3. Collect the partition.
        if self.config.check_post_condition {
            graph.check_post_condition(forest)?;
        }
        let mut partition = SccPartition::default();
        for (rep, component) in ctx.into_components() {
            partition.insert(graph.id_of(rep), component.members, component.self_loop);
        }
        info!(
            "SCC search done in {:?}: {} components, {} non-trivial",
            start.elapsed(),
            partition.num_components(),
            partition.non_trivial().count()
        );
        Ok(partition)
    }

    /// Initial vertices if any are designated, otherwise every vertex.
    /// Only roots that are not POST yet are kept.
    fn seeds(&self, graph: &Graph, forest: &dyn DynamicForest) -> Vec<usize> {
        let mut seeds: Vec<usize> = if graph.init_vertices().is_empty() {
            let mut all: Vec<usize> = (0..graph.vertex_count()).collect();
            if self.config.shuffle_seeds {
                let mut rng = match self.config.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                all.shuffle(&mut rng);
            }
            all
        } else {
            graph.init_vertices().to_vec()
        };
        seeds.retain(|&v| !graph.node(v).is(Visited::Post) && forest.is_root(v));
        seeds
    }
}

impl SccSearch for ConcurrentFastScc {
    fn search(&self, graph: &Graph) -> Result<SccPartition> {
        let forest = build_forest(self.config.forest, graph.vertex_count());
        self.search_with_forest(graph, forest.as_ref())
    }
}

fn spawn_step<'scope>(scope: &ScopeFifo<'scope>, ctx: &'scope SearchContext<'scope>, v: usize) {
    scope.spawn_fifo(move |scope| run_step(scope, ctx, v));
}

fn run_step<'scope>(scope: &ScopeFifo<'scope>, ctx: &'scope SearchContext<'scope>, v: usize) {
    match SccWorker::new(ctx, v).step() {
        Ok(StepOutcome::Done) => {}
        Ok(StepOutcome::Retry(next)) | Ok(StepOutcome::HandOff(next)) => spawn_step(scope, ctx, next),
        Ok(StepOutcome::Finalized(children)) => {
            for child in children {
                spawn_step(scope, ctx, child);
            }
        }
        Err(err) => ctx.fail(err),
    }
}
