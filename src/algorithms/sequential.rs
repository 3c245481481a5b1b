use log::info;

use crate::algorithms::scc::{SccPartition, SccSearch};
use crate::error::Result;
use crate::graph::Graph;

/// Single-threaded path-based SCC search (Gabow) over the original topology.
///
/// Contraction is represented the classic way: a stack of the vertices on the
/// current DFS path and a second stack of boundaries, where popping
/// boundaries merges the top of the path into one component. The search
/// starts from the initial vertices of the graph, or from every vertex when
/// none are designated, and leaves the mutable vertex records untouched, so
/// it can run before or after a concurrent search on the same graph.
///
/// # Time Complexity
/// O(V + E)
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialFastScc;

impl SequentialFastScc {
    pub fn new() -> Self {
        SequentialFastScc
    }
}

const UNSET: usize = usize::MAX;

impl SccSearch for SequentialFastScc {
    fn search(&self, graph: &Graph) -> Result<SccPartition> {
        let n = graph.vertex_count();
        let seeds: Vec<usize> = if graph.init_vertices().is_empty() {
            (0..n).collect()
        } else {
            graph.init_vertices().to_vec()
        };

        let mut counter = 0;
        let mut preorder = vec![UNSET; n];
        let mut assigned = vec![false; n];
        let mut self_loop = vec![false; n];
        let mut path: Vec<usize> = Vec::new();
        let mut boundaries: Vec<usize> = Vec::new();
        let mut partition = SccPartition::default();

        // Define DFS state for non-recursive implementation
        #[derive(Clone, Copy)]
        enum State {
            Start,
            ProcessNeighbor(usize),
            Finish,
        }

        for start in seeds {
            if preorder[start] != UNSET {
                continue;
            }

            let mut dfs_stack = vec![(start, State::Start)];
            while let Some((v, state)) = dfs_stack.pop() {
                match state {
                    State::Start => {
                        preorder[v] = counter;
                        counter += 1;
                        path.push(v);
                        boundaries.push(preorder[v]);
                        dfs_stack.push((v, State::ProcessNeighbor(0)));
                    }

                    State::ProcessNeighbor(pos) => {
                        let neighbors = graph.neighbors(v);
                        if pos == neighbors.len() {
                            dfs_stack.push((v, State::Finish));
                            continue;
                        }
                        let w = neighbors[pos];
                        dfs_stack.push((v, State::ProcessNeighbor(pos + 1)));

                        if w == v {
                            self_loop[v] = true;
                        } else if preorder[w] == UNSET {
                            dfs_stack.push((w, State::Start));
                        } else if !assigned[w] {
                            // w is on the path: merge everything above it.
                            while boundaries.last().is_some_and(|&top| preorder[w] < top) {
                                boundaries.pop();
                            }
                        }
                    }

                    State::Finish => {
                        if boundaries.last() != Some(&preorder[v]) {
                            continue;
                        }
                        boundaries.pop();

                        let mut members = Vec::new();
                        let mut has_loop = false;
                        while let Some(x) = path.pop() {
                            assigned[x] = true;
                            has_loop |= self_loop[x];
                            members.push(graph.id_of(x));
                            if x == v {
                                break;
                            }
                        }
                        partition.insert(graph.id_of(v), members, has_loop);
                    }
                }
            }
        }

        info!(
            "Sequential SCC search: {} components, {} non-trivial",
            partition.num_components(),
            partition.non_trivial().count()
        );
        Ok(partition)
    }
}
