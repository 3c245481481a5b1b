use std::collections::BTreeMap;

use crate::graph::Graph;

/// Read-only queries over the original topology of a graph.
///
/// Contraction never shows through this trait: it always answers for the
/// arcs as they were ingested. Used to validate search results.
///
/// # Type Parameters
///
/// * `T` - The vertex identifier type.
/// * `V` - The vertex data type returned by the queries.
pub trait GraphQuery<T, V>
where
    T: Copy + Ord
{
    /// Retrieves all successors of a given vertex.
    ///
    /// # Parameters
    ///
    /// * `vertex_id` - A reference to the identifier of the vertex whose neighbors are being queried.
    ///
    /// # Returns
    ///
    /// A vector with the successors, empty if the vertex is unknown.
    fn read_neighbor(&self, vertex_id: &T) -> Vec<V>;

    /// Checks if a specific vertex exists in the graph.
    fn has_vertex(&self, vertex_id: &T) -> bool;

    /// Determines if an arc exists from `src_id` to `dst_id`.
    fn has_edge(&self, src_id: &T, dst_id: &T) -> bool;

    /// Retrieves a list of all vertices of the graph.
    fn vertex_list(&self) -> Vec<V>;

    /// Generates a complete representation of the graph as a map from each
    /// vertex to itself and its successors.
    fn all(&self) -> BTreeMap<T, (V, Vec<V>)>;
}

impl GraphQuery<u64, u64> for Graph {
    fn read_neighbor(&self, vertex_id: &u64) -> Vec<u64> {
        match self.index_of(*vertex_id) {
            Some(idx) => self.neighbors(idx).iter().map(|&n| self.id_of(n)).collect(),
            None => vec![],
        }
    }

    fn has_vertex(&self, vertex_id: &u64) -> bool {
        self.index_of(*vertex_id).is_some()
    }

    fn has_edge(&self, src_id: &u64, dst_id: &u64) -> bool {
        match (self.index_of(*src_id), self.index_of(*dst_id)) {
            (Some(src), Some(dst)) => self.neighbors(src).contains(&dst),
            _ => false,
        }
    }

    fn vertex_list(&self) -> Vec<u64> {
        self.ids().to_vec()
    }

    fn all(&self) -> BTreeMap<u64, (u64, Vec<u64>)> {
        self.ids()
            .iter()
            .map(|&id| (id, (id, self.read_neighbor(&id))))
            .collect()
    }
}
