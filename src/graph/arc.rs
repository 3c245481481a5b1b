use std::hash::{Hash, Hasher};

/// A directed arc between two vertices of the graph.
///
/// Arcs keep their original endpoints for their whole life. When the source
/// vertex is contracted the arc simply moves to the surviving vertex, and the
/// target is looked up through the graph's redirect table at traversal time.
/// Equality and hashing ignore the `traversed` flag.
#[derive(Debug, Clone, Copy)]
pub struct Arc {
    /// Dense index of the source vertex.
    pub from: usize,
    /// Dense index of the target vertex.
    pub to: usize,
    traversed: bool,
}

impl Arc {
    pub fn new(from: usize, to: usize) -> Self {
        Arc { from, to, traversed: false }
    }

    pub fn is_traversed(&self) -> bool {
        self.traversed
    }

    /// Marks the arc traversed.
    ///
    /// # Returns
    /// * `true` if the arc had already been traversed, in which case nothing changes
    pub fn set_traversed(&mut self) -> bool {
        std::mem::replace(&mut self.traversed, true)
    }
}

impl PartialEq for Arc {
    fn eq(&self, other: &Self) -> bool {
        self.from == other.from && self.to == other.to
    }
}

impl Eq for Arc {}

impl Hash for Arc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.from.hash(state);
        self.to.hash(state);
    }
}
