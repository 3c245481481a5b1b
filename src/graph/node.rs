use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};

use crate::error::{Result, SccError};
use crate::graph::arc::Arc;

/// Exploration status of a vertex.
///
/// The order of the variants is the only legal direction of travel:
/// `Un -> Pre -> Post`. Staying in place is allowed, moving back is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Visited {
    /// Not reached yet.
    Un = 0,
    /// On some worker's active exploration path.
    Pre = 1,
    /// Fully explored, membership frozen.
    Post = 2,
}

impl Visited {
    fn from_u8(raw: u8) -> Visited {
        match raw {
            0 => Visited::Un,
            1 => Visited::Pre,
            _ => Visited::Post,
        }
    }

    pub fn can_advance_to(self, next: Visited) -> bool {
        next >= self
    }
}

/// Mutable part of a vertex, guarded by the vertex lock.
#[derive(Debug, Default)]
pub struct NodeState {
    /// Outgoing arcs still to be explored, consumed from the back.
    untraversed: Vec<Arc>,
    /// Arcs already explored, kept for the post-condition check.
    traversed: Vec<Arc>,
    /// Original ids of the vertices contracted into this one.
    absorbed: Vec<u64>,
    /// Set once an arc of this vertex (or of anything contracted into it) led back to it.
    self_loop: bool,
}

impl NodeState {
    pub(crate) fn with_arcs(mut arcs: Vec<Arc>) -> Self {
        // Reversed so that popping from the back follows input order.
        arcs.reverse();
        NodeState {
            untraversed: arcs,
            ..NodeState::default()
        }
    }

    /// Returns the next untraversed arc without claiming it.
    pub fn untraversed_arc(&self) -> Option<Arc> {
        self.untraversed.last().copied()
    }

    pub fn has_untraversed_arc(&self) -> bool {
        !self.untraversed.is_empty()
    }

    pub fn untraversed_count(&self) -> usize {
        self.untraversed.len()
    }

    pub fn traversed_count(&self) -> usize {
        self.traversed.len()
    }

    /// Claims the arc returned by the last call to `untraversed_arc`.
    ///
    /// # Returns
    /// * The claimed arc, or `None` if there was nothing left to claim
    pub fn traverse_next(&mut self) -> Option<Arc> {
        let mut arc = self.untraversed.pop()?;
        let already = arc.set_traversed();
        debug_assert!(!already, "arc {:?} claimed twice", arc);
        self.traversed.push(arc);
        Some(arc)
    }

    pub fn absorbed(&self) -> &[u64] {
        &self.absorbed
    }

    pub fn has_self_loop(&self) -> bool {
        self.self_loop
    }

    pub fn mark_self_loop(&mut self) {
        self.self_loop = true;
    }

    /// Moves everything `other` owns into `self`: arcs (traversed or not),
    /// absorbed members, the self-loop flag, and `other_id` itself.
    pub(crate) fn absorb(&mut self, other_id: u64, other: &mut NodeState) {
        self.untraversed.append(&mut other.untraversed);
        self.traversed.append(&mut other.traversed);
        self.absorbed.push(other_id);
        self.absorbed.append(&mut other.absorbed);
        self.self_loop |= other.self_loop;
    }
}

/// A vertex record: stable identity, monotonic visited state, and the lock
/// that guards its adjacency and forest linkage.
#[derive(Debug)]
pub struct GraphNode {
    id: u64,
    visited: AtomicU8,
    state: Mutex<NodeState>,
}

impl GraphNode {
    pub(crate) fn new(id: u64, arcs: Vec<Arc>) -> Self {
        GraphNode {
            id,
            visited: AtomicU8::new(Visited::Un as u8),
            state: Mutex::new(NodeState::with_arcs(arcs)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn visited(&self) -> Visited {
        Visited::from_u8(self.visited.load(Ordering::Acquire))
    }

    pub fn is(&self, state: Visited) -> bool {
        self.visited() == state
    }

    /// Moves the visited state forward to `to`.
    ///
    /// # Returns
    /// * The previous state
    ///
    /// # Errors
    /// * `SccError::IllegalTransition` if `to` lies before the current state
    pub fn advance(&self, to: Visited) -> Result<Visited> {
        self.visited
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Visited::from_u8(current).can_advance_to(to).then_some(to as u8)
            })
            .map(Visited::from_u8)
            .map_err(|current| SccError::IllegalTransition {
                vertex: self.id,
                from: Visited::from_u8(current),
                to,
            })
    }

    /// Non-blocking acquisition of the vertex lock. `None` means contention,
    /// never an error.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, NodeState>> {
        match self.state.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

#[cfg(test)]
mod test_node {
    use crate::error::SccError;
    use crate::graph::arc::Arc;
    use crate::graph::node::{GraphNode, NodeState, Visited};

    #[test]
    fn test_monotonic_transitions() {
        let node = GraphNode::new(7, Vec::new());
        assert!(node.is(Visited::Un));
        assert_eq!(node.advance(Visited::Pre).unwrap(), Visited::Un);
        assert_eq!(node.advance(Visited::Pre).unwrap(), Visited::Pre);
        assert_eq!(node.advance(Visited::Post).unwrap(), Visited::Pre);

        match node.advance(Visited::Pre) {
            Err(SccError::IllegalTransition { vertex, from, to }) => {
                assert_eq!(vertex, 7);
                assert_eq!(from, Visited::Post);
                assert_eq!(to, Visited::Pre);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(node.advance(Visited::Un).is_err());
        assert!(node.is(Visited::Post));
    }

    #[test]
    fn test_arcs_in_input_order() {
        let node = GraphNode::new(0, vec![Arc::new(0, 1), Arc::new(0, 2)]);
        let mut state = node.try_lock().unwrap();
        assert_eq!(state.untraversed_arc().map(|a| a.to), Some(1));
        assert_eq!(state.traverse_next().map(|a| a.to), Some(1));
        assert_eq!(state.traverse_next().map(|a| a.to), Some(2));
        assert!(state.traverse_next().is_none());
        assert_eq!(state.traversed_count(), 2);
    }

    #[test]
    fn test_try_lock_contention() {
        let node = GraphNode::new(3, Vec::new());
        let guard = node.try_lock();
        assert!(guard.is_some());
        assert!(node.try_lock().is_none());
        drop(guard);
        assert!(node.try_lock().is_some());
    }

    #[test]
    fn test_absorb() {
        let mut dst = NodeState::with_arcs(vec![Arc::new(0, 1)]);
        let mut src = NodeState::with_arcs(vec![Arc::new(1, 0), Arc::new(1, 2)]);
        src.mark_self_loop();
        src.absorbed.push(9);

        dst.absorb(1, &mut src);
        assert_eq!(dst.untraversed_count(), 3);
        assert_eq!(dst.absorbed(), &[1, 9]);
        assert!(dst.has_self_loop());
        assert_eq!(src.untraversed_count(), 0);
        assert!(src.absorbed().is_empty());
    }
}
