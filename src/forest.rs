use crate::config::ForestKind;
use crate::error::ForestError;
use crate::forest::link_cut::LinkCutForest;
use crate::forest::naive::NaiveForest;

pub mod link_cut;
pub mod naive;

/// Sentinel stored in parent slots of roots.
pub(crate) const NO_PARENT: usize = usize::MAX;

/// A forest of rooted trees over dense vertex indices.
///
/// The forest records which vertex is currently nested below which one during
/// the search. A vertex without a parent is a root and can be scheduled on its
/// own. All methods take `&self` so a single forest can be shared by every
/// worker. Implementations keep each individual operation consistent, but
/// callers own the higher level discipline: the vertex being linked or cut
/// must be locked by the caller, together with the root of every tree the
/// operation touches.
///
/// # Invariants
///
/// * `link` never closes a cycle.
/// * A vertex that gets reparented through `relink` is never observed as a root
///   in between.
pub trait DynamicForest: Send + Sync {
    /// Number of vertices the forest was created for.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `x` has no parent.
    fn is_root(&self, x: usize) -> bool;

    /// Returns the current parent of `x`, if any.
    fn parent(&self, x: usize) -> Option<usize>;

    /// Attaches the root `child` below `parent`.
    ///
    /// # Errors
    ///
    /// * `ForestError::SelfLink` if `child == parent`
    /// * `ForestError::NotARoot` if `child` already has a parent
    /// * `ForestError::WouldCycle` if `parent` lies in the tree rooted at `child`
    fn link(&self, child: usize, parent: usize) -> Result<(), ForestError>;

    /// Detaches `x` from its parent. A no-op on a root.
    fn cut(&self, x: usize);

    /// Moves `child` below `parent` in one step.
    ///
    /// Unlike `cut` followed by `link`, no reader can see `child` as a root
    /// while it moves.
    fn relink(&self, child: usize, parent: usize) -> Result<(), ForestError>;

    /// Returns the root of the tree containing `x`.
    fn root(&self, x: usize) -> usize;

    fn same_tree(&self, a: usize, b: usize) -> bool {
        self.root(a) == self.root(b)
    }

    /// Returns the direct children of `x`.
    fn children(&self, x: usize) -> Vec<usize>;

    /// Removes every direct child of `x` and returns them. Each of them is a
    /// root afterwards.
    fn detach_children(&self, x: usize) -> Vec<usize>;
}

/// Creates an empty forest of `n` singleton trees with the requested backing.
pub fn build_forest(kind: ForestKind, n: usize) -> Box<dyn DynamicForest> {
    match kind {
        ForestKind::Naive => Box::new(NaiveForest::new(n)),
        ForestKind::LinkCut => Box::new(LinkCutForest::new(n)),
    }
}
