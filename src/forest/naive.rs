use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::ForestError;
use crate::forest::{DynamicForest, NO_PARENT};

/// Parent/children pointers stored in an arena indexed by vertex.
///
/// Parent slots are atomics so that `is_root`, `parent` and `root` never take
/// a lock. The children list of every vertex sits behind its own small mutex
/// which is only held for the duration of a push or a removal.
/// `root` walks the parent chain and costs O(depth).
pub struct NaiveForest {
    parent: Vec<AtomicUsize>,
    children: Vec<Mutex<Vec<usize>>>,
}

impl NaiveForest {
    pub fn new(n: usize) -> Self {
        NaiveForest {
            parent: (0..n).map(|_| AtomicUsize::new(NO_PARENT)).collect(),
            children: (0..n).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    fn children_of(&self, x: usize) -> MutexGuard<'_, Vec<usize>> {
        self.children[x].lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if `ancestor` lies on the parent chain of `x` (or is `x`).
    fn is_ancestor(&self, ancestor: usize, x: usize) -> bool {
        let mut current = x;
        loop {
            if current == ancestor {
                return true;
            }
            match self.parent(current) {
                Some(p) => current = p,
                None => return false,
            }
        }
    }

    fn remove_child(&self, parent: usize, child: usize) {
        let mut children = self.children_of(parent);
        if let Some(pos) = children.iter().position(|&c| c == child) {
            children.swap_remove(pos);
        }
    }
}

impl DynamicForest for NaiveForest {
    fn len(&self) -> usize {
        self.parent.len()
    }

    fn is_root(&self, x: usize) -> bool {
        self.parent[x].load(Ordering::Acquire) == NO_PARENT
    }

    fn parent(&self, x: usize) -> Option<usize> {
        match self.parent[x].load(Ordering::Acquire) {
            NO_PARENT => None,
            p => Some(p),
        }
    }

    fn link(&self, child: usize, parent: usize) -> Result<(), ForestError> {
        if child == parent {
            return Err(ForestError::SelfLink(child));
        }
        if let Some(existing) = self.parent(child) {
            return Err(ForestError::NotARoot { child, parent: existing });
        }
        if self.is_ancestor(child, parent) {
            return Err(ForestError::WouldCycle { child, parent });
        }
        self.children_of(parent).push(child);
        self.parent[child].store(parent, Ordering::Release);
        Ok(())
    }

    fn cut(&self, x: usize) {
        let old = self.parent[x].swap(NO_PARENT, Ordering::AcqRel);
        if old != NO_PARENT {
            self.remove_child(old, x);
        }
    }

    fn relink(&self, child: usize, parent: usize) -> Result<(), ForestError> {
        if child == parent {
            return Err(ForestError::SelfLink(child));
        }
        if self.is_ancestor(child, parent) {
            return Err(ForestError::WouldCycle { child, parent });
        }
        self.children_of(parent).push(child);
        // Single store: the child goes straight from one parent to the next.
        let old = self.parent[child].swap(parent, Ordering::AcqRel);
        if old != NO_PARENT {
            self.remove_child(old, child);
        }
        Ok(())
    }

    fn root(&self, x: usize) -> usize {
        let mut current = x;
        while let Some(p) = self.parent(current) {
            current = p;
        }
        current
    }

    fn children(&self, x: usize) -> Vec<usize> {
        self.children_of(x).clone()
    }

    fn detach_children(&self, x: usize) -> Vec<usize> {
        let detached = std::mem::take(&mut *self.children_of(x));
        for &child in &detached {
            // A child moved elsewhere by a concurrent relink keeps its new parent.
            let _ = self.parent[child].compare_exchange(x, NO_PARENT, Ordering::AcqRel, Ordering::Acquire);
        }
        detached
    }
}
