use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashSet;

use crate::error::ForestError;
use crate::forest::{DynamicForest, NO_PARENT};

const NIL: usize = usize::MAX;

/// Link-cut tree (Sleator & Tarjan) over dense vertex indices.
///
/// Every preferred path of the represented forest is kept in a splay tree
/// ordered by depth: the left subtree holds deeper vertices, the right
/// subtree holds shallower ones. The `up` pointer of a splay root doubles as
/// the path-parent pointer. `link`, `cut` and `root` cost amortized O(log n),
/// which keeps the search fast on inputs where contraction builds very long
/// chains below one root.
///
/// Splaying mutates the structure even on queries, so the splay arena lives
/// behind one mutex. Plain parent pointers are mirrored into atomics so that
/// `is_root` and `parent` can be answered without it. Every other operation
/// of every worker contends on that mutex, even when the vertex locks held by
/// the callers already keep their trees apart.
pub struct LinkCutForest {
    parent: Vec<AtomicUsize>,
    inner: Mutex<SplayForest>,
}

#[derive(Clone, Copy)]
struct SplayNode {
    left: usize,
    right: usize,
    up: usize,
}

struct SplayForest {
    nodes: Vec<SplayNode>,
    /// Direct children in the represented forest. Splay trees only know
    /// about the preferred child, so the full set is kept on the side.
    children: Vec<FxHashSet<usize>>,
}

impl SplayForest {
    fn new(n: usize) -> Self {
        SplayForest {
            nodes: vec![SplayNode { left: NIL, right: NIL, up: NIL }; n],
            children: vec![FxHashSet::default(); n],
        }
    }

    fn is_splay_root(&self, x: usize) -> bool {
        let up = self.nodes[x].up;
        up == NIL || (self.nodes[up].left != x && self.nodes[up].right != x)
    }

    fn rotate(&mut self, x: usize) {
        let p = self.nodes[x].up;
        let g = self.nodes[p].up;
        let p_was_splay_root = self.is_splay_root(p);

        if self.nodes[p].left == x {
            let b = self.nodes[x].right;
            self.nodes[p].left = b;
            if b != NIL {
                self.nodes[b].up = p;
            }
            self.nodes[x].right = p;
        } else {
            let b = self.nodes[x].left;
            self.nodes[p].right = b;
            if b != NIL {
                self.nodes[b].up = p;
            }
            self.nodes[x].left = p;
        }
        self.nodes[p].up = x;
        self.nodes[x].up = g;

        // The path-parent pointer of p moves to x untouched.
        if !p_was_splay_root {
            if self.nodes[g].left == p {
                self.nodes[g].left = x;
            } else {
                self.nodes[g].right = x;
            }
        }
    }

    fn splay(&mut self, x: usize) {
        while !self.is_splay_root(x) {
            let p = self.nodes[x].up;
            if !self.is_splay_root(p) {
                let g = self.nodes[p].up;
                let zig_zig = (self.nodes[g].left == p) == (self.nodes[p].left == x);
                if zig_zig {
                    self.rotate(p);
                } else {
                    self.rotate(x);
                }
            }
            self.rotate(x);
        }
    }

    /// Makes the path from `x` to its root preferred and splays `x` to the top.
    /// Afterwards `x` has no left subtree and its right subtree holds exactly
    /// its ancestors.
    fn expose(&mut self, x: usize) {
        let mut last = NIL;
        let mut y = x;
        while y != NIL {
            self.splay(y);
            self.nodes[y].left = last;
            last = y;
            y = self.nodes[y].up;
        }
        self.splay(x);
    }

    fn find_root(&mut self, x: usize) -> usize {
        self.expose(x);
        let mut r = x;
        while self.nodes[r].right != NIL {
            r = self.nodes[r].right;
        }
        self.splay(r);
        r
    }

    /// Attaches the root `child` below `parent`. The caller has checked the
    /// preconditions.
    fn attach(&mut self, child: usize, parent: usize) {
        self.expose(child);
        debug_assert_eq!(self.nodes[child].right, NIL);
        self.nodes[child].up = parent;
        self.children[parent].insert(child);
    }

    /// Detaches `x` from `parent`.
    fn detach(&mut self, x: usize, parent: usize) {
        self.expose(x);
        let r = self.nodes[x].right;
        if r != NIL {
            self.nodes[r].up = NIL;
            self.nodes[x].right = NIL;
        }
        self.children[parent].remove(&x);
    }
}

impl LinkCutForest {
    pub fn new(n: usize) -> Self {
        LinkCutForest {
            parent: (0..n).map(|_| AtomicUsize::new(NO_PARENT)).collect(),
            inner: Mutex::new(SplayForest::new(n)),
        }
    }

    fn inner(&self) -> MutexGuard<'_, SplayForest> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DynamicForest for LinkCutForest {
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
        let mut inner = self.inner();
        if let Some(existing) = self.parent(child) {
            return Err(ForestError::NotARoot { child, parent: existing });
        }
        if inner.find_root(parent) == child {
            return Err(ForestError::WouldCycle { child, parent });
        }
        inner.attach(child, parent);
        self.parent[child].store(parent, Ordering::Release);
        Ok(())
    }

    fn cut(&self, x: usize) {
        let mut inner = self.inner();
        if let Some(parent) = self.parent(x) {
            inner.detach(x, parent);
            self.parent[x].store(NO_PARENT, Ordering::Release);
        }
    }

    fn relink(&self, child: usize, parent: usize) -> Result<(), ForestError> {
        if child == parent {
            return Err(ForestError::SelfLink(child));
        }
        let mut inner = self.inner();
        let old = self.parent(child);
        if let Some(old) = old {
            inner.detach(child, old);
        }
        if inner.find_root(parent) == child {
            // Undo the detach so a refused relink leaves the forest unchanged.
            if let Some(old) = old {
                inner.attach(child, old);
            }
            return Err(ForestError::WouldCycle { child, parent });
        }
        inner.attach(child, parent);
        // The atomic mirror never passes through NO_PARENT.
        self.parent[child].store(parent, Ordering::Release);
        Ok(())
    }

    fn root(&self, x: usize) -> usize {
        self.inner().find_root(x)
    }

    fn children(&self, x: usize) -> Vec<usize> {
        self.inner().children[x].iter().copied().collect()
    }

    fn detach_children(&self, x: usize) -> Vec<usize> {
        let mut inner = self.inner();
        let detached: Vec<usize> = inner.children[x].iter().copied().collect();
        for &child in &detached {
            inner.detach(child, x);
            self.parent[child].store(NO_PARENT, Ordering::Release);
        }
        detached
    }
}

#[cfg(test)]
mod test_link_cut {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::forest::link_cut::LinkCutForest;
    use crate::forest::naive::NaiveForest;
    use crate::forest::DynamicForest;

    /// Workers building disjoint chains share the forest without interfering.
    #[test]
    fn test_concurrent_disjoint_chains() {
        let (threads, len) = (4, 2_000);
        let forest = LinkCutForest::new(threads * len);
        std::thread::scope(|scope| {
            for t in 0..threads {
                let forest = &forest;
                scope.spawn(move || {
                    let base = t * len;
                    for x in base..base + len - 1 {
                        forest.link(x, x + 1).unwrap();
                        assert_eq!(forest.root(base), x + 1);
                    }
                    forest.cut(base + len / 2);
                });
            }
        });
        for t in 0..threads {
            let base = t * len;
            assert_eq!(forest.root(base), base + len / 2);
            assert_eq!(forest.root(base + len / 2 + 1), base + len - 1);
            assert_eq!(forest.children(base + 1), vec![base]);
        }
    }

    #[test]
    fn test_deep_chain() {
        let n = 50_000;
        let forest = LinkCutForest::new(n);
        for x in 0..n - 1 {
            forest.link(x, x + 1).unwrap();
        }
        for x in (0..n).step_by(997) {
            assert_eq!(forest.root(x), n - 1);
        }
        forest.cut(n / 2);
        assert_eq!(forest.root(0), n / 2);
        assert_eq!(forest.root(n - 2), n - 1);
    }

    /// Random link/cut/relink sequences must agree with the naive backing.
    #[test]
    fn test_agrees_with_naive() {
        let n = 64;
        let mut rng = StdRng::seed_from_u64(7);
        let lct = LinkCutForest::new(n);
        let naive = NaiveForest::new(n);

        for _ in 0..20_000 {
            let a = rng.gen_range(0..n);
            let b = rng.gen_range(0..n);
            match rng.gen_range(0..4) {
                0 | 1 => assert_eq!(lct.link(a, b), naive.link(a, b)),
                2 => {
                    lct.cut(a);
                    naive.cut(a);
                }
                _ => assert_eq!(lct.relink(a, b), naive.relink(a, b)),
            }
            let x = rng.gen_range(0..n);
            assert_eq!(lct.root(x), naive.root(x));
            assert_eq!(lct.parent(x), naive.parent(x));
        }

        for x in 0..n {
            let mut left = lct.children(x);
            let mut right = naive.children(x);
            left.sort_unstable();
            right.sort_unstable();
            assert_eq!(left, right);
        }
    }
}
