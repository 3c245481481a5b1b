/// Liveness predicate evaluated on every freshly contracted component.
///
/// `representative` is the original id of the surviving vertex and `members`
/// the original ids merged into it so far, the representative included.
/// Returning `false` reports a liveness violation, which aborts the whole
/// search with [`SccError::LivenessViolation`](crate::error::SccError::LivenessViolation).
///
/// The check runs while the worker holds the locks of the contracted path,
/// so implementations should be quick and must not block.
pub trait LivenessCheck: Send + Sync {
    fn check(&self, representative: u64, members: &[u64]) -> bool;
}

/// Accepts every component. The default when no domain property is checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl LivenessCheck for AcceptAll {
    fn check(&self, _representative: u64, _members: &[u64]) -> bool {
        true
    }
}

impl<F> LivenessCheck for F
where
    F: Fn(u64, &[u64]) -> bool + Send + Sync,
{
    fn check(&self, representative: u64, members: &[u64]) -> bool {
        self(representative, members)
    }
}

#[cfg(test)]
mod test_liveness {
    use crate::algorithms::liveness::{AcceptAll, LivenessCheck};

    #[test]
    fn test_closure_predicate() {
        let no_large_cycles = |_rep: u64, members: &[u64]| members.len() < 3;
        assert!(no_large_cycles.check(1, &[1, 2]));
        assert!(!no_large_cycles.check(1, &[1, 2, 3]));
        assert!(AcceptAll.check(0, &[0, 1, 2, 3]));
    }
}
