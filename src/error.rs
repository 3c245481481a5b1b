use thiserror::Error;

use crate::graph::node::Visited;

/// Faults raised by a [`DynamicForest`](crate::forest::DynamicForest).
///
/// Each of them means a caller broke the locking discipline; none is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForestError {
    /// `link` was asked to attach a vertex that still has a parent.
    #[error("Non-root link: vertex {child} already has parent {parent}")]
    NotARoot { child: usize, parent: usize },
    /// `link` was asked to attach a vertex below itself.
    #[error("Trying to link identical nodes: {0}")]
    SelfLink(usize),
    /// `link` would close a cycle in the forest.
    #[error("Linking {child} below {parent} would close a cycle")]
    WouldCycle { child: usize, parent: usize },
}

/// Errors of the SCC engine and of its ingestion collaborators.
#[derive(Error, Debug)]
pub enum SccError {
    #[error("Forest protocol fault: {0}")]
    Forest(#[from] ForestError),

    /// The visited state of a vertex was asked to move backwards.
    #[error("Illegal visited transition of vertex {vertex}: {from:?} -> {to:?}")]
    IllegalTransition { vertex: u64, from: Visited, to: Visited },

    #[error("Unknown vertex {0}")]
    UnknownVertex(u64),

    /// The liveness predicate rejected a freshly contracted component.
    #[error("SCC violates liveness: representative {representative}, members {members:?}")]
    LivenessViolation { representative: u64, members: Vec<u64> },

    #[error("Post-condition violated: {0}")]
    PostCondition(String),

    #[error("Failed to build the worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Malformed input at line {line}: {content:?}")]
    Parse { line: usize, content: String },

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, SccError>;
