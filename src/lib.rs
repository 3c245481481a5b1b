pub mod algorithms;
pub mod config;
pub mod error;
pub mod forest;
pub mod graph;

pub use algorithms::liveness::{AcceptAll, LivenessCheck};
pub use algorithms::scc::{ConcurrentFastScc, SccPartition, SccSearch};
pub use algorithms::sequential::SequentialFastScc;
pub use config::{ForestKind, SccConfig};
pub use error::{ForestError, Result, SccError};
pub use graph::{Graph, GraphBuilder};
