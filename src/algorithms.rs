pub mod liveness;
pub mod scc;
pub mod scc_worker;
pub mod sequential;
