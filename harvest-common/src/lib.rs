pub mod metrics;
pub mod retry;
pub mod sparql;
pub mod task;
pub mod vocab;
