use harvest_common::sparql::SparqlError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CleanupError {
    #[error(transparent)]
    Store(#[from] SparqlError),

    /// The re-measured file count stopped shrinking between batches. Raised
    /// instead of looping forever; the next triggered run retries from scratch.
    #[error("no progress cleaning files of {job}: {remaining} files still reachable")]
    NoProgress { job: String, remaining: u64 },

    /// Physical and/or logical removal of a file failed. Both outcomes are
    /// carried so a retry can tell what is still outstanding.
    #[error("cleanup of file {uri} incomplete; physical delete: {physical}; logical delete: {logical}")]
    FileCleanup {
        uri: String,
        physical: String,
        logical: String,
    },
}
