//! Batched enumeration of the files attached to a job.
//!
//! The handler deletes what it is given, so instead of paging with a moving
//! offset the remaining count is re-measured before every fetch and the page
//! is always taken at offset zero. The deterministic ordering makes that
//! stable as long as handled batches actually disappear.

use std::future::Future;

use harvest_common::sparql::{escape_uri, GraphClient, SparqlError};
use harvest_common::vocab;

use crate::error::CleanupError;

/// A logical file together with its on-disk representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFile {
    pub uri: String,
    pub disk_path: String,
}

/// Consecutive recounts that may fail to shrink before enumeration gives up.
const MAX_STALLED_PASSES: u32 = 3;

/// Feed every file reachable from the job through a task's results or input
/// container to the handler, in batches of at most `batch_size`. Terminates
/// when the re-measured count reaches zero.
pub async fn for_each_file<F, Fut>(
    store: &dyn GraphClient,
    graph: &str,
    job_uri: &str,
    batch_size: u32,
    mut handler: F,
) -> Result<(), CleanupError>
where
    F: FnMut(Vec<JobFile>) -> Fut,
    Fut: Future<Output = Result<(), CleanupError>>,
{
    let mut stalled = 0;
    let mut previous = u64::MAX;

    loop {
        let remaining = count_files(store, graph, job_uri).await?;
        if remaining == 0 {
            return Ok(());
        }
        if remaining >= previous {
            stalled += 1;
            if stalled >= MAX_STALLED_PASSES {
                return Err(CleanupError::NoProgress {
                    job: job_uri.to_owned(),
                    remaining,
                });
            }
        } else {
            stalled = 0;
        }
        previous = remaining;

        tracing::info!("cleaning job {} with {} files left", job_uri, remaining);
        let batch = fetch_batch(store, graph, job_uri, batch_size).await?;
        if !batch.is_empty() {
            handler(batch).await?;
        }
    }
}

async fn count_files(
    store: &dyn GraphClient,
    graph: &str,
    job_uri: &str,
) -> Result<u64, SparqlError> {
    let query = format!(
        "{prefixes}
        SELECT (COUNT(DISTINCT ?file) AS ?files) WHERE {{
          GRAPH {graph} {{
            ?task dct:isPartOf {job} .
            ?task (task:resultsContainer|task:inputContainer) ?container .
            ?container task:hasFile ?file .
          }}
        }}",
        prefixes = vocab::PREFIXES,
        graph = escape_uri(graph),
        job = escape_uri(job_uri),
    );
    let response = store.query(&query).await?;
    match response.bindings().first() {
        Some(binding) => {
            let count = binding.require("files")?;
            count
                .parse::<u64>()
                .map_err(|error| SparqlError::Response(format!("invalid count {count}: {error}")))
        }
        None => Ok(0),
    }
}

async fn fetch_batch(
    store: &dyn GraphClient,
    graph: &str,
    job_uri: &str,
    batch_size: u32,
) -> Result<Vec<JobFile>, SparqlError> {
    // Fixed offset zero: prior batches are expected to be gone by now. The
    // inner ordered subselect keeps the page deterministic.
    let query = format!(
        "{prefixes}
        SELECT ?file ?fileOnDisk WHERE {{
          {{ SELECT DISTINCT ?file ?fileOnDisk WHERE {{
            GRAPH {graph} {{
              ?task dct:isPartOf {job} .
              ?task (task:resultsContainer|task:inputContainer) ?container .
              ?container task:hasFile ?file .
              ?fileOnDisk nie:dataSource ?file .
            }}
          }} ORDER BY ?file ?fileOnDisk }}
        }} LIMIT {batch_size} OFFSET 0",
        prefixes = vocab::PREFIXES,
        graph = escape_uri(graph),
        job = escape_uri(job_uri),
        batch_size = batch_size,
    );
    let response = store.query(&query).await?;
    response
        .bindings()
        .iter()
        .map(|binding| {
            Ok(JobFile {
                uri: binding.require("file")?.to_owned(),
                disk_path: binding.require("fileOnDisk")?.to_owned(),
            })
        })
        .collect()
}
