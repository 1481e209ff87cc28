//! Cascading delete of jobs, tasks, containers and files. Every statement
//! here is a no-op on an already-cleaned subject, so any step can be retried
//! after a partial failure.

use harvest_common::sparql::{escape_uri, GraphClient, SparqlError};
use harvest_common::vocab;

use crate::error::CleanupError;
use crate::files::JobFile;
use crate::storage::ShareStorage;

/// Batch size when draining incoming relations; keeps single delete
/// statements bounded under large fan-in.
const DRAIN_BATCH: u32 = 1000;

/// Remove a file from disk and from the graph. A missing physical file is
/// fine; any other physical failure is recorded but does not stop the
/// logical delete. When either side fails, the error describes both.
pub async fn delete_physical_and_logical_file(
    store: &dyn GraphClient,
    graph: &str,
    storage: &ShareStorage,
    file: &JobFile,
) -> Result<(), CleanupError> {
    let physical = storage.remove_file(&file.disk_path).await;
    if let Err(error) = &physical {
        tracing::error!("could not remove {} from disk: {}", file.disk_path, error);
    }
    let logical = delete_file(store, graph, &file.uri).await;

    if physical.is_ok() && logical.is_ok() {
        return Ok(());
    }
    Err(CleanupError::FileCleanup {
        uri: file.uri.clone(),
        physical: outcome(physical),
        logical: outcome(logical),
    })
}

fn outcome<E: std::fmt::Display>(result: Result<(), E>) -> String {
    match result {
        Ok(()) => "ok".to_owned(),
        Err(error) => error.to_string(),
    }
}

/// Remove a logical file node. Relations held by other nodes (task file
/// lists, disk representations, copies, part-of trees) are drained first in
/// bounded batches; only then are the file's own triples deleted.
pub async fn delete_file(
    store: &dyn GraphClient,
    graph: &str,
    file_uri: &str,
) -> Result<(), SparqlError> {
    for predicate in vocab::FILE_OWNERSHIP_PREDICATES {
        drain_incoming(store, graph, predicate, file_uri).await?;
    }
    let update = format!(
        "DELETE WHERE {{ GRAPH {graph} {{ {file} ?p ?o . }} }}",
        graph = escape_uri(graph),
        file = escape_uri(file_uri),
    );
    store.update(&update).await
}

async fn has_incoming(
    store: &dyn GraphClient,
    graph: &str,
    predicate: &str,
    target: &str,
) -> Result<bool, SparqlError> {
    let query = format!(
        "ASK WHERE {{ GRAPH {graph} {{ ?s {predicate} {target} ; ?p ?o . }} }}",
        graph = escape_uri(graph),
        predicate = escape_uri(predicate),
        target = escape_uri(target),
    );
    Ok(store.query(&query).await?.is_true())
}

async fn drain_incoming(
    store: &dyn GraphClient,
    graph: &str,
    predicate: &str,
    target: &str,
) -> Result<(), SparqlError> {
    while has_incoming(store, graph, predicate, target).await? {
        let update = format!(
            "DELETE WHERE {{ GRAPH {graph} {{ ?s {predicate} {target} ; ?p ?o . }} }} LIMIT {batch}",
            graph = escape_uri(graph),
            predicate = escape_uri(predicate),
            target = escape_uri(target),
            batch = DRAIN_BATCH,
        );
        store.update(&update).await?;
    }
    Ok(())
}

/// Remove a job's graph structure in two independently retryable phases:
/// first the task subtree (containers, relations pointing at each task, the
/// tasks' own relations), then the job node itself.
pub async fn delete_job(
    store: &dyn GraphClient,
    graph: &str,
    job_uri: &str,
) -> Result<(), SparqlError> {
    let graph = escape_uri(graph);
    let job = escape_uri(job_uri);
    let prefixes = vocab::PREFIXES;

    let statements = [
        // Phase 1: the job's tasks and their containers.
        format!(
            "{prefixes}
            DELETE {{ GRAPH {graph} {{ ?container ?p ?o . }} }}
            WHERE {{
              GRAPH {graph} {{
                ?task dct:isPartOf {job} .
                ?task (task:resultsContainer|task:inputContainer) ?container .
                ?container ?p ?o .
              }}
            }}"
        ),
        format!(
            "{prefixes}
            DELETE {{ GRAPH {graph} {{ ?s ?q ?task . }} }}
            WHERE {{
              GRAPH {graph} {{
                ?task dct:isPartOf {job} .
                ?s ?q ?task .
              }}
            }}"
        ),
        format!(
            "{prefixes}
            DELETE {{ GRAPH {graph} {{ ?task ?p ?o . }} }}
            WHERE {{
              GRAPH {graph} {{
                ?task dct:isPartOf {job} .
                ?task ?p ?o .
              }}
            }}"
        ),
        // Phase 2: the job node.
        format!("DELETE WHERE {{ GRAPH {graph} {{ {job} ?p ?o . }} }}"),
        format!("DELETE WHERE {{ GRAPH {graph} {{ ?s ?p {job} . }} }}"),
    ];

    for statement in &statements {
        store.update(statement).await?;
    }
    Ok(())
}
