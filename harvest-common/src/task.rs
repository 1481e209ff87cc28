//! Tracking-task handling: resolving the task that triggered a cleanup run
//! from a delta payload, and reporting progress back onto it.

use chrono::Utc;
use serde_derive::Deserialize;
use uuid::Uuid;

use crate::sparql::{escape_datetime, escape_string, escape_uri, GraphClient, SparqlError};
use crate::vocab;

#[derive(Debug, Clone, Deserialize)]
pub struct DeltaTerm {
    pub value: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeltaTriple {
    pub subject: DeltaTerm,
    pub predicate: DeltaTerm,
    pub object: DeltaTerm,
}

/// One entry of the delta callback body posted by the delta notifier.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeltaEntry {
    #[serde(default)]
    pub inserts: Vec<DeltaTriple>,
    #[serde(default)]
    pub deletes: Vec<DeltaTriple>,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub uri: String,
    pub id: String,
}

/// Subjects that were just moved to the scheduled status, in insertion order.
pub fn scheduled_subjects(delta: &[DeltaEntry]) -> Vec<&str> {
    delta
        .iter()
        .flat_map(|entry| entry.inserts.iter())
        .filter(|triple| {
            triple.predicate.value == vocab::STATUS_PREDICATE
                && triple.object.value == vocab::STATUS_SCHEDULED
        })
        .map(|triple| triple.subject.value.as_str())
        .collect()
}

/// Resolve the cleaning task that triggered this delta, if any. A delta that
/// does not schedule a cleaning task resolves to `None` and the run is a
/// no-op; no query is issued when the delta carries no scheduled subject.
pub async fn resolve_cleaning_task(
    store: &dyn GraphClient,
    graph: &str,
    delta: &[DeltaEntry],
) -> Result<Option<Task>, SparqlError> {
    for subject in scheduled_subjects(delta) {
        let query = format!(
            "{prefixes}
            SELECT ?id WHERE {{
              GRAPH {graph} {{
                {subject} a task:Task ;
                  mu:uuid ?id ;
                  task:operation {operation} ;
                  adms:status {scheduled} .
              }}
            }} LIMIT 1",
            prefixes = vocab::PREFIXES,
            graph = escape_uri(graph),
            subject = escape_uri(subject),
            operation = escape_uri(vocab::TASK_HARVESTING_CLEANING),
            scheduled = escape_uri(vocab::STATUS_SCHEDULED),
        );
        let response = store.query(&query).await?;
        if let Some(binding) = response.bindings().first() {
            let id = binding.require("id")?;
            return Ok(Some(Task {
                uri: subject.to_owned(),
                id: id.to_owned(),
            }));
        }
    }
    Ok(None)
}

pub async fn update_task_status(
    store: &dyn GraphClient,
    graph: &str,
    task: &Task,
    status: &str,
) -> Result<(), SparqlError> {
    let update = format!(
        "{prefixes}
        DELETE {{
          GRAPH {graph} {{ {task} adms:status ?status ; dct:modified ?modified . }}
        }}
        INSERT {{
          GRAPH {graph} {{ {task} adms:status {status_uri} ; dct:modified {now} . }}
        }}
        WHERE {{
          GRAPH {graph} {{
            {task} adms:status ?status .
            OPTIONAL {{ {task} dct:modified ?modified . }}
          }}
        }}",
        prefixes = vocab::PREFIXES,
        graph = escape_uri(graph),
        task = escape_uri(&task.uri),
        status_uri = escape_uri(status),
        now = escape_datetime(&Utc::now()),
    );
    store.update(&update).await
}

/// Mint an error node and hang it off the task, so operators can see why a
/// run ended up failed.
pub async fn append_task_error(
    store: &dyn GraphClient,
    graph: &str,
    task: &Task,
    message: &str,
) -> Result<(), SparqlError> {
    let id = Uuid::new_v4().to_string();
    let error_uri = format!("{}{}", vocab::ERROR_URI_PREFIX, id);
    let update = format!(
        "{prefixes}
        INSERT DATA {{
          GRAPH {graph} {{
            {error} a oslc:Error ;
              mu:uuid {id} ;
              oslc:message {message} .
            {task} task:error {error} .
          }}
        }}",
        prefixes = vocab::PREFIXES,
        graph = escape_uri(graph),
        error = escape_uri(&error_uri),
        id = escape_string(&id),
        message = escape_string(message),
        task = escape_uri(&task.uri),
    );
    store.update(&update).await
}
