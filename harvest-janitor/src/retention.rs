//! Retention policy evaluation: which jobs are past their keep window.
//!
//! Failed and busy jobs age out after a fixed number of days. Successful
//! jobs are grouped by the source they harvested; the most recent job per
//! source is always kept, older siblings age out. Successful jobs newer than
//! the last completed dump are kept unconditionally, since the dump is the
//! recovery point for everything harvested before it.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use url::Url;

use harvest_common::sparql::{escape_datetime, escape_uri, GraphClient, SparqlError};
use harvest_common::vocab;

/// A job selected for deletion. The uuid, when bound, locates the job's
/// working directory on the share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRef {
    pub uri: String,
    pub id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub success_days: u32,
    pub failed_days: u32,
    pub busy_days: u32,
    /// Job operation allow-list for the failed/busy selections; empty means
    /// every operation qualifies.
    pub operations: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct SuccessfulJob {
    pub job: JobRef,
    pub modified: DateTime<Utc>,
}

impl RetentionPolicy {
    /// All jobs eligible for deletion at `now`. Statuses are exclusive, so
    /// the three selections cannot overlap.
    pub async fn evaluate(
        &self,
        store: &dyn GraphClient,
        graph: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobRef>, SparqlError> {
        let mut jobs = self.successful_deletable(store, graph, now).await?;
        jobs.extend(
            self.jobs_with_status_before(
                store,
                graph,
                vocab::STATUS_FAILED,
                now - Duration::days(self.failed_days.into()),
            )
            .await?,
        );
        jobs.extend(
            self.jobs_with_status_before(
                store,
                graph,
                vocab::STATUS_BUSY,
                now - Duration::days(self.busy_days.into()),
            )
            .await?,
        );
        Ok(jobs)
    }

    async fn jobs_with_status_before(
        &self,
        store: &dyn GraphClient,
        graph: &str,
        status: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JobRef>, SparqlError> {
        let operations = if self.operations.is_empty() {
            String::new()
        } else {
            format!(
                "?job task:operation ?operation . VALUES ?operation {{ {} }}",
                self.operations
                    .iter()
                    .map(|operation| escape_uri(operation))
                    .collect::<Vec<_>>()
                    .join(" ")
            )
        };
        let query = format!(
            "{prefixes}
            SELECT DISTINCT ?job ?id WHERE {{
              GRAPH {graph} {{
                ?job a ?type ;
                  adms:status {status} ;
                  dct:modified ?modified .
                OPTIONAL {{ ?job mu:uuid ?id . }}
                {operations}
                FILTER (?modified < {cutoff} && ?type IN (cogs:Job, cogs:ScheduledJob))
              }}
            }}",
            prefixes = vocab::PREFIXES,
            graph = escape_uri(graph),
            status = escape_uri(status),
            operations = operations,
            cutoff = escape_datetime(&cutoff),
        );
        let response = store.query(&query).await?;
        response
            .bindings()
            .iter()
            .map(|binding| {
                Ok(JobRef {
                    uri: binding.require("job")?.to_owned(),
                    id: binding.value("id").map(str::to_owned),
                })
            })
            .collect()
    }

    /// Successful jobs past their window, deduplicated per harvested source.
    pub async fn successful_deletable(
        &self,
        store: &dyn GraphClient,
        graph: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobRef>, SparqlError> {
        let last_dump = last_dump_file_job_date(store, graph).await?;
        let cutoff = now - Duration::days(self.success_days.into());

        let query = format!(
            "{prefixes}
            SELECT DISTINCT ?job ?id ?modified ?container WHERE {{
              GRAPH {graph} {{
                ?job a ?type ;
                  adms:status {success} ;
                  dct:modified ?modified .
                OPTIONAL {{ ?job mu:uuid ?id . }}
                ?task dct:isPartOf ?job ;
                  task:operation {collecting} ;
                  adms:status {success} ;
                  task:resultsContainer ?container .
                FILTER (?type IN (cogs:Job, cogs:ScheduledJob))
              }}
            }}",
            prefixes = vocab::PREFIXES,
            graph = escape_uri(graph),
            success = escape_uri(vocab::STATUS_SUCCESS),
            collecting = escape_uri(vocab::TASK_COLLECTING),
        );
        let response = store.query(&query).await?;

        let mut groups: HashMap<String, Vec<SuccessfulJob>> = HashMap::new();
        for binding in response.bindings() {
            let job = binding.require("job")?.to_owned();
            let modified = parse_datetime(binding.require("modified")?)?;
            if modified > last_dump {
                tracing::debug!("keeping {}: modified after the last dump", job);
                continue;
            }
            let container = binding.require("container")?.to_owned();
            // A job whose origin cannot be resolved is kept; losing data is
            // worse than keeping a stale harvest around.
            let Some(key) = source_key_for_container(store, graph, &container).await? else {
                continue;
            };
            groups.entry(key).or_default().push(SuccessfulJob {
                job: JobRef {
                    uri: job,
                    id: binding.value("id").map(str::to_owned),
                },
                modified,
            });
        }

        Ok(partition_deletable(groups, cutoff))
    }
}

/// Everything in a group except its most recent member, filtered down to the
/// members past the cutoff. A singleton group yields nothing.
pub(crate) fn partition_deletable(
    groups: HashMap<String, Vec<SuccessfulJob>>,
    cutoff: DateTime<Utc>,
) -> Vec<JobRef> {
    let mut deletable = Vec::new();
    for (source, mut jobs) in groups {
        jobs.sort_by_key(|job| job.modified);
        let Some(most_recent) = jobs.pop() else {
            continue;
        };
        tracing::debug!(
            "keeping {} as the most recent harvest of {}",
            most_recent.job.uri,
            source
        );
        for job in jobs {
            if job.modified < cutoff {
                deletable.push(job.job);
            }
        }
    }
    deletable
}

/// The `dct:modified` of the most recent successful dump job, or the epoch
/// when none exists yet (keep everything).
pub async fn last_dump_file_job_date(
    store: &dyn GraphClient,
    graph: &str,
) -> Result<DateTime<Utc>, SparqlError> {
    let operations = vocab::DUMP_OPERATIONS
        .iter()
        .map(|operation| escape_uri(operation))
        .collect::<Vec<_>>()
        .join(" ");
    let query = format!(
        "{prefixes}
        SELECT ?modified WHERE {{
          GRAPH {graph} {{
            VALUES ?operation {{ {operations} }}
            ?job a ?type ;
              adms:status {success} ;
              task:operation ?operation ;
              dct:modified ?modified .
            FILTER (?type IN (cogs:Job, cogs:ScheduledJob))
          }}
        }} ORDER BY DESC(?modified) LIMIT 1",
        prefixes = vocab::PREFIXES,
        graph = escape_uri(graph),
        operations = operations,
        success = escape_uri(vocab::STATUS_SUCCESS),
    );
    let response = store.query(&query).await?;
    match response.bindings().first() {
        Some(binding) => parse_datetime(binding.require("modified")?),
        None => Ok(DateTime::<Utc>::UNIX_EPOCH),
    }
}

async fn source_key_for_container(
    store: &dyn GraphClient,
    graph: &str,
    container: &str,
) -> Result<Option<String>, SparqlError> {
    let query = format!(
        "{prefixes}
        SELECT ?url WHERE {{
          GRAPH {graph} {{
            {container} task:hasFile ?file .
            ?file dct:created ?created ;
              nie:url ?url .
          }}
        }} ORDER BY ?created LIMIT 1",
        prefixes = vocab::PREFIXES,
        graph = escape_uri(graph),
        container = escape_uri(container),
    );
    let response = store.query(&query).await?;
    match response.bindings().first() {
        Some(binding) => Ok(source_key(binding.require("url")?)),
        None => Ok(None),
    }
}

/// Reduce an origin URL to scheme+host: harvests of the same source differ
/// only in path or query parameters.
pub(crate) fn source_key(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    url.set_path("");
    url.set_query(None);
    Some(url.to_string())
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>, SparqlError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| SparqlError::Response(format!("invalid dateTime literal {value}: {error}")))
}

#[cfg(test)]
mod tests {
    use harvest_common::sparql::{Binding, Term};

    use crate::test_support::FakeStore;

    use super::*;

    fn job(uri: &str, days_old: i64, now: DateTime<Utc>) -> SuccessfulJob {
        SuccessfulJob {
            job: JobRef {
                uri: uri.to_owned(),
                id: None,
            },
            modified: now - Duration::days(days_old),
        }
    }

    #[test]
    fn source_keys_strip_path_and_query() {
        assert_eq!(
            source_key("https://sources.example.org:8443/harvest/run?id=4"),
            Some("https://sources.example.org:8443/".to_owned())
        );
        assert_eq!(
            source_key("http://sources.example.org/a"),
            source_key("http://sources.example.org/b?c=d")
        );
        assert_eq!(source_key("not a url"), None);
    }

    #[test]
    fn most_recent_job_per_source_is_kept() {
        let now = Utc::now();
        let cutoff = now - Duration::days(30);
        let mut groups = HashMap::new();
        groups.insert(
            "http://sources.example.org/".to_owned(),
            vec![
                job("http://example.org/job/old", 40, now),
                job("http://example.org/job/recent", 10, now),
            ],
        );

        let deletable = partition_deletable(groups, cutoff);
        assert_eq!(
            deletable,
            vec![JobRef {
                uri: "http://example.org/job/old".to_owned(),
                id: None
            }]
        );
    }

    #[test]
    fn most_recent_job_is_kept_even_when_past_the_cutoff() {
        let now = Utc::now();
        let cutoff = now - Duration::days(30);
        let mut groups = HashMap::new();
        groups.insert(
            "http://sources.example.org/".to_owned(),
            vec![
                job("http://example.org/job/older", 50, now),
                job("http://example.org/job/old", 40, now),
            ],
        );

        let deletable = partition_deletable(groups, cutoff);
        assert_eq!(deletable.len(), 1);
        assert_eq!(deletable[0].uri, "http://example.org/job/older");
    }

    #[test]
    fn jobs_inside_the_window_are_retained() {
        let now = Utc::now();
        let cutoff = now - Duration::days(30);
        let mut groups = HashMap::new();
        groups.insert(
            "http://sources.example.org/".to_owned(),
            vec![
                job("http://example.org/job/a", 20, now),
                job("http://example.org/job/b", 10, now),
            ],
        );

        assert!(partition_deletable(groups, cutoff).is_empty());
    }

    #[test]
    fn singleton_groups_yield_no_deletions() {
        let now = Utc::now();
        let mut groups = HashMap::new();
        groups.insert(
            "http://sources.example.org/".to_owned(),
            vec![job("http://example.org/job/only", 400, now)],
        );

        assert!(partition_deletable(groups, now - Duration::days(30)).is_empty());
    }

    #[tokio::test]
    async fn evaluate_unions_the_status_selections() {
        let store = FakeStore::new();
        // Successful path: no dump job yet, no successful candidates.
        store.push_empty();
        store.push_empty();
        // One failed job past its window.
        store.push_bindings(vec![Binding::from_pairs([
            ("job", Term::uri("http://example.org/job/failed")),
            ("id", Term::literal("job-failed-id")),
        ])]);
        // No busy jobs.
        store.push_empty();

        let policy = RetentionPolicy {
            success_days: 30,
            failed_days: 7,
            busy_days: 7,
            operations: vec![],
        };
        let jobs = policy
            .evaluate(&store, "http://mu.semte.ch/graphs/harvesting", Utc::now())
            .await
            .unwrap();

        assert_eq!(
            jobs,
            vec![JobRef {
                uri: "http://example.org/job/failed".to_owned(),
                id: Some("job-failed-id".to_owned()),
            }]
        );
    }

    #[tokio::test]
    async fn operation_allow_list_constrains_the_query() {
        let store = FakeStore::new();
        store.push_empty();
        store.push_empty();
        store.push_empty();
        store.push_empty();

        let policy = RetentionPolicy {
            success_days: 30,
            failed_days: 7,
            busy_days: 7,
            operations: vec!["http://example.org/operations/harvest".to_owned()],
        };
        policy
            .evaluate(&store, "http://mu.semte.ch/graphs/harvesting", Utc::now())
            .await
            .unwrap();

        let queries = store.recorded_queries();
        let failed_query = &queries[2];
        assert!(failed_query.contains("VALUES ?operation"));
        assert!(failed_query.contains("<http://example.org/operations/harvest>"));
    }
}
