use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};

use harvest_common::sparql::GraphClient;
use harvest_common::task::{self, DeltaEntry, Task};
use harvest_common::vocab;

use crate::config::Config;
use crate::delete;
use crate::error::CleanupError;
use crate::files;
use crate::retention::RetentionPolicy;
use crate::storage::ShareStorage;

pub struct Cleaner {
    store: Arc<dyn GraphClient>,
    graph: String,
    policy: RetentionPolicy,
    storage: ShareStorage,
    file_batch_size: u32,
    file_delete_concurrency: usize,
}

impl Cleaner {
    pub fn new(store: Arc<dyn GraphClient>, config: &Config) -> Self {
        Cleaner {
            store,
            graph: config.default_graph.clone(),
            policy: RetentionPolicy {
                success_days: config.max_days_to_keep_successful_jobs,
                failed_days: config.max_days_to_keep_failed_jobs,
                busy_days: config.max_days_to_keep_busy_jobs,
                operations: config.operation_allow_list(),
            },
            storage: ShareStorage::new(config.share_folder.clone()),
            file_batch_size: config.file_batch_size,
            file_delete_concurrency: config.file_delete_concurrency.max(1),
        }
    }

    /// One triggered run. Never propagates an error: a delta that resolves
    /// to no cleaning task is a silent no-op, and a failing run is reported
    /// on the tracking task and logged. Work already done stays done; the
    /// next trigger retries the rest, every delete being idempotent.
    pub async fn run(&self, delta: Vec<DeltaEntry>) {
        let store = self.store.as_ref();
        let task = match task::resolve_cleaning_task(store, &self.graph, &delta).await {
            Ok(Some(task)) => task,
            Ok(None) => return,
            Err(error) => {
                tracing::error!("could not resolve tracking task: {}", error);
                return;
            }
        };

        metrics::counter!("cleanup_runs_total").increment(1);
        let started = Instant::now();

        if let Err(error) = self.execute(&task).await {
            tracing::error!("cleanup run for task {} failed: {}", task.uri, error);
            metrics::counter!("cleanup_runs_failed_total").increment(1);
            if let Err(report_error) =
                task::append_task_error(store, &self.graph, &task, &error.to_string()).await
            {
                tracing::error!(
                    "could not append error to task {}: {}",
                    task.uri,
                    report_error
                );
            }
            if let Err(status_error) =
                task::update_task_status(store, &self.graph, &task, vocab::STATUS_FAILED).await
            {
                tracing::error!("could not mark task {} failed: {}", task.uri, status_error);
            }
        }

        metrics::histogram!("cleanup_run_duration_seconds").record(started.elapsed().as_secs_f64());
    }

    async fn execute(&self, task: &Task) -> Result<(), CleanupError> {
        let store = self.store.as_ref();
        task::update_task_status(store, &self.graph, task, vocab::STATUS_BUSY).await?;

        let jobs = self.policy.evaluate(store, &self.graph, Utc::now()).await?;
        tracing::info!("found {} jobs to clean up", jobs.len());

        for job in &jobs {
            self.delete_job_files(&job.uri).await?;
            delete::delete_job(store, &self.graph, &job.uri).await?;
            if let Some(id) = &job.id {
                self.storage.remove_job_directory(id).await;
            }
            metrics::counter!("cleanup_jobs_deleted_total").increment(1);
            tracing::info!("job {} deleted", job.uri);
        }

        task::update_task_status(store, &self.graph, task, vocab::STATUS_SUCCESS).await?;
        Ok(())
    }

    async fn delete_job_files(&self, job_uri: &str) -> Result<(), CleanupError> {
        let concurrency = self.file_delete_concurrency;
        files::for_each_file(
            self.store.as_ref(),
            &self.graph,
            job_uri,
            self.file_batch_size,
            |batch| {
                let store = Arc::clone(&self.store);
                let graph = self.graph.clone();
                let storage = self.storage.clone();
                async move {
                    stream::iter(batch)
                        .map(|file| {
                            let store = Arc::clone(&store);
                            let graph = graph.clone();
                            let storage = storage.clone();
                            async move {
                                delete::delete_physical_and_logical_file(
                                    store.as_ref(),
                                    &graph,
                                    &storage,
                                    &file,
                                )
                                .await?;
                                metrics::counter!("cleanup_files_deleted_total").increment(1);
                                Ok::<(), CleanupError>(())
                            }
                        })
                        .buffer_unordered(concurrency)
                        .try_collect::<Vec<()>>()
                        .await
                        .map(|_| ())
                }
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use harvest_common::sparql::{Binding, Term};
    use harvest_common::task::{DeltaTerm, DeltaTriple};

    use crate::test_support::FakeStore;

    use super::*;

    const GRAPH: &str = "http://mu.semte.ch/graphs/harvesting";

    fn test_config() -> Config {
        Config {
            host: "0.0.0.0".to_owned(),
            port: 8080,
            sparql_endpoint: "http://localhost:8890/sparql".to_owned(),
            default_graph: GRAPH.to_owned(),
            max_days_to_keep_successful_jobs: 30,
            max_days_to_keep_failed_jobs: 7,
            max_days_to_keep_busy_jobs: 7,
            job_operations: String::new(),
            file_batch_size: 5000,
            file_delete_concurrency: 1,
            share_folder: std::env::temp_dir()
                .join(format!("harvest-janitor-cleanup-{}", std::process::id()))
                .to_string_lossy()
                .into_owned(),
        }
    }

    fn scheduling_delta(subject: &str) -> Vec<DeltaEntry> {
        vec![DeltaEntry {
            inserts: vec![DeltaTriple {
                subject: DeltaTerm {
                    value: subject.to_owned(),
                    kind: "uri".to_owned(),
                },
                predicate: DeltaTerm {
                    value: vocab::STATUS_PREDICATE.to_owned(),
                    kind: "uri".to_owned(),
                },
                object: DeltaTerm {
                    value: vocab::STATUS_SCHEDULED.to_owned(),
                    kind: "uri".to_owned(),
                },
            }],
            deletes: vec![],
        }]
    }

    #[tokio::test]
    async fn unrelated_delta_mutates_nothing() {
        let store = Arc::new(FakeStore::new());
        let cleaner = Cleaner::new(store.clone(), &test_config());

        cleaner.run(vec![DeltaEntry::default()]).await;

        assert!(store.recorded_queries().is_empty());
        assert!(store.recorded_updates().is_empty());
    }

    #[tokio::test]
    async fn delta_scheduling_an_unknown_task_mutates_nothing() {
        let store = Arc::new(FakeStore::new());
        // The scheduled subject turns out not to be a cleaning task.
        store.push_empty();
        let cleaner = Cleaner::new(store.clone(), &test_config());

        cleaner
            .run(scheduling_delta("http://example.org/task/other"))
            .await;

        assert_eq!(store.recorded_queries().len(), 1);
        assert!(store.recorded_updates().is_empty());
    }

    #[tokio::test]
    async fn one_failed_job_with_an_absent_file_ends_in_success() {
        let store = Arc::new(FakeStore::new());
        // Resolve the tracking task.
        store.push_bindings(vec![Binding::from_pairs([(
            "id",
            Term::literal("task-id-1"),
        )])]);
        // Retention: no dump job, no successful candidates.
        store.push_empty();
        store.push_empty();
        // One failed job past its window; no busy jobs.
        store.push_bindings(vec![Binding::from_pairs([
            ("job", Term::uri("http://example.org/job/failed")),
            ("id", Term::literal("job-1")),
        ])]);
        store.push_empty();
        // File enumeration: one file, then drained.
        store.push_count("files", 1);
        store.push_bindings(vec![Binding::from_pairs([
            ("file", Term::uri("http://example.org/file/1")),
            ("fileOnDisk", Term::uri("share://job-1/0.ttl")),
        ])]);
        // delete_file: no fan-in on any ownership predicate.
        for _ in 0..4 {
            store.push_boolean(false);
        }
        store.push_count("files", 0);

        let cleaner = Cleaner::new(store.clone(), &test_config());
        cleaner
            .run(scheduling_delta("http://example.org/task/cleaning"))
            .await;

        let updates = store.recorded_updates();
        // busy + file subject + five job statements + success.
        assert_eq!(updates.len(), 8);
        assert!(updates[0].contains(vocab::STATUS_BUSY));
        assert!(updates[1].contains("<http://example.org/file/1> ?p ?o"));
        assert!(updates[7].contains(vocab::STATUS_SUCCESS));
        assert!(updates.iter().all(|update| !update.contains("oslc:Error")));
    }

    #[tokio::test]
    async fn a_failing_run_marks_the_task_failed_with_an_error() {
        let store = Arc::new(FakeStore::new());
        // Resolve the tracking task.
        store.push_bindings(vec![Binding::from_pairs([(
            "id",
            Term::literal("task-id-1"),
        )])]);
        // The dump-date query has no scripted response beyond this point, so
        // evaluation fails after the task went busy.

        let cleaner = Cleaner::new(store.clone(), &test_config());
        cleaner
            .run(scheduling_delta("http://example.org/task/cleaning"))
            .await;

        let updates = store.recorded_updates();
        assert_eq!(updates.len(), 3);
        assert!(updates[0].contains(vocab::STATUS_BUSY));
        assert!(updates[1].contains("oslc:Error"));
        assert!(updates[2].contains(vocab::STATUS_FAILED));
    }
}
