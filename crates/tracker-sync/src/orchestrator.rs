//! The sync orchestrator: scroll producer, bounded worker pool,
//! per-task transactional write sequence, sync-run bookkeeping, cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tracing::{error, info, warn};
use tracker_history::reconstruct;
use tracker_http::{RemoteTask, TrackerHttpClient, MAX_BATCH_SIZE};
use tracker_model::RunCounters;
use tracker_storage::{RunOutcomeCounters, TrackerStorage};
use uuid::Uuid;

use crate::error::SyncError;
use crate::mapping::map_task;

/// Input parameters for one sync invocation.
#[derive(Debug, Clone)]
pub struct SyncInput {
    pub filter: String,
    pub limit: Option<usize>,
    pub skip_history: bool,
    /// No-op relative to the default (history is always replaced unless
    /// `skip_history`); kept so callers can express explicit intent in logs.
    pub force_full_history: bool,
}

/// How a sync run ended, distinct from per-task failures which are folded
/// into `errors_count` on an otherwise-successful run.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    /// The run could not meet its minimum guarantee (e.g. the producer's
    /// scroll search failed unrecoverably). Carries the short reason stored
    /// as `error_message`.
    Failed(String),
}

/// Result of one `SyncOrchestrator::run` call: the finalized outcome plus
/// the counters recorded on the `SyncRunLog` row.
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub counters: RunOutcomeCounters,
}

/// Drives one sync invocation against the remote tracker and the
/// persistence layer.
pub struct SyncOrchestrator<'a> {
    client: &'a TrackerHttpClient,
    storage: &'a dyn TrackerStorage,
    max_workers: usize,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(client: &'a TrackerHttpClient, storage: &'a dyn TrackerStorage, max_workers: usize) -> Self {
        Self {
            client,
            storage,
            max_workers: max_workers.max(1),
        }
    }

    /// Runs one sync invocation end to end. Acquiring the single-instance
    /// lock is the caller's responsibility — see `tracker-cli`'s `sync`
    /// command — since that happens before any `SyncRunLog` row can be
    /// created and this type's lifetime only spans "work has a log row".
    pub async fn run(&self, input: SyncInput) -> Result<SyncResult, SyncError> {
        let run_id = self.storage.start_run().await?;
        info!(%run_id, filter = %input.filter, limit = ?input.limit, "sync run started");

        if input.force_full_history {
            info!(%run_id, "force_full_history set explicitly (no-op relative to default)");
        }

        let counters = Arc::new(Mutex::new(RunCounters::default()));
        let cancelled = Arc::new(AtomicBool::new(false));
        let producer_failed: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        self.spawn_cancellation_watcher(cancelled.clone());

        let search_stream = self.client.search(&input.filter, input.limit);

        let max_workers = self.max_workers;
        let client = self.client;
        let storage = self.storage;
        let skip_history = input.skip_history;

        search_stream
            .take_while(|_| {
                let stop = cancelled.load(Ordering::SeqCst) || producer_failed.lock().is_some();
                futures::future::ready(!stop)
            })
            .chunks(MAX_BATCH_SIZE)
            .for_each(|chunk| {
                let counters = counters.clone();
                let producer_failed = producer_failed.clone();
                async move {
                    let mut keys = Vec::with_capacity(chunk.len());
                    for key_result in chunk {
                        match key_result {
                            Ok(key) => keys.push(key),
                            Err(e) => {
                                error!(error = %e, "scroll search failed unrecoverably");
                                *producer_failed.lock() = Some(e.to_string());
                            }
                        }
                    }
                    if keys.is_empty() {
                        return;
                    }

                    let remote_tasks = match client.get_tasks_batch(&keys).await {
                        Ok(tasks) => tasks,
                        Err(e) => {
                            error!(error = %e, batch_size = keys.len(), "failed to fetch task batch, skipping batch");
                            counters.lock().errors_count += keys.len() as i64;
                            return;
                        }
                    };

                    stream::iter(keys)
                        .for_each_concurrent(max_workers, |key| {
                            let remote = remote_tasks.get(&key).cloned();
                            let counters = counters.clone();
                            async move {
                                match remote {
                                    Some(remote) => {
                                        process_one_task(client, storage, &key, remote, skip_history, &counters).await;
                                    }
                                    None => {
                                        warn!(key, "key absent from batch response, skipping");
                                        counters.lock().errors_count += 1;
                                    }
                                }
                            }
                        })
                        .await;
                }
            })
            .await;

        let final_counters: RunOutcomeCounters = (*counters.lock()).into();

        if let Some(reason) = producer_failed.lock().clone() {
            self.storage.fail_run(run_id, &reason, final_counters).await?;
            return Ok(SyncResult {
                run_id,
                outcome: RunOutcome::Failed(reason),
                counters: final_counters,
            });
        }

        if cancelled.load(Ordering::SeqCst) {
            self.storage.fail_run(run_id, "cancelled", final_counters).await?;
            return Ok(SyncResult {
                run_id,
                outcome: RunOutcome::Cancelled,
                counters: final_counters,
            });
        }

        self.storage.complete_run(run_id, final_counters).await?;
        info!(%run_id, ?final_counters, "sync run completed");
        Ok(SyncResult {
            run_id,
            outcome: RunOutcome::Completed,
            counters: final_counters,
        })
    }

    /// Watches for SIGINT/SIGTERM and flips `cancelled`. A best-effort signal watcher; platforms without
    /// `tokio::signal::ctrl_c` support simply never cancel via this path.
    fn spawn_cancellation_watcher(&self, cancelled: Arc<AtomicBool>) {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("cancellation signal received, draining in-flight tasks");
                cancelled.store(true, Ordering::SeqCst);
            }
        });
    }
}

/// Processes exactly one task, already fetched as part of its batch: upsert,
/// changelog, replace history, touch last_sync_at.
/// Failures at any step are per-task: logged, counted, and do not abort the
/// run.
async fn process_one_task(
    client: &TrackerHttpClient,
    storage: &dyn TrackerStorage,
    key: &str,
    remote: RemoteTask,
    skip_history: bool,
    counters: &Arc<Mutex<RunCounters>>,
) {
    let now = Utc::now();
    let current_status = remote.status.key.clone();
    let current_display = remote.status.display.clone();
    let created_at = remote.created_at;
    let natural_id = remote.id.clone();
    let task = map_task(remote, now);

    let created = match storage.upsert_task(&task).await {
        Ok(created) => created,
        Err(e) => {
            error!(key, error = %e, "failed to upsert task, skipping");
            counters.lock().errors_count += 1;
            return;
        }
    };

    {
        let mut c = counters.lock();
        c.tasks_processed += 1;
        if created {
            c.tasks_created += 1;
        } else {
            c.tasks_updated += 1;
        }
    }

    if !skip_history {
        match client.get_changelog(key).await {
            Ok(changelog) => {
                let result = reconstruct(&natural_id, created_at, &current_status, &current_display, &changelog);
                if result.skipped_events > 0 {
                    warn!(key, skipped = result.skipped_events, "skipped malformed changelog events");
                }
                match storage.replace_history(&natural_id, &result.entries).await {
                    Ok(()) => {
                        counters.lock().history_entries_processed += result.entries.len() as i64;
                    }
                    Err(e) => {
                        error!(key, error = %e, "failed to replace history, skipping");
                        counters.lock().errors_count += 1;
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(key, error = %e, "failed to fetch changelog, skipping history refresh");
                counters.lock().errors_count += 1;
                return;
            }
        }
    }

    if let Err(e) = storage.touch_last_sync(&natural_id, now).await {
        error!(key, error = %e, "failed to touch last_sync_at");
        counters.lock().errors_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use tracker_http::{RateLimiter, TrackerHttpClient};
    use tracker_storage::sqlite::SqliteStorage;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn issue_json(key: &str, status_key: &str) -> serde_json::Value {
        serde_json::json!({
            "id": format!("nid-{key}"),
            "key": key,
            "summary": format!("summary for {key}"),
            "description": null,
            "status": {"key": status_key, "display": status_key},
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-02T00:00:00Z",
            "links": [],
        })
    }

    fn changelog_json() -> serde_json::Value {
        serde_json::json!([
            {
                "updatedAt": "2026-01-01T00:00:00Z",
                "fields": [
                    {
                        "field": "status",
                        "from_status": null,
                        "to_status": {"key": "open", "display": "Open"},
                    }
                ],
            },
            {
                "updatedAt": "2026-01-02T00:00:00Z",
                "fields": [
                    {
                        "field": "status",
                        "from_status": {"key": "open", "display": "Open"},
                        "to_status": {"key": "closed", "display": "Closed"},
                    }
                ],
            },
        ])
    }

    async fn mount_tracker(server: &MockServer, keys: &[&str]) {
        let issues: Vec<serde_json::Value> = keys
            .iter()
            .map(|k| serde_json::json!({"id": format!("nid-{k}"), "key": k}))
            .collect();

        Mock::given(method("POST"))
            .and(path("/v2/issues/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(issues))
            .mount(server)
            .await;

        let batch: Vec<serde_json::Value> = keys.iter().map(|k| issue_json(k, "closed")).collect();
        Mock::given(method("POST"))
            .and(path("/v2/issues/_bulk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(batch))
            .mount(server)
            .await;

        for key in keys {
            Mock::given(method("GET"))
                .and(path(format!("/v2/issues/{key}/changelog")))
                .respond_with(ResponseTemplate::new(200).set_body_json(changelog_json()))
                .mount(server)
                .await;
        }
    }

    #[tokio::test]
    async fn run_syncs_every_scrolled_task_and_completes() {
        let server = MockServer::start().await;
        mount_tracker(&server, &["UP-1", "UP-2"]).await;

        let client = TrackerHttpClient::new(
            server.uri(),
            "tok",
            "org",
            100,
            RateLimiter::new(StdDuration::from_millis(0)),
        )
        .unwrap();
        let storage = SqliteStorage::in_memory().await.unwrap();

        let orchestrator = SyncOrchestrator::new(&client, &storage, 4);
        let result = orchestrator
            .run(SyncInput {
                filter: "queue: UP".into(),
                limit: None,
                skip_history: false,
                force_full_history: false,
            })
            .await
            .unwrap();

        assert!(matches!(result.outcome, RunOutcome::Completed));
        assert_eq!(result.counters.tasks_processed, 2);
        assert_eq!(result.counters.tasks_created, 2);
        assert_eq!(result.counters.errors_count, 0);
        assert_eq!(result.counters.history_entries_processed, 6);

        let history = storage.history_for_task("nid-UP-1").await.unwrap();
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn run_counts_per_task_fetch_errors_without_failing_the_run() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/issues/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "nid-UP-1", "key": "UP-1"},
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/issues/_bulk"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&server)
            .await;

        let client = TrackerHttpClient::new(
            server.uri(),
            "tok",
            "org",
            100,
            RateLimiter::new(StdDuration::from_millis(0)),
        )
        .unwrap();
        let storage = SqliteStorage::in_memory().await.unwrap();

        let orchestrator = SyncOrchestrator::new(&client, &storage, 2);
        let result = orchestrator
            .run(SyncInput {
                filter: "queue: UP".into(),
                limit: None,
                skip_history: false,
                force_full_history: false,
            })
            .await
            .unwrap();

        assert!(matches!(result.outcome, RunOutcome::Completed));
        assert_eq!(result.counters.tasks_processed, 0);
        assert_eq!(result.counters.errors_count, 1);
    }

    #[tokio::test]
    async fn run_skips_history_when_requested() {
        let server = MockServer::start().await;
        mount_tracker(&server, &["UP-1"]).await;

        let client = TrackerHttpClient::new(
            server.uri(),
            "tok",
            "org",
            100,
            RateLimiter::new(StdDuration::from_millis(0)),
        )
        .unwrap();
        let storage = SqliteStorage::in_memory().await.unwrap();

        let orchestrator = SyncOrchestrator::new(&client, &storage, 1);
        let result = orchestrator
            .run(SyncInput {
                filter: "queue: UP".into(),
                limit: None,
                skip_history: true,
                force_full_history: false,
            })
            .await
            .unwrap();

        assert!(matches!(result.outcome, RunOutcome::Completed));
        assert_eq!(result.counters.history_entries_processed, 0);
        let history = storage.history_for_task("nid-UP-1").await.unwrap();
        assert!(history.is_empty());
    }
}
