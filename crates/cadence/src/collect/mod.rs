//! Workflow run collection.
//!
//! A collection proceeds in three phases:
//!
//! 1. **Listing.** The requested range is chunked into date windows and
//!    listed concurrently. A window that saturates the API's result cap is
//!    bisected until it fits ([`windows`]). Listed runs are deduplicated by
//!    id.
//! 2. **Reconciliation.** Listed runs are compared against what is already
//!    stored: terminal stored runs are skipped, and the rest are fetched.
//!    With `skip_incomplete` set, any run that has not finished yet is
//!    dropped instead, whether or not a snapshot of it is stored.
//! 3. **Detail fetch.** Jobs and steps are fetched for every remaining run
//!    by a bounded worker pool, and completed runs stream to a single
//!    writer task ([`writer`]).

pub mod progress;
pub mod store;
pub mod windows;
pub mod writer;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::github::types::RawRun;
use crate::github::{convert, short_error_message, ActionsApi, CreatedFilter, GitHubError, RunQuery};
use crate::model::{RunStatus, WorkflowScope};

pub use progress::{CollectProgress, ProgressCallback};
pub use store::{RunStore, SaveOutcome, StoreError};
pub use windows::{plan_windows, TimeWindow, DEFAULT_WINDOW, MIN_WINDOW, RESULT_CAP};
pub use writer::{await_writer_task, spawn_writer_task, WriterResult};

use progress::emit;
use writer::WRITER_CHANNEL_CAPACITY;

/// Errors that abort a collection outright.
///
/// Per-run failures do not abort; they are accumulated in
/// [`CollectSummary::errors`].
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Api(#[from] GitHubError),

    #[error("storage error: {0}")]
    Store(String),

    #[error("{0}")]
    Internal(String),
}

/// One collection request.
#[derive(Debug, Clone)]
pub struct CollectRequest {
    pub scope: WorkflowScope,
    pub branch: Option<String>,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    /// Drop any listed run that has not finished yet, new or already
    /// stored, instead of writing an incomplete snapshot.
    pub skip_incomplete: bool,
    /// Re-fetch runs that are already stored as terminal.
    pub force_refresh: bool,
}

/// Concurrency and window tuning.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Concurrent listing requests.
    pub list_concurrency: usize,
    /// Concurrent detail (jobs) requests.
    pub detail_concurrency: usize,
    /// Initial width of a listing window.
    pub window: chrono::TimeDelta,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            list_concurrency: 5,
            detail_concurrency: 10,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Outcome of one collection.
///
/// Write-side counts come from the writer task, so a run whose save fails
/// appears in `errors` and nowhere else.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectSummary {
    /// Runs written to the store for the first time.
    pub runs_collected: u64,
    /// Runs whose stored snapshot was overwritten.
    pub runs_updated: u64,
    /// Stored terminal runs skipped without a fetch.
    pub runs_skipped: u64,
    /// Written runs that had not finished yet at listing time.
    pub incomplete_stored: u64,
    /// Runs dropped by `skip_incomplete`, new or already stored.
    pub incomplete_skipped: u64,
    /// Listing windows that saturated the result cap and were bisected.
    pub windows_split: u64,
    /// Per-run failures; the collection itself still completed.
    pub errors: Vec<String>,
}

enum FetchOutcome {
    Fetched,
    Failed { run_id: i64, message: String },
}

/// Drives the three collection phases against an API and a store.
pub struct Collector<A, S> {
    api: Arc<A>,
    store: Arc<S>,
    config: CollectorConfig,
    progress: Arc<Option<ProgressCallback>>,
}

impl<A, S> Collector<A, S>
where
    A: ActionsApi + 'static,
    S: RunStore + 'static,
{
    pub fn new(api: Arc<A>, store: Arc<S>, config: CollectorConfig) -> Self {
        Self {
            api,
            store,
            config,
            progress: Arc::new(None),
        }
    }

    /// Receive progress events during collection.
    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Arc::new(Some(callback));
        self
    }

    pub async fn collect(&self, request: CollectRequest) -> Result<CollectSummary, CollectError> {
        let mut summary = CollectSummary::default();
        let request = Arc::new(request);

        emit(
            &self.progress,
            CollectProgress::Started {
                scope: request.scope.clone(),
                since: request.since,
                until: request.until,
            },
        );

        // Phase 1: listing with adaptive window subdivision.
        let splits = Arc::new(AtomicU64::new(0));
        let listed = self.list_all(&request, &splits).await?;
        summary.windows_split = splits.load(Ordering::Relaxed);

        // Phase 2: reconcile against stored state.
        let stored = self
            .store
            .run_statuses(&request.scope, request.since)
            .await
            .map_err(|e| CollectError::Store(e.to_string()))?;

        let mut to_fetch: Vec<RawRun> = Vec::new();
        for (id, raw) in listed {
            let listed_status =
                RunStatus::from(raw.status.clone().unwrap_or_else(|| "unknown".to_string()));
            match stored.get(&id) {
                Some(status) if status.is_terminal() && !request.force_refresh => {
                    summary.runs_skipped += 1;
                }
                // skip_incomplete drops every unfinished run, stored or not.
                _ if request.skip_incomplete && !listed_status.is_terminal() => {
                    summary.incomplete_skipped += 1;
                }
                _ => to_fetch.push(raw),
            }
        }

        emit(
            &self.progress,
            CollectProgress::Planned {
                to_fetch: to_fetch.len(),
                skipped: summary.runs_skipped as usize,
            },
        );
        tracing::info!(
            scope = %request.scope,
            to_fetch = to_fetch.len(),
            skipped = summary.runs_skipped,
            windows_split = summary.windows_split,
            "Collection plan ready"
        );

        // Phase 3: fetch details and stream runs to the writer.
        let (tx, rx) = mpsc::channel(WRITER_CHANNEL_CAPACITY);
        let writer = spawn_writer_task(
            Arc::clone(&self.store) as Arc<dyn RunStore>,
            request.scope.clone(),
            rx,
        );

        let total = to_fetch.len();
        let counter = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(self.config.detail_concurrency));
        let mut tasks = JoinSet::new();

        for raw in to_fetch {
            let api = Arc::clone(&self.api);
            let request = Arc::clone(&request);
            let semaphore = Arc::clone(&semaphore);
            let counter = Arc::clone(&counter);
            let progress = Arc::clone(&self.progress);
            let tx = tx.clone();

            tasks.spawn(async move {
                let run_id = raw.id;
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return FetchOutcome::Failed {
                            run_id,
                            message: "worker pool closed".to_string(),
                        };
                    }
                };

                match api
                    .list_jobs(&request.scope.owner, &request.scope.repo, run_id)
                    .await
                {
                    Ok(raw_jobs) => {
                        let jobs = raw_jobs.into_iter().map(convert::job).collect();
                        let run = convert::workflow_run(raw, jobs);
                        let current = counter.fetch_add(1, Ordering::Relaxed) + 1;
                        emit(
                            &progress,
                            CollectProgress::RunFetched {
                                run_id,
                                current,
                                total,
                            },
                        );
                        if tx.send(run).await.is_err() {
                            return FetchOutcome::Failed {
                                run_id,
                                message: "writer channel closed".to_string(),
                            };
                        }
                        FetchOutcome::Fetched
                    }
                    Err(e) => {
                        let message = short_error_message(&e);
                        emit(
                            &progress,
                            CollectProgress::RunFailed {
                                run_id,
                                message: message.clone(),
                            },
                        );
                        FetchOutcome::Failed { run_id, message }
                    }
                }
            });
        }
        drop(tx);

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(FetchOutcome::Fetched) => {}
                Ok(FetchOutcome::Failed { run_id, message }) => {
                    summary.errors.push(format!("run {run_id}: {message}"));
                }
                Err(e) => summary.errors.push(format!("fetch task failed: {e}")),
            }
        }

        // Write-side counts come from what the writer actually saved, not
        // from the fetch plan.
        let writer_result = await_writer_task(writer).await;
        summary.runs_collected = writer_result.inserted;
        summary.runs_updated = writer_result.updated;
        summary.incomplete_stored = writer_result.incomplete;
        summary.errors.extend(writer_result.errors);

        tracing::info!(
            scope = %request.scope,
            collected = summary.runs_collected,
            updated = summary.runs_updated,
            skipped = summary.runs_skipped,
            errors = summary.errors.len(),
            "Collection finished"
        );
        Ok(summary)
    }

    /// List every run in the requested range, deduplicated by run id.
    async fn list_all(
        &self,
        request: &Arc<CollectRequest>,
        splits: &Arc<AtomicU64>,
    ) -> Result<HashMap<i64, RawRun>, CollectError> {
        let semaphore = Arc::new(Semaphore::new(self.config.list_concurrency));
        let mut tasks = JoinSet::new();

        for window in plan_windows(request.since, request.until, self.config.window) {
            tasks.spawn(fetch_window(
                Arc::clone(&self.api),
                Arc::clone(request),
                window,
                Arc::clone(&semaphore),
                Arc::clone(&self.progress),
                Arc::clone(splits),
            ));
        }

        let mut listed = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            let runs = joined
                .map_err(|e| CollectError::Internal(format!("listing task failed: {e}")))??;
            for run in runs {
                // Windows can brush up against each other at second
                // granularity; last write wins, the payloads are identical.
                listed.insert(run.id, run);
            }
        }
        Ok(listed)
    }
}

/// Fetch one window, bisecting recursively while the result cap is hit.
///
/// The concurrency permit is held only for the listing request itself, not
/// across recursion, so splitting can never deadlock the pool.
fn fetch_window<A>(
    api: Arc<A>,
    request: Arc<CollectRequest>,
    window: TimeWindow,
    semaphore: Arc<Semaphore>,
    progress: Arc<Option<ProgressCallback>>,
    splits: Arc<AtomicU64>,
) -> Pin<Box<dyn Future<Output = Result<Vec<RawRun>, GitHubError>> + Send>>
where
    A: ActionsApi + 'static,
{
    Box::pin(async move {
        let batch = {
            let _permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return Err(GitHubError::network("listing pool closed")),
            };
            let query = RunQuery {
                owner: request.scope.owner.clone(),
                repo: request.scope.repo.clone(),
                workflow: request.scope.workflow.clone(),
                branch: request.branch.clone(),
                created: Some(CreatedFilter::Between {
                    start: window.start,
                    end: window.end,
                }),
            };
            api.list_workflow_runs(&query).await?
        };

        if batch.total_count >= RESULT_CAP {
            if let Some((left, right)) = window.split() {
                splits.fetch_add(1, Ordering::Relaxed);
                emit(&progress, CollectProgress::WindowSplit { window });
                tracing::debug!(%window, total = batch.total_count, "Window saturated, bisecting");

                let mut runs = fetch_window(
                    Arc::clone(&api),
                    Arc::clone(&request),
                    left,
                    Arc::clone(&semaphore),
                    Arc::clone(&progress),
                    Arc::clone(&splits),
                )
                .await?;
                runs.extend(fetch_window(api, request, right, semaphore, progress, splits).await?);
                return Ok(runs);
            }

            tracing::warn!(
                %window,
                total = batch.total_count,
                "Window saturated but too narrow to split; results may be incomplete"
            );
            emit(
                &progress,
                CollectProgress::WindowSaturated {
                    window,
                    total: batch.total_count,
                },
            );
            return Ok(batch.runs);
        }

        emit(
            &progress,
            CollectProgress::WindowListed {
                window,
                runs: batch.runs.len(),
            },
        );
        Ok(batch.runs)
    })
}
