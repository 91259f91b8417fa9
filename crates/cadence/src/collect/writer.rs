//! Single-writer persistence task.
//!
//! SQLite tolerates exactly one writer, so every fetch worker sends its
//! completed runs over a channel to one task that owns all writes. Each run
//! is saved in its own transaction; a failed save is recorded and the
//! writer keeps draining.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::model::{WorkflowRun, WorkflowScope};

use super::store::{RunStore, SaveOutcome};

/// Channel capacity between fetch workers and the writer.
pub const WRITER_CHANNEL_CAPACITY: usize = 64;

/// How long to wait for the writer to drain after the last sender drops.
const WRITER_TIMEOUT: Duration = Duration::from_secs(300);

/// Totals accumulated by the writer task.
///
/// Counts reflect what was actually written: a run whose save fails shows
/// up in `errors` only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterResult {
    pub inserted: u64,
    pub updated: u64,
    /// Written runs whose status was still non-terminal.
    pub incomplete: u64,
    pub errors: Vec<String>,
}

impl WriterResult {
    fn failed(message: String) -> Self {
        Self {
            errors: vec![message],
            ..Self::default()
        }
    }
}

/// Spawn the writer task.
///
/// The task drains `rx` until every sender is dropped, then returns its
/// totals. Collect the result with [`await_writer_task`].
pub fn spawn_writer_task(
    store: Arc<dyn RunStore>,
    scope: WorkflowScope,
    mut rx: mpsc::Receiver<WorkflowRun>,
) -> JoinHandle<WriterResult> {
    tokio::spawn(async move {
        let mut result = WriterResult::default();

        while let Some(run) = rx.recv().await {
            let run_id = run.id;
            match store.save_run(&scope, &run).await {
                Ok(outcome) => {
                    match outcome {
                        SaveOutcome::Inserted => result.inserted += 1,
                        SaveOutcome::Updated => result.updated += 1,
                    }
                    if !run.status.is_terminal() {
                        result.incomplete += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(run_id, error = %e, "Failed to save run");
                    result.errors.push(format!("run {run_id}: {e}"));
                }
            }
        }

        tracing::debug!(
            inserted = result.inserted,
            updated = result.updated,
            incomplete = result.incomplete,
            errors = result.errors.len(),
            "Writer task finished"
        );
        result
    })
}

/// Wait for the writer task to finish and return its totals.
///
/// A panicked, cancelled, or stuck writer is converted into a
/// [`WriterResult`] carrying one error, so callers always get totals back.
pub async fn await_writer_task(mut handle: JoinHandle<WriterResult>) -> WriterResult {
    tokio::select! {
        joined = &mut handle => match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let panic = e.into_panic();
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "writer task panicked".to_string());
                tracing::error!(message, "Writer task panicked");
                WriterResult::failed(format!("writer task panicked: {message}"))
            }
            Err(_) => WriterResult::failed("writer task was cancelled".to_string()),
        },
        _ = tokio::time::sleep(WRITER_TIMEOUT) => {
            handle.abort();
            tracing::error!("Writer task did not finish in time");
            WriterResult::failed("writer task timed out".to_string())
        }
    }
}
