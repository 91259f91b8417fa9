//! Progress events emitted during a collection.

use super::windows::TimeWindow;
use crate::model::WorkflowScope;

/// Progress events emitted while a collection is running.
///
/// Marked non-exhaustive so new events can be added without breaking
/// downstream reporters.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CollectProgress {
    /// A collection has started.
    Started {
        scope: WorkflowScope,
        since: chrono::DateTime<chrono::Utc>,
        until: chrono::DateTime<chrono::Utc>,
    },
    /// A listing window completed under the result cap.
    WindowListed {
        window: TimeWindow,
        /// Runs returned for this window.
        runs: usize,
    },
    /// A listing window saturated the result cap and was bisected.
    WindowSplit { window: TimeWindow },
    /// A window saturated the cap but is too narrow to split further;
    /// its results are accepted even though some runs may be missing.
    WindowSaturated { window: TimeWindow, total: i64 },
    /// Listing and reconciliation are done; detail fetching starts.
    Planned {
        /// Runs whose details will be fetched.
        to_fetch: usize,
        /// Stored terminal runs skipped without a fetch.
        skipped: usize,
    },
    /// Details for one run were fetched and handed to the writer.
    RunFetched {
        run_id: i64,
        current: usize,
        total: usize,
    },
    /// Detail fetching for one run failed; collection continues.
    RunFailed { run_id: i64, message: String },
    /// A non-fatal condition worth surfacing.
    Warning { message: String },
}

/// Callback invoked with progress events during collection.
pub type ProgressCallback = Box<dyn Fn(CollectProgress) + Send + Sync>;

/// Emit a progress event if a callback is set.
#[inline]
pub(crate) fn emit(callback: &Option<ProgressCallback>, progress: CollectProgress) {
    if let Some(callback) = callback {
        callback(progress);
    }
}
