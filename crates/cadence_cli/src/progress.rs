//! Progress reporting for collections.
//!
//! Collection progress is reported through structured logging. Piped and CI
//! output stays grep-able, and an interactive terminal still sees the
//! summary printed by the ingest command.

use cadence::{CollectProgress, ProgressCallback};

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    /// Convert into a callback the collector can call from worker tasks.
    pub fn into_callback(self) -> ProgressCallback {
        Box::new(move |event| self.handle(event))
    }

    pub fn handle(&self, event: CollectProgress) {
        match event {
            CollectProgress::Started {
                scope,
                since,
                until,
            } => {
                tracing::info!(scope = %scope, since = %since, until = %until, "Collection started");
            }

            CollectProgress::WindowListed { window, runs } => {
                tracing::debug!(window = %window, runs, "Listed window");
            }

            CollectProgress::WindowSplit { window } => {
                tracing::debug!(window = %window, "Window hit the result cap, splitting");
            }

            CollectProgress::WindowSaturated { window, total } => {
                tracing::warn!(
                    window = %window,
                    total,
                    "Window at minimum width still hits the result cap; some runs may be missing"
                );
            }

            CollectProgress::Planned { to_fetch, skipped } => {
                tracing::info!(to_fetch, skipped, "Fetching run details");
            }

            CollectProgress::RunFetched {
                run_id,
                current,
                total,
            } => {
                tracing::debug!(run_id, current, total, "Fetched run details");
            }

            CollectProgress::RunFailed { run_id, message } => {
                tracing::warn!(run_id, error = %message, "Failed to fetch run details");
            }

            CollectProgress::Warning { message } => {
                tracing::warn!(message = %message, "Warning");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
