//! Storage port consumed by the collector.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{RunStatus, WorkflowRun, WorkflowScope};

/// Boxed error for the storage port; the collector reports store failures,
/// it does not branch on them.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Whether a saved run was new or replaced an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    Updated,
}

/// Persistence port for collected workflow runs.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Status of every stored run for `scope` created at or after `since`.
    async fn run_statuses(
        &self,
        scope: &WorkflowScope,
        since: DateTime<Utc>,
    ) -> Result<HashMap<i64, RunStatus>, StoreError>;

    /// Save one run with its jobs and steps, replacing any existing data
    /// for the same run id.
    async fn save_run(
        &self,
        scope: &WorkflowScope,
        run: &WorkflowRun,
    ) -> Result<SaveOutcome, StoreError>;
}
