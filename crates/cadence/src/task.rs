//! Background collection tasks.
//!
//! [`TaskManager`] tracks the lifecycle of collection runs: pending, in
//! progress with a fetch counter, then exactly one terminal state. Terminal
//! records are immutable; late progress callbacks or duplicate completions
//! from a racing worker cannot overwrite how a task ended.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::collect::{
    CollectProgress, CollectRequest, CollectSummary, Collector, CollectorConfig, RunStore,
};
use crate::github::{ActionsApi, TokenErrorKind};

/// Lifecycle state of a collection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Completed and failed tasks never change again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Fetch progress within a running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskProgress {
    pub current: u64,
    pub total: u64,
}

/// One collection task's full record.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub status: TaskStatus,
    pub progress: Option<TaskProgress>,
    pub summary: Option<CollectSummary>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// In-memory registry of collection tasks.
#[derive(Default)]
pub struct TaskManager {
    tasks: Mutex<HashMap<Uuid, TaskRecord>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, TaskRecord>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new pending task and return its id.
    pub fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.lock().insert(
            id,
            TaskRecord {
                id,
                status: TaskStatus::Pending,
                progress: None,
                summary: None,
                error: None,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<TaskRecord> {
        self.lock().get(&id).cloned()
    }

    #[must_use]
    pub fn list(&self) -> Vec<TaskRecord> {
        let mut tasks: Vec<TaskRecord> = self.lock().values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Record fetch progress. Moves a pending task into `InProgress`.
    ///
    /// Returns `false` if the task is unknown or already terminal.
    pub fn update_progress(&self, id: Uuid, current: u64, total: u64) -> bool {
        let mut tasks = self.lock();
        let Some(record) = tasks.get_mut(&id) else {
            return false;
        };
        if record.status.is_terminal() {
            return false;
        }
        record.status = TaskStatus::InProgress;
        // Concurrent workers can report out of order; never move backwards.
        if record.progress.is_none_or(|p| current >= p.current) {
            record.progress = Some(TaskProgress { current, total });
        }
        record.updated_at = Utc::now();
        true
    }

    /// Mark a task completed with its summary.
    ///
    /// Returns `false` if the task is unknown or already terminal.
    pub fn complete(&self, id: Uuid, summary: CollectSummary) -> bool {
        let mut tasks = self.lock();
        let Some(record) = tasks.get_mut(&id) else {
            return false;
        };
        if record.status.is_terminal() {
            tracing::warn!(task_id = %id, "Ignoring completion for a terminal task");
            return false;
        }
        record.status = TaskStatus::Completed;
        record.summary = Some(summary);
        record.updated_at = Utc::now();
        true
    }

    /// Mark a task failed with an error message.
    ///
    /// Returns `false` if the task is unknown or already terminal.
    pub fn fail(&self, id: Uuid, message: impl Into<String>) -> bool {
        let mut tasks = self.lock();
        let Some(record) = tasks.get_mut(&id) else {
            return false;
        };
        if record.status.is_terminal() {
            tracing::warn!(task_id = %id, "Ignoring failure for a terminal task");
            return false;
        }
        record.status = TaskStatus::Failed;
        record.error = Some(message.into());
        record.updated_at = Utc::now();
        true
    }
}

/// Run one collection under a task record.
///
/// Validates credentials first, then drives the collector and reflects its
/// progress into the manager. The task reaches exactly one terminal state.
pub async fn run_collection<A, S>(
    manager: Arc<TaskManager>,
    task_id: Uuid,
    api: Arc<A>,
    store: Arc<S>,
    config: CollectorConfig,
    request: CollectRequest,
) where
    A: ActionsApi + 'static,
    S: RunStore + 'static,
{
    if let Err(e) = api.validate_token().await {
        let message = match e.kind {
            TokenErrorKind::Authentication => format!("GitHub authentication failed: {e}"),
            TokenErrorKind::Api | TokenErrorKind::Internal => {
                format!("Token validation failed: {e}")
            }
        };
        tracing::error!(task_id = %task_id, %message, "Collection aborted");
        manager.fail(task_id, message);
        return;
    }

    let progress_manager = Arc::clone(&manager);
    let collector = Collector::new(api, store, config).with_progress(Box::new(move |p| {
        if let CollectProgress::RunFetched { current, total, .. } = p {
            progress_manager.update_progress(task_id, current as u64, total as u64);
        }
    }));

    match collector.collect(request).await {
        Ok(summary) => {
            manager.complete(task_id, summary);
        }
        Err(e) => {
            manager.fail(task_id, format!("Collection failed: {e}"));
        }
    }
}
