//! Domain model for collected workflow telemetry.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a workflow run as reported by the API.
///
/// Only `Completed` is terminal; anything else (including statuses this
/// model doesn't know about) is treated as still in flight so it will be
/// re-fetched on the next collection pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    Other(String),
}

impl RunStatus {
    /// A terminal run never changes again and is never re-fetched.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Other(s) => s.as_str(),
        }
    }
}

impl FromStr for RunStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "completed" => RunStatus::Completed,
            other => RunStatus::Other(other.to_string()),
        })
    }
}

impl From<String> for RunStatus {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(RunStatus::Other(s))
    }
}

impl From<RunStatus> for String {
    fn from(status: RunStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matrix configuration extracted from a job (e.g. `{"os": "ubuntu-22.04"}`).
pub type MatrixConfig = BTreeMap<String, String>;

/// Identifies one workflow within one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowScope {
    pub owner: String,
    pub repo: String,
    /// Workflow file name (e.g. `ci.yml`) or numeric workflow id.
    pub workflow: String,
}

impl WorkflowScope {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        workflow: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            workflow: workflow.into(),
        }
    }
}

impl fmt::Display for WorkflowScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.owner, self.repo, self.workflow)
    }
}

/// A single step within a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub number: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration, derived from the timestamps when both are set.
    pub duration_ms: Option<i64>,
}

/// A job within a workflow run, including its steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub workflow_run_id: i64,
    pub run_attempt: Option<i64>,
    pub name: String,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration, derived from the timestamps when both are set.
    pub duration_ms: Option<i64>,
    pub matrix_config: Option<MatrixConfig>,
    pub steps: Vec<Step>,
}

/// A workflow run with all of its jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: i64,
    pub name: Option<String>,
    pub status: RunStatus,
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub event: Option<String>,
    pub head_branch: Option<String>,
    pub run_number: i64,
    pub head_sha: Option<String>,
    pub pull_request_number: Option<i64>,
    /// Span from the earliest job start to the latest job completion.
    pub duration_ms: Option<i64>,
    pub jobs: Vec<Job>,
}

/// Duration in milliseconds between two optional timestamps.
///
/// Returns `None` unless both timestamps are present. Out-of-order
/// timestamps yield a negative value rather than being clamped, so upstream
/// anomalies stay visible in the data.
#[must_use]
pub fn duration_ms_between(
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
) -> Option<i64> {
    match (started_at, completed_at) {
        (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
        _ => None,
    }
}
