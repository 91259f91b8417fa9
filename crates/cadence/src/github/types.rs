//! Raw payload types for the GitHub Actions REST endpoints.
//!
//! These mirror the wire format; conversion into the domain model lives in
//! [`super::convert`].

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One page of the workflow runs listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RunsPage {
    pub total_count: i64,
    #[serde(default)]
    pub workflow_runs: Vec<RawRun>,
}

/// A workflow run as listed by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRun {
    pub id: i64,
    pub name: Option<String>,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub event: Option<String>,
    pub head_branch: Option<String>,
    pub run_number: i64,
    pub head_sha: Option<String>,
    #[serde(default)]
    pub pull_requests: Vec<RawPullRequest>,
}

/// Pull request reference attached to a run.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPullRequest {
    pub number: i64,
}

/// One page of the jobs listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct JobsPage {
    pub total_count: i64,
    #[serde(default)]
    pub jobs: Vec<RawJob>,
}

/// A job as returned by the jobs endpoint, steps included.
#[derive(Debug, Clone, Deserialize)]
pub struct RawJob {
    pub id: i64,
    pub run_id: i64,
    pub run_attempt: Option<i64>,
    pub name: String,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub steps: Vec<RawStep>,
}

/// A step within a job.
#[derive(Debug, Clone, Deserialize)]
pub struct RawStep {
    pub name: String,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub number: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
