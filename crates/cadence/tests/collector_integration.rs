//! End-to-end collection against a real in-memory SQLite database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use cadence::github::types::{RawJob, RawRun, RawStep};
use cadence::github::{GitHubError, RunQuery, RunsBatch, TokenError};
use cadence::{
    connect_and_migrate, ActionsApi, CollectRequest, Collector, CollectorConfig, Repository,
    RunStatus, TaskManager, TaskStatus, WorkflowScope,
};

fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, h, m, 0).unwrap()
}

fn raw_run(id: i64, created_at: DateTime<Utc>, status: &str) -> RawRun {
    RawRun {
        id,
        name: Some("CI".to_string()),
        status: Some(status.to_string()),
        conclusion: (status == "completed").then(|| "success".to_string()),
        created_at,
        updated_at: created_at,
        event: Some("push".to_string()),
        head_branch: Some("main".to_string()),
        run_number: id,
        head_sha: Some(format!("sha-{id}")),
        pull_requests: Vec::new(),
    }
}

fn raw_job(run_id: i64, started: DateTime<Utc>, finished: DateTime<Utc>) -> RawJob {
    RawJob {
        id: run_id * 100,
        run_id,
        run_attempt: Some(1),
        name: "build (os:ubuntu-22.04)".to_string(),
        status: Some("completed".to_string()),
        conclusion: Some("success".to_string()),
        started_at: Some(started),
        completed_at: Some(finished),
        labels: vec!["os:ubuntu-22.04".to_string()],
        steps: vec![RawStep {
            name: "checkout".to_string(),
            status: Some("completed".to_string()),
            conclusion: Some("success".to_string()),
            number: 1,
            started_at: Some(started),
            completed_at: Some(finished),
        }],
    }
}

/// API double whose runs and jobs can be mutated between collections.
#[derive(Default)]
struct FakeApi {
    runs: Mutex<Vec<RawRun>>,
    jobs: Mutex<HashMap<i64, Vec<RawJob>>>,
    jobs_calls: Mutex<Vec<i64>>,
}

impl FakeApi {
    fn add_run(&self, run: RawRun, jobs: Vec<RawJob>) {
        self.jobs.lock().unwrap().insert(run.id, jobs);
        self.runs.lock().unwrap().push(run);
    }

    fn set_run_status(&self, id: i64, status: &str, conclusion: Option<&str>) {
        let mut runs = self.runs.lock().unwrap();
        if let Some(run) = runs.iter_mut().find(|r| r.id == id) {
            run.status = Some(status.to_string());
            run.conclusion = conclusion.map(str::to_string);
        }
    }

    fn jobs_calls(&self) -> Vec<i64> {
        self.jobs_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionsApi for FakeApi {
    async fn list_workflow_runs(&self, query: &RunQuery) -> Result<RunsBatch, GitHubError> {
        let Some(cadence::CreatedFilter::Between { start, end }) = query.created else {
            return Err(GitHubError::api(400, "expected a created range"));
        };
        let runs: Vec<RawRun> = self
            .runs
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.created_at >= start && r.created_at <= end)
            .cloned()
            .collect();
        Ok(RunsBatch {
            total_count: runs.len() as i64,
            runs,
        })
    }

    async fn list_jobs(
        &self,
        _owner: &str,
        _repo: &str,
        run_id: i64,
    ) -> Result<Vec<RawJob>, GitHubError> {
        self.jobs_calls.lock().unwrap().push(run_id);
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .get(&run_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn validate_token(&self) -> Result<(), TokenError> {
        Ok(())
    }
}

async fn repository() -> Arc<Repository> {
    let db = connect_and_migrate("sqlite::memory:")
        .await
        .expect("in-memory database should migrate");
    Arc::new(Repository::new(db))
}

fn scope() -> WorkflowScope {
    WorkflowScope::new("octo", "widgets", "ci.yml")
}

fn request() -> CollectRequest {
    CollectRequest {
        scope: scope(),
        branch: None,
        since: at(1, 0, 0),
        until: at(15, 0, 0),
        skip_incomplete: false,
        force_refresh: false,
    }
}

#[tokio::test]
async fn collection_persists_runs_with_derived_fields() {
    let api = Arc::new(FakeApi::default());
    api.add_run(
        raw_run(1, at(2, 10, 0), "completed"),
        vec![raw_job(1, at(2, 10, 0), at(2, 10, 5))],
    );
    api.add_run(
        raw_run(2, at(9, 10, 0), "completed"),
        vec![raw_job(2, at(9, 10, 0), at(9, 10, 2))],
    );

    let store = repository().await;
    let collector = Collector::new(Arc::clone(&api), Arc::clone(&store), CollectorConfig::default());

    let summary = collector.collect(request()).await.unwrap();
    assert_eq!(summary.runs_collected, 2);
    assert!(summary.errors.is_empty());

    let run = store.load_run(1).await.unwrap().expect("run 1 stored");
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.duration_ms, Some(300_000));
    assert_eq!(run.jobs.len(), 1);
    assert_eq!(
        run.jobs[0]
            .matrix_config
            .as_ref()
            .and_then(|m| m.get("os"))
            .map(String::as_str),
        Some("ubuntu-22.04")
    );
    assert_eq!(run.jobs[0].steps.len(), 1);
}

#[tokio::test]
async fn recollection_is_idempotent_for_terminal_runs() {
    let api = Arc::new(FakeApi::default());
    api.add_run(
        raw_run(1, at(2, 10, 0), "completed"),
        vec![raw_job(1, at(2, 10, 0), at(2, 10, 5))],
    );

    let store = repository().await;
    let collector = Collector::new(Arc::clone(&api), Arc::clone(&store), CollectorConfig::default());

    let first = collector.collect(request()).await.unwrap();
    assert_eq!(first.runs_collected, 1);

    let second = collector.collect(request()).await.unwrap();
    assert_eq!(second.runs_collected, 0);
    assert_eq!(second.runs_updated, 0);
    assert_eq!(second.runs_skipped, 1);

    // Details were only ever fetched once.
    assert_eq!(api.jobs_calls(), vec![1]);
}

#[tokio::test]
async fn unfinished_runs_are_updated_once_they_complete() {
    let api = Arc::new(FakeApi::default());
    api.add_run(raw_run(1, at(2, 10, 0), "in_progress"), Vec::new());

    let store = repository().await;
    let collector = Collector::new(Arc::clone(&api), Arc::clone(&store), CollectorConfig::default());

    let first = collector.collect(request()).await.unwrap();
    assert_eq!(first.runs_collected, 1);
    assert_eq!(first.incomplete_stored, 1);
    let stored = store.load_run(1).await.unwrap().expect("incomplete stored");
    assert_eq!(stored.status, RunStatus::InProgress);

    // The run finishes; jobs become available.
    api.set_run_status(1, "completed", Some("success"));
    api.jobs
        .lock()
        .unwrap()
        .insert(1, vec![raw_job(1, at(2, 10, 0), at(2, 10, 5))]);

    let second = collector.collect(request()).await.unwrap();
    assert_eq!(second.runs_updated, 1);
    assert_eq!(second.runs_skipped, 0);

    let updated = store.load_run(1).await.unwrap().expect("run updated");
    assert_eq!(updated.status, RunStatus::Completed);
    assert_eq!(updated.jobs.len(), 1);
}

#[tokio::test]
async fn skip_incomplete_leaves_unfinished_runs_unstored() {
    let api = Arc::new(FakeApi::default());
    api.add_run(raw_run(1, at(2, 10, 0), "in_progress"), Vec::new());
    api.add_run(
        raw_run(2, at(3, 10, 0), "completed"),
        vec![raw_job(2, at(3, 10, 0), at(3, 10, 1))],
    );

    let store = repository().await;
    let collector = Collector::new(Arc::clone(&api), Arc::clone(&store), CollectorConfig::default());

    let mut request = request();
    request.skip_incomplete = true;
    let summary = collector.collect(request).await.unwrap();

    assert_eq!(summary.incomplete_skipped, 1);
    assert_eq!(summary.runs_collected, 1);
    assert!(store.load_run(1).await.unwrap().is_none());
    assert!(store.load_run(2).await.unwrap().is_some());
}

#[tokio::test]
async fn run_collection_drives_a_task_to_completion() {
    let api = Arc::new(FakeApi::default());
    api.add_run(
        raw_run(1, at(2, 10, 0), "completed"),
        vec![raw_job(1, at(2, 10, 0), at(2, 10, 5))],
    );

    let store = repository().await;
    let manager = Arc::new(TaskManager::new());
    let task_id = manager.create();

    cadence::run_collection(
        Arc::clone(&manager),
        task_id,
        api,
        store,
        CollectorConfig::default(),
        request(),
    )
    .await;

    let record = manager.get(task_id).expect("task exists");
    assert_eq!(record.status, TaskStatus::Completed);
    assert_eq!(record.summary.as_ref().unwrap().runs_collected, 1);
}
