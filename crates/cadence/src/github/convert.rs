//! Conversion from raw API payloads into the domain model.
//!
//! This is where derived fields are computed: durations from timestamps,
//! matrix configuration from runner labels or the job name, and a run's
//! overall duration from the span of its jobs.

use crate::model::{duration_ms_between, Job, MatrixConfig, RunStatus, Step, WorkflowRun};

use super::types::{RawJob, RawRun, RawStep};

/// Extract matrix configuration from `key:value` runner labels.
///
/// Labels without a colon (e.g. `self-hosted`) are ignored. Returns `None`
/// when no label carries a key/value pair.
#[must_use]
pub fn matrix_from_labels(labels: &[String]) -> Option<MatrixConfig> {
    let mut config = MatrixConfig::new();
    for label in labels {
        if let Some((key, value)) = label.split_once(':') {
            let key = key.trim();
            let value = value.trim();
            if !key.is_empty() && !value.is_empty() {
                config.insert(key.to_string(), value.to_string());
            }
        }
    }
    if config.is_empty() { None } else { Some(config) }
}

/// Extract positional matrix parameters from a job name.
///
/// Matrix jobs are conventionally named `test (3.11, ubuntu-latest)`; the
/// first parenthesized group is split on commas and each entry becomes
/// `matrix_param_0`, `matrix_param_1`, and so on.
#[must_use]
pub fn matrix_from_name(name: &str) -> Option<MatrixConfig> {
    let open = name.find('(')?;
    let close = name[open + 1..].find(')')? + open + 1;

    let mut config = MatrixConfig::new();
    let mut index = 0;
    for part in name[open + 1..close].split(',') {
        let part = part.trim();
        if !part.is_empty() {
            config.insert(format!("matrix_param_{index}"), part.to_string());
            index += 1;
        }
    }
    if config.is_empty() { None } else { Some(config) }
}

/// Matrix configuration for a job: labels are authoritative, the job name
/// is the fallback.
#[must_use]
pub fn matrix_config(name: &str, labels: &[String]) -> Option<MatrixConfig> {
    matrix_from_labels(labels).or_else(|| matrix_from_name(name))
}

pub fn step(raw: RawStep) -> Step {
    let duration_ms = duration_ms_between(raw.started_at, raw.completed_at);
    Step {
        name: raw.name,
        status: raw.status,
        conclusion: raw.conclusion,
        number: raw.number,
        started_at: raw.started_at,
        completed_at: raw.completed_at,
        duration_ms,
    }
}

pub fn job(raw: RawJob) -> Job {
    let duration_ms = duration_ms_between(raw.started_at, raw.completed_at);
    let matrix_config = matrix_config(&raw.name, &raw.labels);
    Job {
        id: raw.id,
        workflow_run_id: raw.run_id,
        run_attempt: raw.run_attempt,
        name: raw.name,
        status: raw.status,
        conclusion: raw.conclusion,
        started_at: raw.started_at,
        completed_at: raw.completed_at,
        duration_ms,
        matrix_config,
        steps: raw.steps.into_iter().map(step).collect(),
    }
}

/// Assemble a workflow run from its listing payload and its jobs.
///
/// The run's duration spans from the earliest job start to the latest job
/// completion, so queue time between jobs is included.
pub fn workflow_run(raw: RawRun, jobs: Vec<Job>) -> WorkflowRun {
    let earliest_start = jobs.iter().filter_map(|j| j.started_at).min();
    let latest_completion = jobs.iter().filter_map(|j| j.completed_at).max();
    let duration_ms = duration_ms_between(earliest_start, latest_completion);

    let status = RunStatus::from(raw.status.unwrap_or_else(|| "unknown".to_string()));

    WorkflowRun {
        id: raw.id,
        name: raw.name,
        status,
        conclusion: raw.conclusion,
        created_at: raw.created_at,
        updated_at: raw.updated_at,
        event: raw.event,
        head_branch: raw.head_branch,
        run_number: raw.run_number,
        head_sha: raw.head_sha,
        pull_request_number: raw.pull_requests.first().map(|pr| pr.number),
        duration_ms,
        jobs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(h: u32, m: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, h, m, 0).unwrap()
    }

    fn raw_job(id: i64, name: &str, labels: &[&str]) -> RawJob {
        RawJob {
            id,
            run_id: 42,
            run_attempt: Some(1),
            name: name.to_string(),
            status: Some("completed".to_string()),
            conclusion: Some("success".to_string()),
            started_at: Some(ts(10, 0)),
            completed_at: Some(ts(10, 2)),
            labels: labels.iter().map(|s| s.to_string()).collect(),
            steps: Vec::new(),
        }
    }

    fn raw_run(id: i64) -> RawRun {
        RawRun {
            id,
            name: Some("CI".to_string()),
            status: Some("completed".to_string()),
            conclusion: Some("success".to_string()),
            created_at: ts(9, 59),
            updated_at: ts(10, 6),
            event: Some("push".to_string()),
            head_branch: Some("main".to_string()),
            run_number: 7,
            head_sha: Some("abc".to_string()),
            pull_requests: Vec::new(),
        }
    }

    #[test]
    fn labels_with_colons_become_matrix_entries() {
        let labels = vec![
            "os:ubuntu-22.04".to_string(),
            "self-hosted".to_string(),
            "arch: x64 ".to_string(),
        ];
        let config = matrix_from_labels(&labels).unwrap();
        assert_eq!(config.get("os").map(String::as_str), Some("ubuntu-22.04"));
        assert_eq!(config.get("arch").map(String::as_str), Some("x64"));
        assert_eq!(config.len(), 2);
    }

    #[test]
    fn labels_without_pairs_yield_none() {
        assert_eq!(matrix_from_labels(&["self-hosted".to_string()]), None);
        assert_eq!(matrix_from_labels(&[]), None);
    }

    #[test]
    fn job_name_parens_become_positional_params() {
        let config = matrix_from_name("test (3.11, ubuntu-latest)").unwrap();
        assert_eq!(config.get("matrix_param_0").map(String::as_str), Some("3.11"));
        assert_eq!(
            config.get("matrix_param_1").map(String::as_str),
            Some("ubuntu-latest")
        );
    }

    #[test]
    fn names_without_parens_yield_none() {
        assert_eq!(matrix_from_name("build"), None);
        assert_eq!(matrix_from_name("build ()"), None);
        assert_eq!(matrix_from_name("build (unclosed"), None);
    }

    #[test]
    fn labels_take_precedence_over_name() {
        let labels = vec!["os:macos-14".to_string()];
        let config = matrix_config("test (3.11)", &labels).unwrap();
        assert_eq!(config.get("os").map(String::as_str), Some("macos-14"));
        assert!(config.get("matrix_param_0").is_none());

        let fallback = matrix_config("test (3.11)", &[]).unwrap();
        assert_eq!(
            fallback.get("matrix_param_0").map(String::as_str),
            Some("3.11")
        );
    }

    #[test]
    fn run_duration_spans_earliest_start_to_latest_completion() {
        let mut first = raw_job(1, "build", &[]);
        first.started_at = Some(ts(10, 0));
        first.completed_at = Some(ts(10, 2));
        let mut second = raw_job(2, "test", &[]);
        second.started_at = Some(ts(10, 1));
        second.completed_at = Some(ts(10, 5));

        let run = workflow_run(raw_run(42), vec![job(first), job(second)]);
        assert_eq!(run.duration_ms, Some(300_000));
    }

    #[test]
    fn run_duration_is_none_without_job_timestamps() {
        let mut incomplete = raw_job(1, "build", &[]);
        incomplete.completed_at = None;

        let run = workflow_run(raw_run(42), vec![job(incomplete)]);
        assert_eq!(run.duration_ms, None);

        let empty = workflow_run(raw_run(43), Vec::new());
        assert_eq!(empty.duration_ms, None);
    }

    #[test]
    fn job_conversion_derives_duration_and_matrix() {
        let converted = job(raw_job(1, "build (os:ubuntu)", &[]));
        assert_eq!(converted.duration_ms, Some(120_000));
        let matrix = converted.matrix_config.unwrap();
        assert_eq!(
            matrix.get("matrix_param_0").map(String::as_str),
            Some("os:ubuntu")
        );
    }

    #[test]
    fn run_takes_first_pull_request_number() {
        let mut raw = raw_run(42);
        raw.pull_requests = vec![
            super::super::types::RawPullRequest { number: 17 },
            super::super::types::RawPullRequest { number: 18 },
        ];
        let run = workflow_run(raw, Vec::new());
        assert_eq!(run.pull_request_number, Some(17));
    }

    #[test]
    fn missing_status_maps_to_other() {
        let mut raw = raw_run(42);
        raw.status = None;
        let run = workflow_run(raw, Vec::new());
        assert_eq!(run.status, RunStatus::Other("unknown".to_string()));
    }

    #[test]
    fn step_conversion_preserves_negative_durations() {
        let raw = RawStep {
            name: "flaky clock".to_string(),
            status: Some("completed".to_string()),
            conclusion: Some("success".to_string()),
            number: 1,
            started_at: Some(ts(10, 5)),
            completed_at: Some(ts(10, 0)),
        };
        assert_eq!(step(raw).duration_ms, Some(-300_000));
    }
}
