//! GitHub Actions REST client.
//!
//! All requests flow through a shared [`RateLimitCoordinator`]: limit
//! headers from every response are registered with it, and the client parks
//! at its throttle gate before each request. Transient failures (transport
//! errors, 5xx) are retried with exponential backoff on a shared attempt
//! budget; auth and not-found responses fail fast.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use url::Url;

use crate::http::{HttpHeaders, HttpRequest, HttpResponse, HttpTransport};
use crate::ratelimit::{ApiPacer, RateLimitCoordinator, RateLimitInfo};

use super::error::{GitHubError, TokenError};
use super::pagination::parse_link_header;
use super::types::{JobsPage, RawJob, RawRun, RunsPage};

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("cadence/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";
const PER_PAGE: u32 = 100;

/// Retry and throttle tuning for the client.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts for transient failures (transport errors and 5xx).
    pub max_attempts: u32,
    /// Backoff before the first retry; doubles each retry.
    pub initial_backoff: Duration,
    /// Extra short retries when the API reports a reset time in the past.
    pub skew_retries: u32,
    /// How long a request will park at the throttle gate before giving up.
    pub throttle_wait_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            skew_retries: 3,
            throttle_wait_timeout: Duration::from_secs(1800),
        }
    }
}

/// Time filter for the run listing endpoint's `created` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatedFilter {
    Between {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Since(DateTime<Utc>),
    Until(DateTime<Utc>),
}

impl CreatedFilter {
    /// Render in the API's date-range query syntax.
    #[must_use]
    pub fn to_query(&self) -> String {
        let fmt = |t: &DateTime<Utc>| t.to_rfc3339_opts(SecondsFormat::Secs, true);
        match self {
            CreatedFilter::Between { start, end } => format!("{}..{}", fmt(start), fmt(end)),
            CreatedFilter::Since(start) => format!(">={}", fmt(start)),
            CreatedFilter::Until(end) => format!("<={}", fmt(end)),
        }
    }
}

/// Parameters for listing workflow runs.
#[derive(Debug, Clone)]
pub struct RunQuery {
    pub owner: String,
    pub repo: String,
    /// Workflow file name (e.g. `ci.yml`) or numeric workflow id.
    pub workflow: String,
    pub branch: Option<String>,
    pub created: Option<CreatedFilter>,
}

/// All runs matching a listing query, with the server-reported total.
///
/// `total_count` can exceed `runs.len()`: the listing endpoint caps
/// pagination, which is what window subdivision keys off.
#[derive(Debug, Clone)]
pub struct RunsBatch {
    pub total_count: i64,
    pub runs: Vec<RawRun>,
}

/// The slice of the GitHub API the collector consumes.
#[async_trait]
pub trait ActionsApi: Send + Sync {
    /// List workflow runs matching `query`, following pagination.
    async fn list_workflow_runs(&self, query: &RunQuery) -> Result<RunsBatch, GitHubError>;

    /// List all jobs (and their steps) for a run, every attempt included.
    async fn list_jobs(
        &self,
        owner: &str,
        repo: &str,
        run_id: i64,
    ) -> Result<Vec<RawJob>, GitHubError>;

    /// Check that the configured credentials can reach the API.
    async fn validate_token(&self) -> Result<(), TokenError>;
}

/// Parse `x-ratelimit-*` headers from a response, if present.
#[must_use]
pub fn parse_rate_limit_headers(headers: &HttpHeaders) -> Option<RateLimitInfo> {
    let get = |name: &str| crate::http::header_get(headers, name);

    let limit = get("x-ratelimit-limit")?.parse().ok()?;
    let remaining = get("x-ratelimit-remaining")?.parse().ok()?;
    let reset_epoch: i64 = get("x-ratelimit-reset")?.parse().ok()?;
    let reset_at = DateTime::from_timestamp(reset_epoch, 0)?;

    Some(RateLimitInfo {
        limit,
        remaining,
        reset_at,
    })
}

/// GitHub Actions API client over an [`HttpTransport`].
pub struct GitHubClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    token: String,
    coordinator: Arc<RateLimitCoordinator>,
    pacer: Option<ApiPacer>,
    retry: RetryPolicy,
}

impl GitHubClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        token: impl Into<String>,
        coordinator: Arc<RateLimitCoordinator>,
    ) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
            coordinator,
            pacer: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Point the client at a non-default API root (GitHub Enterprise, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Smooth request bursts through a proactive pacer.
    #[must_use]
    pub fn with_pacer(mut self, pacer: ApiPacer) -> Self {
        self.pacer = Some(pacer);
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn default_headers(&self) -> HttpHeaders {
        vec![
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.token),
            ),
            (
                "Accept".to_string(),
                "application/vnd.github+json".to_string(),
            ),
            ("X-GitHub-Api-Version".to_string(), API_VERSION.to_string()),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
        ]
    }

    fn api_root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    fn runs_url(&self, query: &RunQuery) -> Result<String, GitHubError> {
        let mut url = Url::parse(&format!(
            "{}/repos/{}/{}/actions/workflows/{}/runs",
            self.api_root(),
            query.owner,
            query.repo,
            query.workflow
        ))
        .map_err(|e| GitHubError::decode(format!("invalid runs URL: {e}")))?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("per_page", &PER_PAGE.to_string());
            if let Some(branch) = &query.branch {
                pairs.append_pair("branch", branch);
            }
            if let Some(created) = &query.created {
                pairs.append_pair("created", &created.to_query());
            }
        }

        Ok(url.to_string())
    }

    fn jobs_url(&self, owner: &str, repo: &str, run_id: i64) -> String {
        format!(
            "{}/repos/{owner}/{repo}/actions/runs/{run_id}/jobs?per_page={PER_PAGE}&filter=all",
            self.api_root()
        )
    }

    /// One GET with the full retry and throttle discipline.
    async fn get(&self, url: &str) -> Result<HttpResponse, GitHubError> {
        let mut failures: u32 = 0;
        let mut skew_attempts: u32 = 0;
        let mut slept_past_hour = false;
        let mut throttle_rounds: u32 = 0;

        loop {
            if let Some(pacer) = &self.pacer {
                pacer.wait().await;
            }

            self.coordinator.check_and_throttle_if_needed();
            if !self
                .coordinator
                .wait_if_throttled(self.retry.throttle_wait_timeout)
                .await
            {
                return Err(GitHubError::RateLimited {
                    reset_at: Utc::now(),
                });
            }

            let request = HttpRequest {
                url: url.to_string(),
                headers: self.default_headers(),
            };

            let response = match self.transport.send(request).await {
                Ok(response) => response,
                Err(e) => {
                    failures += 1;
                    if failures >= self.retry.max_attempts {
                        tracing::error!(url, attempts = failures, error = %e, "Request failed");
                        return Err(GitHubError::network(e.to_string()));
                    }
                    let backoff = self.retry.initial_backoff * 2u32.pow(failures - 1);
                    tracing::warn!(
                        url,
                        attempt = failures,
                        backoff_secs = backoff.as_secs(),
                        error = %e,
                        "Transport error, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };

            let limits = parse_rate_limit_headers(&response.headers);
            self.coordinator
                .register_request(
                    1,
                    limits.map(|l| l.remaining),
                    limits.map(|l| l.reset_at),
                )
                .await;
            if let Some(info) = limits {
                self.coordinator
                    .handle_rate_limit_response(info.remaining, info.reset_at);
            }

            if response.is_success() {
                return Ok(response);
            }

            match response.status {
                401 => return Err(GitHubError::AuthRequired),
                403 => {
                    let exhausted = limits.filter(|info| info.remaining == 0);
                    let Some(info) = exhausted else {
                        return Err(GitHubError::AuthRequired);
                    };

                    let now = Utc::now();
                    if info.reset_at > now {
                        // Gate already closed via handle_rate_limit_response;
                        // loop back around and park at it.
                        throttle_rounds += 1;
                        if throttle_rounds >= self.retry.max_attempts {
                            return Err(GitHubError::RateLimited {
                                reset_at: info.reset_at,
                            });
                        }
                        continue;
                    }

                    // Reset time in the past: either our clock or the API's
                    // is skewed. Short escalating retries, then sleep to just
                    // past the next top of the hour.
                    if skew_attempts < self.retry.skew_retries {
                        skew_attempts += 1;
                        let wait = Duration::from_secs(15) * 2u32.pow(skew_attempts - 1);
                        tracing::warn!(
                            url,
                            wait_secs = wait.as_secs(),
                            "Rate limited with stale reset time, retrying"
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    if !slept_past_hour {
                        slept_past_hour = true;
                        let into_hour = now.timestamp().rem_euclid(3600) as u64;
                        let wait = Duration::from_secs(3600 - into_hour + 5);
                        tracing::warn!(
                            url,
                            wait_secs = wait.as_secs(),
                            "Rate limited with stale reset time, waiting for next hour"
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    return Err(GitHubError::RateLimited {
                        reset_at: info.reset_at,
                    });
                }
                404 => return Err(GitHubError::not_found(url)),
                status if status >= 500 => {
                    failures += 1;
                    if failures >= self.retry.max_attempts {
                        tracing::error!(url, status, attempts = failures, "Request failed");
                        return Err(GitHubError::api(status, body_excerpt(&response)));
                    }
                    let backoff = self.retry.initial_backoff * 2u32.pow(failures - 1);
                    tracing::warn!(
                        url,
                        status,
                        attempt = failures,
                        backoff_secs = backoff.as_secs(),
                        "Server error, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                status => return Err(GitHubError::api(status, body_excerpt(&response))),
            }
        }
    }
}

fn body_excerpt(response: &HttpResponse) -> String {
    let text = String::from_utf8_lossy(&response.body);
    let mut excerpt: String = text.chars().take(200).collect();
    if text.chars().count() > 200 {
        excerpt.push('…');
    }
    excerpt
}

fn decode_json<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, GitHubError> {
    serde_json::from_slice(&response.body).map_err(|e| GitHubError::decode(e.to_string()))
}

#[async_trait]
impl ActionsApi for GitHubClient {
    async fn list_workflow_runs(&self, query: &RunQuery) -> Result<RunsBatch, GitHubError> {
        let mut next = Some(self.runs_url(query)?);
        let mut total_count = 0;
        let mut first_page = true;
        let mut runs = Vec::new();

        while let Some(url) = next {
            let response = self.get(&url).await?;
            let page: RunsPage = decode_json(&response)?;

            if first_page {
                total_count = page.total_count;
                first_page = false;
            }
            runs.extend(page.workflow_runs);

            next = response
                .header("link")
                .map(parse_link_header)
                .and_then(|link| link.next_url);
        }

        tracing::debug!(
            owner = %query.owner,
            repo = %query.repo,
            workflow = %query.workflow,
            total_count,
            fetched = runs.len(),
            "Listed workflow runs"
        );

        Ok(RunsBatch { total_count, runs })
    }

    async fn list_jobs(
        &self,
        owner: &str,
        repo: &str,
        run_id: i64,
    ) -> Result<Vec<RawJob>, GitHubError> {
        let mut next = Some(self.jobs_url(owner, repo, run_id));
        let mut jobs = Vec::new();

        while let Some(url) = next {
            let response = self.get(&url).await?;
            let page: JobsPage = decode_json(&response)?;
            jobs.extend(page.jobs);

            next = response
                .header("link")
                .map(parse_link_header)
                .and_then(|link| link.next_url);
        }

        Ok(jobs)
    }

    async fn validate_token(&self) -> Result<(), TokenError> {
        if let Some(pacer) = &self.pacer {
            pacer.wait().await;
        }

        let request = HttpRequest {
            url: format!("{}/user", self.api_root()),
            headers: self.default_headers(),
        };

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| TokenError::api(format!("Failed to reach GitHub API: {e}")))?;

        let limits = parse_rate_limit_headers(&response.headers);
        self.coordinator
            .register_request(
                1,
                limits.map(|l| l.remaining),
                limits.map(|l| l.reset_at),
            )
            .await;

        match response.status {
            200 => Ok(()),
            401 => Err(TokenError::authentication(
                "GitHub token is invalid or expired",
            )),
            403 => {
                if limits.is_some_and(|info| info.remaining == 0) {
                    Err(TokenError::authentication("GitHub API rate limit exceeded"))
                } else {
                    Err(TokenError::authentication(
                        "GitHub token lacks required permissions",
                    ))
                }
            }
            status => Err(TokenError::authentication(format!(
                "Token validation failed with status {status}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MockTransport;
    use crate::ratelimit::DEFAULT_HOURLY_LIMIT;
    use chrono::TimeDelta;

    const BASE: &str = "https://api.test";

    fn client(transport: &MockTransport) -> GitHubClient {
        let coordinator = Arc::new(RateLimitCoordinator::new(DEFAULT_HOURLY_LIMIT));
        GitHubClient::new(Arc::new(transport.clone()), "test-token", coordinator)
            .with_base_url(BASE)
    }

    fn json_response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: vec![(
                "content-type".to_string(),
                "application/json".to_string(),
            )],
            body: body.as_bytes().to_vec(),
        }
    }

    fn with_limits(mut response: HttpResponse, remaining: u32, reset_at: DateTime<Utc>) -> HttpResponse {
        response.headers.push(("x-ratelimit-limit".to_string(), "5000".to_string()));
        response
            .headers
            .push(("x-ratelimit-remaining".to_string(), remaining.to_string()));
        response.headers.push((
            "x-ratelimit-reset".to_string(),
            reset_at.timestamp().to_string(),
        ));
        response
    }

    fn with_link(mut response: HttpResponse, next_url: &str) -> HttpResponse {
        response.headers.push((
            "link".to_string(),
            format!("<{next_url}>; rel=\"next\""),
        ));
        response
    }

    fn query() -> RunQuery {
        RunQuery {
            owner: "octo".to_string(),
            repo: "widgets".to_string(),
            workflow: "ci.yml".to_string(),
            branch: None,
            created: None,
        }
    }

    fn runs_url() -> String {
        format!("{BASE}/repos/octo/widgets/actions/workflows/ci.yml/runs?per_page=100")
    }

    const EMPTY_RUNS: &str = r#"{"total_count": 0, "workflow_runs": []}"#;

    fn run_json(id: i64) -> String {
        format!(
            r#"{{"id": {id}, "name": "CI", "status": "completed", "conclusion": "success",
                "created_at": "2025-06-01T10:00:00Z", "updated_at": "2025-06-01T10:05:00Z",
                "event": "push", "head_branch": "main", "run_number": {id}, "head_sha": "abc"}}"#
        )
    }

    #[test]
    fn created_filter_renders_range_syntax() {
        let start = DateTime::from_timestamp(1_748_736_000, 0).unwrap();
        let end = start + TimeDelta::days(7);

        assert_eq!(
            CreatedFilter::Between { start, end }.to_query(),
            "2025-06-01T00:00:00Z..2025-06-08T00:00:00Z"
        );
        assert_eq!(
            CreatedFilter::Since(start).to_query(),
            ">=2025-06-01T00:00:00Z"
        );
        assert_eq!(CreatedFilter::Until(end).to_query(), "<=2025-06-08T00:00:00Z");
    }

    #[test]
    fn runs_url_includes_branch_and_created() {
        let transport = MockTransport::new();
        let client = client(&transport);
        let mut query = query();
        query.branch = Some("main".to_string());
        query.created = Some(CreatedFilter::Since(
            DateTime::from_timestamp(1_748_736_000, 0).unwrap(),
        ));

        let url = client.runs_url(&query).unwrap();
        assert!(url.contains("per_page=100"));
        assert!(url.contains("branch=main"));
        assert!(url.contains("created=%3E%3D2025-06-01T00%3A00%3A00Z"));
    }

    #[test]
    fn parse_rate_limit_headers_reads_all_three() {
        let headers: HttpHeaders = vec![
            ("X-RateLimit-Limit".to_string(), "5000".to_string()),
            ("X-RateLimit-Remaining".to_string(), "4321".to_string()),
            ("X-RateLimit-Reset".to_string(), "1750000000".to_string()),
        ];
        let info = parse_rate_limit_headers(&headers).unwrap();
        assert_eq!(info.limit, 5000);
        assert_eq!(info.remaining, 4321);
        assert_eq!(info.reset_at.timestamp(), 1_750_000_000);

        assert!(parse_rate_limit_headers(&Vec::new()).is_none());
    }

    #[tokio::test]
    async fn list_workflow_runs_follows_link_pagination() {
        let transport = MockTransport::new();
        let page2 = format!("{BASE}/page2");

        let body1 = format!(
            r#"{{"total_count": 2, "workflow_runs": [{}]}}"#,
            run_json(1)
        );
        let body2 = format!(
            r#"{{"total_count": 2, "workflow_runs": [{}]}}"#,
            run_json(2)
        );
        transport.push_response(runs_url(), with_link(json_response(200, &body1), &page2));
        transport.push_response(&page2, json_response(200, &body2));

        let batch = client(&transport)
            .list_workflow_runs(&query())
            .await
            .expect("listing should succeed");

        assert_eq!(batch.total_count, 2);
        assert_eq!(
            batch.runs.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_retry_with_backoff_then_succeed() {
        let transport = MockTransport::new();
        transport.push_response(runs_url(), json_response(500, "boom"));
        transport.push_response(runs_url(), json_response(502, "bad gateway"));
        transport.push_response(runs_url(), json_response(200, EMPTY_RUNS));

        let batch = client(&transport)
            .list_workflow_runs(&query())
            .await
            .expect("should recover after retries");

        assert_eq!(batch.total_count, 0);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_exhaust_attempt_budget() {
        let transport = MockTransport::new();
        for _ in 0..5 {
            transport.push_error(runs_url(), "connection reset");
        }

        let err = client(&transport)
            .list_workflow_runs(&query())
            .await
            .expect_err("should fail after exhausting attempts");

        assert!(matches!(err, GitHubError::Network { .. }));
        assert_eq!(transport.request_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_transient_failures_share_one_budget() {
        let transport = MockTransport::new();
        transport.push_error(runs_url(), "connection reset");
        transport.push_response(runs_url(), json_response(500, "boom"));
        transport.push_error(runs_url(), "connection reset");
        transport.push_response(runs_url(), json_response(503, "unavailable"));
        transport.push_response(runs_url(), json_response(500, "boom"));

        let err = client(&transport)
            .list_workflow_runs(&query())
            .await
            .expect_err("should fail after five attempts");

        assert!(matches!(err, GitHubError::Api { status: 500, .. }));
        assert_eq!(transport.request_count(), 5);
    }

    #[tokio::test]
    async fn not_found_fails_fast() {
        let transport = MockTransport::new();
        transport.push_response(runs_url(), json_response(404, r#"{"message": "Not Found"}"#));

        let err = client(&transport)
            .list_workflow_runs(&query())
            .await
            .expect_err("404 should not retry");

        assert!(matches!(err, GitHubError::NotFound { .. }));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn unauthorized_fails_fast() {
        let transport = MockTransport::new();
        transport.push_response(runs_url(), json_response(401, "{}"));

        let err = client(&transport)
            .list_workflow_runs(&query())
            .await
            .expect_err("401 should not retry");
        assert!(matches!(err, GitHubError::AuthRequired));
    }

    #[tokio::test]
    async fn forbidden_without_exhausted_quota_is_auth_error() {
        let transport = MockTransport::new();
        let response = with_limits(
            json_response(403, "{}"),
            4000,
            Utc::now() + TimeDelta::minutes(30),
        );
        transport.push_response(runs_url(), response);

        let err = client(&transport)
            .list_workflow_runs(&query())
            .await
            .expect_err("permission 403 should not retry");
        assert!(matches!(err, GitHubError::AuthRequired));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_quota_waits_for_reset_then_retries() {
        let transport = MockTransport::new();
        let reset_at = Utc::now() + TimeDelta::seconds(30);
        transport.push_response(runs_url(), with_limits(json_response(403, "{}"), 0, reset_at));
        transport.push_response(runs_url(), json_response(200, EMPTY_RUNS));

        let batch = client(&transport)
            .list_workflow_runs(&query())
            .await
            .expect("should succeed after the reset wait");

        assert_eq!(batch.total_count, 0);
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_reset_time_escalates_then_recovers() {
        let transport = MockTransport::new();
        let stale = Utc::now() - TimeDelta::minutes(5);
        for _ in 0..3 {
            transport.push_response(runs_url(), with_limits(json_response(403, "{}"), 0, stale));
        }
        transport.push_response(runs_url(), json_response(200, EMPTY_RUNS));

        let batch = client(&transport)
            .list_workflow_runs(&query())
            .await
            .expect("should recover after skew retries");

        assert_eq!(batch.total_count, 0);
        assert_eq!(transport.request_count(), 4);
    }

    #[tokio::test]
    async fn limit_headers_are_registered_with_the_coordinator() {
        let transport = MockTransport::new();
        let coordinator = Arc::new(RateLimitCoordinator::new(DEFAULT_HOURLY_LIMIT));
        let client = GitHubClient::new(
            Arc::new(transport.clone()),
            "test-token",
            Arc::clone(&coordinator),
        )
        .with_base_url(BASE);

        let reset_at = Utc::now() + TimeDelta::minutes(42);
        transport.push_response(
            runs_url(),
            with_limits(json_response(200, EMPTY_RUNS), 4100, reset_at),
        );

        client
            .list_workflow_runs(&query())
            .await
            .expect("listing should succeed");

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.request_count, 1);
        assert_eq!(snapshot.api_remaining, Some(4100));
    }

    #[tokio::test]
    async fn requests_carry_auth_and_api_version_headers() {
        let transport = MockTransport::new();
        transport.push_response(runs_url(), json_response(200, EMPTY_RUNS));

        client(&transport)
            .list_workflow_runs(&query())
            .await
            .expect("listing should succeed");

        let requests = transport.requests();
        let headers = &requests[0].headers;
        assert_eq!(
            crate::http::header_get(headers, "authorization"),
            Some("Bearer test-token")
        );
        assert_eq!(
            crate::http::header_get(headers, "accept"),
            Some("application/vnd.github+json")
        );
        assert_eq!(
            crate::http::header_get(headers, "x-github-api-version"),
            Some(API_VERSION)
        );
    }

    #[tokio::test]
    async fn list_jobs_requests_all_attempts() {
        let transport = MockTransport::new();
        let url = format!("{BASE}/repos/octo/widgets/actions/runs/42/jobs?per_page=100&filter=all");
        transport.push_response(&url, json_response(200, r#"{"total_count": 0, "jobs": []}"#));

        let jobs = client(&transport)
            .list_jobs("octo", "widgets", 42)
            .await
            .expect("jobs listing should succeed");
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn validate_token_accepts_200() {
        let transport = MockTransport::new();
        transport.push_response(format!("{BASE}/user"), json_response(200, "{}"));
        client(&transport)
            .validate_token()
            .await
            .expect("valid token");
    }

    #[tokio::test]
    async fn validate_token_classifies_invalid_token() {
        let transport = MockTransport::new();
        transport.push_response(format!("{BASE}/user"), json_response(401, "{}"));

        let err = client(&transport)
            .validate_token()
            .await
            .expect_err("401 should fail validation");
        assert_eq!(err.to_string(), "GitHub token is invalid or expired");
    }

    #[tokio::test]
    async fn validate_token_classifies_rate_limit_and_permissions() {
        let transport = MockTransport::new();
        let exhausted = with_limits(json_response(403, "{}"), 0, Utc::now() + TimeDelta::hours(1));
        transport.push_response(format!("{BASE}/user"), exhausted);
        transport.push_response(format!("{BASE}/user"), json_response(403, "{}"));

        let client = client(&transport);

        let err = client.validate_token().await.expect_err("rate limited");
        assert_eq!(err.to_string(), "GitHub API rate limit exceeded");

        let err = client.validate_token().await.expect_err("no permissions");
        assert_eq!(err.to_string(), "GitHub token lacks required permissions");
    }

    #[tokio::test]
    async fn validate_token_reports_unreachable_api() {
        let transport = MockTransport::new();
        transport.push_error(format!("{BASE}/user"), "dns failure");

        let err = client(&transport)
            .validate_token()
            .await
            .expect_err("transport failure should fail validation");
        assert_eq!(err.kind, crate::github::error::TokenErrorKind::Api);
        assert!(err.to_string().starts_with("Failed to reach GitHub API"));
    }
}
