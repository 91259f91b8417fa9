//! Cadence - a GitHub Actions workflow telemetry pipeline.
//!
//! This library collects workflow run, job, and step timing data from the
//! GitHub Actions API into a local SQLite database, staying inside the
//! API's hourly quota while doing it.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cadence::{connect_and_migrate, Collector, CollectorConfig, GitHubClient,
//!               RateLimitCoordinator, Repository};
//!
//! let db = connect_and_migrate("sqlite://cadence.db?mode=rwc").await?;
//! let repository = Arc::new(Repository::new(db));
//!
//! let coordinator = Arc::new(RateLimitCoordinator::restore(5000, repository.clone()).await);
//! let transport = Arc::new(cadence::http::reqwest_transport::ReqwestTransport::with_timeout(
//!     std::time::Duration::from_secs(30),
//! )?);
//! let client = Arc::new(GitHubClient::new(transport, token, coordinator));
//!
//! let collector = Collector::new(client, repository, CollectorConfig::default());
//! let summary = collector.collect(request).await?;
//! ```

pub mod collect;
pub mod db;
pub mod entity;
pub mod github;
pub mod http;
pub mod migration;
pub mod model;
pub mod ratelimit;
pub mod repository;
pub mod task;

pub use collect::{
    CollectError, CollectProgress, CollectRequest, CollectSummary, Collector, CollectorConfig,
    ProgressCallback, RunStore, SaveOutcome,
};
pub use db::{connect, connect_and_migrate};
pub use github::{ActionsApi, CreatedFilter, GitHubClient, GitHubError, RetryPolicy, RunQuery,
    TokenError, TokenErrorKind};
pub use http::HttpTransport;
pub use model::{Job, MatrixConfig, RunStatus, Step, WorkflowRun, WorkflowScope};
pub use ratelimit::{
    ApiPacer, RateLimitCoordinator, RateLimitRecord, RateLimitSnapshot, RateLimitStore,
    DEFAULT_HOURLY_LIMIT, ENTERPRISE_HOURLY_LIMIT,
};
pub use repository::{Repository, RepositoryError};
pub use task::{run_collection, TaskManager, TaskProgress, TaskRecord, TaskStatus};
