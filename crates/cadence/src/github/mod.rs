//! GitHub Actions API integration: client, payload types, conversion.

pub mod client;
pub mod convert;
pub mod error;
pub mod pagination;
pub mod types;

pub use client::{
    parse_rate_limit_headers, ActionsApi, CreatedFilter, GitHubClient, RetryPolicy, RunQuery,
    RunsBatch,
};
pub use error::{short_error_message, GitHubError, TokenError, TokenErrorKind};
