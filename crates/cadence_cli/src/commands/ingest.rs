//! Collect workflow runs for one workflow into the local database.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use console::{Term, style};

use cadence::http::reqwest_transport::ReqwestTransport;
use cadence::{
    ActionsApi, ApiPacer, CollectRequest, CollectSummary, Collector, CollectorConfig, GitHubClient,
    RateLimitCoordinator, RateLimitSnapshot, Repository, TokenErrorKind, WorkflowScope,
    connect_and_migrate,
};

use crate::config::Config;
use crate::progress::LoggingReporter;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) struct IngestArgs {
    pub owner: String,
    pub repo: String,
    pub workflow: String,
    pub branch: Option<String>,
    pub weeks: u32,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub skip_incomplete: bool,
    pub force_refresh: bool,
    pub rps: Option<u32>,
    pub hourly_limit: Option<u32>,
}

pub(crate) async fn handle_ingest(
    args: IngestArgs,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let token = config
        .github_token()
        .ok_or("No GitHub token configured. Set GITHUB_TOKEN or run: cadence login")?;

    let until = args.until.unwrap_or_else(Utc::now);
    let since = args
        .since
        .unwrap_or_else(|| until - TimeDelta::weeks(i64::from(args.weeks)));
    if since >= until {
        return Err(format!("--since ({since}) must be before --until ({until})").into());
    }

    let db = connect_and_migrate(database_url).await?;
    let repository = Arc::new(Repository::new(db));

    // One coordinator per process; it is seeded from the persisted bucket so
    // back-to-back invocations inside the same hour share one budget.
    let hourly_limit = args.hourly_limit.unwrap_or(config.collect.hourly_limit);
    let coordinator = Arc::new(
        RateLimitCoordinator::restore(
            hourly_limit,
            Arc::clone(&repository) as Arc<dyn cadence::RateLimitStore>,
        )
        .await,
    );

    let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
    let transport = Arc::new(ReqwestTransport::new(http));

    let rps = args.rps.unwrap_or(config.collect.rps);
    let client = Arc::new(
        GitHubClient::new(transport, token, Arc::clone(&coordinator))
            .with_pacer(ApiPacer::new(rps)),
    );

    // Fail fast on a bad token before any windows are listed.
    if let Err(e) = client.validate_token().await {
        let message = match e.kind {
            TokenErrorKind::Authentication => format!("GitHub authentication failed: {e}"),
            _ => format!("Token validation failed: {e}"),
        };
        return Err(message.into());
    }

    let collector_config = CollectorConfig {
        list_concurrency: config.collect.list_concurrency,
        detail_concurrency: config.collect.detail_concurrency,
        ..CollectorConfig::default()
    };
    let request = CollectRequest {
        scope: WorkflowScope::new(args.owner, args.repo, args.workflow),
        branch: args.branch,
        since,
        until,
        skip_incomplete: args.skip_incomplete,
        force_refresh: args.force_refresh,
    };

    let collector = Collector::new(
        Arc::clone(&client),
        Arc::clone(&repository),
        collector_config,
    )
    .with_progress(LoggingReporter::new().into_callback());

    let summary = collector
        .collect(request)
        .await
        .map_err(|e| format!("Collection failed: {e}"))?;

    print_summary(&summary, &coordinator.snapshot());
    Ok(())
}

fn print_summary(summary: &CollectSummary, limits: &RateLimitSnapshot) {
    if Term::stdout().is_term() {
        println!();
        println!("{} Collection complete", style("✓").green().bold());
        println!("  collected:          {}", summary.runs_collected);
        println!("  updated:            {}", summary.runs_updated);
        println!("  skipped (stored):   {}", summary.runs_skipped);
        println!("  incomplete stored:  {}", summary.incomplete_stored);
        println!("  incomplete skipped: {}", summary.incomplete_skipped);
        println!("  windows split:      {}", summary.windows_split);
        println!(
            "  API budget:         {}/{} requests this hour",
            limits.request_count, limits.hourly_limit
        );
        if !summary.errors.is_empty() {
            println!();
            println!(
                "{} {} run(s) failed:",
                style("⚠").yellow().bold(),
                summary.errors.len()
            );
            for error in &summary.errors {
                println!("  {error}");
            }
        }
    } else {
        tracing::info!(
            collected = summary.runs_collected,
            updated = summary.runs_updated,
            skipped = summary.runs_skipped,
            incomplete_stored = summary.incomplete_stored,
            incomplete_skipped = summary.incomplete_skipped,
            windows_split = summary.windows_split,
            errors = summary.errors.len(),
            requests_used = limits.request_count,
            "Collection complete"
        );
    }
}
