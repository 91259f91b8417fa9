//! Command-line interface for the cadence telemetry collector.

mod commands;
mod config;
mod progress;

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::ingest::IngestArgs;
use crate::commands::limits::OutputFormat;
use crate::config::Config;

#[derive(Parser)]
#[command(
    name = "cadence",
    version,
    about = "Collect GitHub Actions workflow telemetry into a local SQLite database",
    after_long_help = r#"EXAMPLES:
    # Collect the last four weeks of a workflow's runs
    cadence ingest rust-lang rust ci.yml

    # A specific range on one branch
    cadence ingest octo widgets ci.yml --branch main --since 2025-06-01 --until 2025-06-30

    # Re-fetch runs that are already stored as finished
    cadence ingest octo widgets ci.yml --force-refresh

    # Check the remaining API budget
    cadence limits

CONFIGURATION:
    Configuration is read from ~/.config/cadence/config.toml, ./cadence.toml,
    and CADENCE_* environment variables, in that order of precedence.

    [database]
    url = "sqlite://~/.local/state/cadence/cadence.db"

    [github]
    token = "ghp_..."

    [collect]
    hourly_limit = 5000
    rps = 10

ENVIRONMENT VARIABLES:
    GITHUB_TOKEN             GitHub API token (checked before the config file)
    CADENCE_GITHUB_TOKEN     GitHub API token
    CADENCE_DATABASE_URL     Database connection URL
    RUST_LOG                 Log filter (default: cadence=info,cadence_cli=info)
"#
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect runs, jobs, and steps for one workflow
    Ingest {
        /// Repository owner (user or organization)
        owner: String,
        /// Repository name
        repo: String,
        /// Workflow file name or id (e.g. ci.yml)
        workflow: String,
        /// Only collect runs on this branch
        #[arg(short, long)]
        branch: Option<String>,
        /// How many weeks back to collect (ignored when --since is given)
        #[arg(short, long, default_value_t = 4)]
        weeks: u32,
        /// Collect runs created at or after this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_timestamp)]
        since: Option<DateTime<Utc>>,
        /// Collect runs created at or before this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_timestamp)]
        until: Option<DateTime<Utc>>,
        /// Do not store runs that have not finished yet
        #[arg(long)]
        skip_incomplete: bool,
        /// Re-fetch runs that are already stored as finished
        #[arg(long)]
        force_refresh: bool,
        /// Proactive request pacing, in requests per second
        #[arg(long)]
        rps: Option<u32>,
        /// Hourly API quota to budget against (15000 for Enterprise Cloud)
        #[arg(long)]
        hourly_limit: Option<u32>,
    },
    /// Show the persisted API budget for the current hour
    Limits {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Check that the configured GitHub token works
    Validate,
    /// Store a GitHub token in the config file
    Login {
        /// Token to store; read from GITHUB_TOKEN or prompted when omitted
        #[arg(long)]
        token: Option<String>,
    },
    /// Manage the database schema
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Roll back the last migration
    Down,
    /// Show migration status
    Status,
    /// Drop all tables and reapply all migrations
    Fresh,
}

/// Accept either a full RFC 3339 timestamp or a bare date (midnight UTC).
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err(format!(
        "'{value}' is not an RFC 3339 timestamp or YYYY-MM-DD date"
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present (for GITHUB_TOKEN etc.)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cadence=info,cadence_cli=info")),
        )
        .with_target(false)
        .init();

    let config = Config::load();

    let database_url = config.database_url().ok_or(
        "Failed to determine database URL. Set CADENCE_DATABASE_URL or configure [database] url.",
    )?;

    // Ensure the parent directory exists for SQLite databases.
    if let Some(raw_path) = database_url.strip_prefix("sqlite://") {
        let db_path = Path::new(raw_path.split('?').next().unwrap_or(raw_path));
        if db_path.is_relative() && !db_path.exists() {
            tracing::warn!(
                path = %db_path.display(),
                "Database path is relative; a new database will be created in the current directory"
            );
        }
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }
    }

    match cli.command {
        Commands::Ingest {
            owner,
            repo,
            workflow,
            branch,
            weeks,
            since,
            until,
            skip_incomplete,
            force_refresh,
            rps,
            hourly_limit,
        } => {
            commands::ingest::handle_ingest(
                IngestArgs {
                    owner,
                    repo,
                    workflow,
                    branch,
                    weeks,
                    since,
                    until,
                    skip_incomplete,
                    force_refresh,
                    rps,
                    hourly_limit,
                },
                &config,
                &database_url,
            )
            .await?
        }
        Commands::Limits { output } => {
            commands::limits::handle_limits(output, config.collect.hourly_limit, &database_url)
                .await?
        }
        Commands::Validate => commands::validate::handle_validate(&config).await?,
        Commands::Login { token } => commands::login::handle_login(token.as_deref())?,
        Commands::Migrate { action } => {
            commands::migrate::handle_migrate(action, &database_url).await?
        }
    }

    Ok(())
}
