//! Configuration file support for cadence.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `CADENCE_`, e.g., `CADENCE_DATABASE_URL`)
//! 3. Config file (~/.config/cadence/config.toml or ./cadence.toml)
//! 4. Built-in defaults
//!
//! The database URL defaults to `sqlite://~/.local/state/cadence/cadence.db` on
//! Linux (using the XDG state directory) if not explicitly configured.
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "sqlite://~/.local/state/cadence/cadence.db"  # optional, this is the default
//!
//! [github]
//! token = "ghp_..."  # or use GITHUB_TOKEN / CADENCE_GITHUB_TOKEN env vars
//!
//! [collect]
//! hourly_limit = 5000
//! rps = 10
//! list_concurrency = 5
//! detail_concurrency = 10
//! ```

use std::path::PathBuf;
use std::{fs, io};

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// GitHub configuration.
    pub github: GitHubConfig,
    /// Default collection options.
    pub collect: CollectConfig,
}

/// Database configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL.
    /// Defaults to `sqlite://~/.local/state/cadence/cadence.db` if not specified.
    pub url: Option<String>,
}

/// GitHub configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token.
    /// Can also be set via the GITHUB_TOKEN or CADENCE_GITHUB_TOKEN
    /// environment variables.
    pub token: Option<String>,
}

/// Default collection options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    /// Hourly API quota to budget against.
    pub hourly_limit: u32,
    /// Proactive request pacing, in requests per second.
    pub rps: u32,
    /// Concurrent listing requests.
    pub list_concurrency: usize,
    /// Concurrent detail (jobs) requests.
    pub detail_concurrency: usize,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            hourly_limit: cadence::DEFAULT_HOURLY_LIMIT,
            rps: cadence::ratelimit::DEFAULT_RPS,
            list_concurrency: 5,
            detail_concurrency: 10,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/cadence/config.toml)
    /// 3. Local config file (./cadence.toml)
    /// 4. Environment variables with CADENCE_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        // Add XDG config file if it exists
        if let Some(proj_dirs) = ProjectDirs::from("", "", "cadence") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        // Add local config file (higher priority than XDG)
        let local_config = PathBuf::from("cadence.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./cadence.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // Add CADENCE_ prefixed environment variables
        // e.g., CADENCE_DATABASE_URL -> database.url
        builder = builder.add_source(
            Environment::with_prefix("CADENCE")
                .separator("_")
                .try_parsing(true),
        );

        // Build the config and deserialize
        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Get the database URL, falling back to the default state directory path.
    ///
    /// If no database URL is configured, defaults to
    /// `sqlite://~/.local/state/cadence/cadence.db?mode=rwc` on Linux (using
    /// the XDG state directory) or the platform-appropriate equivalent.
    /// The `mode=rwc` parameter enables read-write access and creates the file
    /// if it doesn't exist.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("cadence.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    /// Get the GitHub token.
    ///
    /// The plain GITHUB_TOKEN environment variable wins over the config file,
    /// so CI environments that already export it need no extra setup.
    pub fn github_token(&self) -> Option<String> {
        std::env::var("GITHUB_TOKEN")
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| self.github.token.clone())
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "cadence").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/cadence` or `~/.local/state/cadence`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "cadence").map(|dirs| {
            // state_dir() returns None on macOS/Windows, fall back to data_dir
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }

    /// Save a GitHub token to the config file.
    ///
    /// Creates the config file and parent directories if they don't exist.
    /// If a config file already exists, it updates only the `[github]` section,
    /// preserving formatting, comments, and other settings.
    pub fn save_github_token(token: &str) -> io::Result<PathBuf> {
        use toml_edit::{DocumentMut, value};

        let config_path = Self::default_config_path().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine config directory",
            )
        })?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Read existing config or start fresh
        let content = if config_path.exists() {
            fs::read_to_string(&config_path)?
        } else {
            String::new()
        };

        // Parse as TOML document (preserves formatting and comments)
        let mut doc: DocumentMut = content.parse().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("Invalid TOML: {}", e))
        })?;

        // Ensure [github] table exists and set the token
        if !doc.contains_key("github") {
            doc["github"] = toml_edit::table();
        }
        doc["github"]["token"] = value(token);

        // Write back to file
        fs::write(&config_path, doc.to_string())?;
        Ok(config_path)
    }
}
