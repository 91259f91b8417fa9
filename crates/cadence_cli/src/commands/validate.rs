//! Check that the configured GitHub token works.

use std::sync::Arc;
use std::time::Duration;

use console::{Term, style};

use cadence::http::reqwest_transport::ReqwestTransport;
use cadence::{ActionsApi, DEFAULT_HOURLY_LIMIT, GitHubClient, RateLimitCoordinator};

use crate::config::Config;

pub(crate) async fn handle_validate(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let token = config
        .github_token()
        .ok_or("No GitHub token configured. Set GITHUB_TOKEN or run: cadence login")?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let transport = Arc::new(ReqwestTransport::new(http));
    let coordinator = Arc::new(RateLimitCoordinator::new(DEFAULT_HOURLY_LIMIT));
    let client = GitHubClient::new(transport, token, coordinator);

    client.validate_token().await.map_err(|e| e.to_string())?;

    if Term::stdout().is_term() {
        println!("{} GitHub token is valid", style("✓").green().bold());
    } else {
        tracing::info!("GitHub token is valid");
    }

    Ok(())
}
