//! Store a GitHub token in the config file.

use console::{Term, style};

use crate::config::Config;

pub(crate) fn handle_login(token: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let is_tty = Term::stdout().is_term();

    let token = match token {
        Some(t) => t.trim().to_string(),
        None => read_token(is_tty)?,
    };
    if token.is_empty() {
        return Err("Empty token provided".into());
    }

    let config_path = Config::save_github_token(&token)?;

    if is_tty {
        println!(
            "{} GitHub token saved to: {}",
            style("✓").green().bold(),
            config_path.display()
        );
        println!();
        println!("You can now run:");
        println!("  cadence validate");
        println!("  cadence ingest <owner> <repo> <workflow>");
    } else {
        tracing::info!(config_path = %config_path.display(), "GitHub token saved");
    }

    Ok(())
}

fn read_token(is_tty: bool) -> Result<String, Box<dyn std::error::Error>> {
    if let Ok(token) = std::env::var("GITHUB_TOKEN") {
        return Ok(token.trim().to_string());
    }

    if is_tty {
        println!(
            "Create a token with read access to Actions on:\n\
             https://github.com/settings/tokens\n"
        );
        let token = rpassword::prompt_password("Enter GitHub token: ")?;
        return Ok(token.trim().to_string());
    }

    Err("No token provided. Pass --token or set GITHUB_TOKEN.".into())
}
