//! Show the persisted API budget for the current hour.

use chrono::{DateTime, TimeDelta, Utc};
use clap::ValueEnum;

use cadence::{RateLimitRecord, Repository, connect_and_migrate};

/// Output format for rate limit display.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

/// Handle the limits command.
pub(crate) async fn handle_limits(
    output: OutputFormat,
    hourly_limit: u32,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = connect_and_migrate(database_url).await?;
    let repository = Repository::new(db);

    match repository.load_rate_limit().await? {
        Some(record) => {
            let display = RateLimitDisplay::from_record(&record, hourly_limit, Utc::now());
            display.print(output);
        }
        None => {
            println!("No rate limit state recorded yet. Run a collection first:");
            println!("  cadence ingest <owner> <repo> <workflow>");
        }
    }

    Ok(())
}

/// Rate limit information for display.
#[derive(Debug, Clone, serde::Serialize, tabled::Tabled)]
pub(crate) struct RateLimitDisplay {
    #[tabled(rename = "Hour Started")]
    #[serde(rename = "hour_start")]
    pub hour_start: String,
    #[tabled(rename = "Requests Used")]
    pub requests_used: String,
    #[tabled(rename = "Budget")]
    pub budget: String,
    #[tabled(rename = "Usage %")]
    pub usage_percent: String,
    #[tabled(rename = "API Remaining")]
    pub api_remaining: String,
    #[tabled(rename = "Resets In")]
    pub reset_in: String,
    #[tabled(rename = "Updated")]
    pub updated_at: String,
}

impl RateLimitDisplay {
    pub(crate) fn from_record(
        record: &RateLimitRecord,
        hourly_limit: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let usage_percent = if hourly_limit > 0 {
            (record.request_count as f64 / f64::from(hourly_limit)) * 100.0
        } else {
            0.0
        };

        // Prefer the reset the API reported; otherwise the bucket rolls at
        // the top of the next hour.
        let reset_at = record
            .api_reset_at
            .unwrap_or(record.hour_start + TimeDelta::hours(1));
        let reset_duration = reset_at.signed_duration_since(now);
        let reset_in = if reset_duration.num_seconds() > 0 {
            format_duration(reset_duration)
        } else {
            "now".to_string()
        };

        Self {
            hour_start: record.hour_start.format("%Y-%m-%d %H:%M UTC").to_string(),
            requests_used: record.request_count.to_string(),
            budget: hourly_limit.to_string(),
            usage_percent: format!("{:.1}%", usage_percent),
            api_remaining: record
                .api_remaining
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string()),
            reset_in,
            updated_at: record
                .updated_at
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string(),
        }
    }

    pub(crate) fn print(self, format: OutputFormat) {
        match format {
            OutputFormat::Table => {
                let mut table = tabled::Table::new(vec![self]);
                table.with(tabled::settings::Style::rounded());
                println!("{}", table);
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&self).unwrap());
            }
        }
    }
}

/// Format a duration in a human-readable way.
fn format_duration(duration: chrono::Duration) -> String {
    let total_secs = duration.num_seconds();
    if total_secs < 60 {
        format!("{}s", total_secs)
    } else if total_secs < 3600 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else {
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record() -> RateLimitRecord {
        let hour_start = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        RateLimitRecord {
            hour_start,
            request_count: 1250,
            api_remaining: Some(3750),
            api_reset_at: Some(hour_start + TimeDelta::minutes(45)),
            updated_at: hour_start + TimeDelta::minutes(15),
        }
    }

    #[test]
    fn output_format_default_is_table() {
        assert!(matches!(OutputFormat::default(), OutputFormat::Table));
    }

    #[test]
    fn format_duration_handles_seconds_minutes_and_hours() {
        assert_eq!(format_duration(chrono::Duration::seconds(42)), "42s");
        assert_eq!(format_duration(chrono::Duration::seconds(120)), "2m");
        assert_eq!(format_duration(chrono::Duration::seconds(125)), "2m 5s");
        assert_eq!(format_duration(chrono::Duration::seconds(3600)), "1h");
        assert_eq!(format_duration(chrono::Duration::seconds(3900)), "1h 5m");
    }

    #[test]
    fn from_record_formats_percent_and_reset() {
        let record = sample_record();
        let now = record.hour_start + TimeDelta::minutes(15);
        let display = RateLimitDisplay::from_record(&record, 5000, now);

        assert_eq!(display.requests_used, "1250");
        assert_eq!(display.budget, "5000");
        assert_eq!(display.usage_percent, "25.0%");
        assert_eq!(display.api_remaining, "3750");
        assert_eq!(display.reset_in, "30m");
        assert!(display.hour_start.contains("UTC"));
    }

    #[test]
    fn from_record_without_api_headers_uses_the_hour_boundary() {
        let mut record = sample_record();
        record.api_remaining = None;
        record.api_reset_at = None;

        let now = record.hour_start + TimeDelta::minutes(40);
        let display = RateLimitDisplay::from_record(&record, 5000, now);

        assert_eq!(display.api_remaining, "-");
        assert_eq!(display.reset_in, "20m");
    }

    #[test]
    fn from_record_past_reset_reports_now() {
        let record = sample_record();
        let now = record.hour_start + TimeDelta::hours(2);
        let display = RateLimitDisplay::from_record(&record, 5000, now);
        assert_eq!(display.reset_in, "now");
    }

    #[test]
    fn print_supports_json_and_table() {
        let record = sample_record();
        let display = RateLimitDisplay::from_record(&record, 5000, Utc::now());

        // Smoke tests: this should not panic in either output mode.
        display.clone().print(OutputFormat::Json);
        display.print(OutputFormat::Table);
    }
}
