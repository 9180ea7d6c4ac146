pub mod audit;
pub mod baseline;
pub mod config;
pub mod paths;
pub mod report;
pub mod scan;
pub mod verify;
pub mod watch;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::security::SecurityEngine;

#[derive(Parser)]
#[command(name = "owlwatch")]
#[command(author, version, about = "Security audit engine for watched skill directories")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "OWLWATCH_LOG_JSON")]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch configured directories and report alerts as they happen
    Watch(watch::WatchArgs),

    /// Record SHA-256 baselines for every file under the given directories
    Baseline(baseline::BaselineArgs),

    /// Check baselined files against their recorded state
    Verify(verify::VerifyArgs),

    /// Write a Markdown audit report
    Report(report::ReportArgs),

    /// Show audit log entries
    Audit(audit::AuditArgs),

    /// Feed a single file event through the engine
    Scan(scan::ScanArgs),

    /// Configuration management
    Config(config::ConfigArgs),

    /// Show resolved directory paths
    Paths,
}

/// Open the engine described by `config`.
pub fn open_engine(config: &Config) -> Result<SecurityEngine> {
    let settings = config.engine_settings();
    let dir = settings.security_dir.clone();
    SecurityEngine::open(settings)
        .with_context(|| format!("Failed to open security store at {}", dir.display()))
}

/// Parse a `--since`/`--until` bound: RFC 3339, or a bare `YYYY-MM-DD`
/// taken as the start (or, with `end_of_day`, the end) of that UTC day.
pub fn parse_time_bound(value: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}': use YYYY-MM-DD or RFC 3339", value))?;
    let time = if end_of_day {
        date.and_hms_nano_opt(23, 59, 59, 999_999_999)
    } else {
        date.and_hms_opt(0, 0, 0)
    }
    .with_context(|| format!("Invalid date '{}'", value))?;
    Ok(time.and_utc())
}

pub fn parse_range(
    since: Option<&str>,
    until: Option<&str>,
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    let start = since.map(|s| parse_time_bound(s, false)).transpose()?;
    let end = until.map(|s| parse_time_bound(s, true)).transpose()?;
    if let (Some(s), Some(e)) = (start, end)
        && s > e
    {
        anyhow::bail!("--since must not be later than --until");
    }
    Ok((start, end))
}
