use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use crate::config::Config;

#[derive(Args)]
pub struct ReportArgs {
    /// Output file
    #[arg(short, long, default_value = "security_audit_report.md")]
    pub output: PathBuf,

    /// Include events on or after this date (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub since: Option<String>,

    /// Include events on or before this date (default: now)
    #[arg(long)]
    pub until: Option<String>,
}

pub async fn run(args: ReportArgs, config: &Config) -> Result<()> {
    let (start, end) = super::parse_range(args.since.as_deref(), args.until.as_deref())?;
    let engine = super::open_engine(config)?;

    let output = args.output;
    let written =
        tokio::task::spawn_blocking(move || engine.export_report(&output, start, end)).await??;

    println!("Report written to {}", written.display());
    Ok(())
}
