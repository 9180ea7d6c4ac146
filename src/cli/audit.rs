use anyhow::Result;
use clap::Args;

use crate::config::Config;
use crate::security::{AuditEntry, format_size};

#[derive(Args)]
pub struct AuditArgs {
    /// Include entries on or after this date (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub since: Option<String>,

    /// Include entries on or before this date
    #[arg(long)]
    pub until: Option<String>,

    /// Print entries as JSON
    #[arg(long)]
    pub json: bool,

    /// Show only the most recent N entries (0 = all)
    #[arg(short = 'n', long, default_value_t = 50)]
    pub limit: usize,
}

pub async fn run(args: AuditArgs, config: &Config) -> Result<()> {
    let (start, end) = super::parse_range(args.since.as_deref(), args.until.as_deref())?;
    let engine = super::open_engine(config)?;

    let entries = engine.read_range(start, end)?;
    let shown = tail(&entries, args.limit);

    if args.json {
        println!("{}", serde_json::to_string_pretty(shown)?);
        return Ok(());
    }

    if shown.is_empty() {
        println!("No audit entries in the selected period.");
        return Ok(());
    }
    for entry in shown {
        println!("{}", format_entry(entry));
    }
    if shown.len() < entries.len() {
        println!(
            "({} of {} entries shown; use --limit 0 for all)",
            shown.len(),
            entries.len()
        );
    }
    Ok(())
}

fn tail(entries: &[AuditEntry], limit: usize) -> &[AuditEntry] {
    if limit == 0 {
        entries
    } else {
        &entries[entries.len().saturating_sub(limit)..]
    }
}

fn format_entry(entry: &AuditEntry) -> String {
    let size = entry
        .file_size
        .map(format_size)
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}  {:<8}  {:>9}  {}",
        entry.timestamp, entry.event_type, size, entry.path
    )
}
