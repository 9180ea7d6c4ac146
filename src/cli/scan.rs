use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use crate::config::Config;
use crate::security::EventKind;

#[derive(Args)]
pub struct ScanArgs {
    /// Event type: created, modified, deleted or moved
    pub event: EventKind,

    /// Absolute path of the affected file
    pub path: PathBuf,

    /// Skip the admission gate (ignore patterns, skill scope, throttle)
    #[arg(long)]
    pub force: bool,

    /// Print the alert as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ScanArgs, config: &Config) -> Result<()> {
    let engine = super::open_engine(config)?;
    let path = std::path::absolute(&args.path)?;

    let alert = if args.force {
        engine.scan(args.event, &path)?
    } else {
        engine.handle_event(args.event, &path)?
    };

    match alert {
        Some(alert) if args.json => println!("{}", serde_json::to_string_pretty(&alert)?),
        Some(alert) => println!("{}", alert),
        None if args.json => println!("null"),
        None => println!("No alert for {} event on {}", args.event, path.display()),
    }
    Ok(())
}
