use anyhow::Result;
use clap::Args;

use crate::config::Config;

#[derive(Args)]
pub struct VerifyArgs {
    /// Print alerts as JSON
    #[arg(long)]
    pub json: bool,
}

/// Exits with an error when any baselined file has drifted.
pub async fn run(args: VerifyArgs, config: &Config) -> Result<()> {
    let engine = super::open_engine(config)?;
    let alerts = tokio::task::spawn_blocking(move || engine.verify_all()).await??;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&alerts)?);
    } else if alerts.is_empty() {
        println!("No integrity violations detected.");
    } else {
        for alert in &alerts {
            println!("{}", alert);
            let details = alert.details_summary();
            if !details.is_empty() {
                println!("    {}", details);
            }
        }
    }

    if !alerts.is_empty() {
        anyhow::bail!("{} integrity alert(s)", alerts.len());
    }
    Ok(())
}
