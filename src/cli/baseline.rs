use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use crate::config::Config;
use crate::security::EngineError;

#[derive(Args)]
pub struct BaselineArgs {
    /// Directories to baseline (default: watch.watched_paths from config)
    pub dirs: Vec<PathBuf>,
}

pub async fn run(args: BaselineArgs, config: &Config) -> Result<()> {
    let dirs = if args.dirs.is_empty() {
        config.watched_paths()
    } else {
        args.dirs
    };
    if dirs.is_empty() {
        anyhow::bail!("No directories given and watch.watched_paths is empty");
    }

    let engine = super::open_engine(config)?;
    let cancel = Arc::new(AtomicBool::new(false));

    let cancel_on_signal = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current file");
            cancel_on_signal.store(true, Ordering::Relaxed);
        }
    });

    let results = tokio::task::spawn_blocking(move || {
        let mut results = Vec::new();
        for dir in dirs {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let result = engine.baseline(&dir, &cancel);
            let stop = matches!(result, Err(EngineError::Cancelled { .. }));
            results.push((dir, result));
            if stop {
                break;
            }
        }
        results
    })
    .await?;
    signal_task.abort();

    let mut total = 0;
    let mut failures = 0;
    for (dir, result) in results {
        match result {
            Ok(count) => {
                total += count;
                println!("Baselined {} file(s) under {}", count, dir.display());
            }
            Err(EngineError::Cancelled { baselined }) => {
                total += baselined;
                println!(
                    "Cancelled: {} file(s) under {} were baselined before the interrupt",
                    baselined,
                    dir.display()
                );
                failures += 1;
            }
            Err(e) => {
                eprintln!("Failed to baseline {}: {}", dir.display(), e);
                failures += 1;
            }
        }
    }

    println!("Total: {} file(s)", total);
    if failures > 0 {
        anyhow::bail!(
            "{} director{} not fully baselined",
            failures,
            if failures == 1 { "y" } else { "ies" }
        );
    }
    Ok(())
}
