use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::Config;
use crate::watcher::{SecurityWatcher, StdoutSink};

#[derive(Args)]
pub struct WatchArgs {
    /// Directories to watch (default: watch.watched_paths from config)
    pub paths: Vec<PathBuf>,

    /// Print alerts as JSON lines
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: WatchArgs, config: &Config) -> Result<()> {
    let roots = if args.paths.is_empty() {
        config.watched_paths()
    } else {
        args.paths
    };
    if roots.is_empty() {
        anyhow::bail!(
            "Nothing to watch. Pass directories or set watch.watched_paths in {}",
            config.paths.config_file().display()
        );
    }

    let pid_file = config.paths.pid_file();
    claim_pid_file(&pid_file)?;

    let result = watch_until_interrupted(&roots, args.json, config).await;

    if let Err(e) = fs::remove_file(&pid_file) {
        warn!("Failed to remove PID file {}: {}", pid_file.display(), e);
    }
    result
}

async fn watch_until_interrupted(roots: &[PathBuf], json: bool, config: &Config) -> Result<()> {
    let engine = super::open_engine(config)?;
    let watcher = SecurityWatcher::new(engine, roots, StdoutSink::new(json))?;

    info!(
        "Watching {} director{} (Ctrl-C to stop)",
        watcher.roots().len(),
        if watcher.roots().len() == 1 { "y" } else { "ies" }
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down watchers");

    tokio::task::spawn_blocking(move || watcher.shutdown()).await?;
    Ok(())
}

/// Write our PID, refusing to start when another live watcher owns the file.
fn claim_pid_file(pid_file: &Path) -> Result<()> {
    if pid_file.exists() {
        let pid = fs::read_to_string(pid_file)?;
        if is_process_running(pid.trim()) {
            anyhow::bail!("Watcher already running (PID: {})", pid.trim());
        }
        fs::remove_file(pid_file)?;
    }

    if let Some(parent) = pid_file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(pid_file, std::process::id().to_string())
        .with_context(|| format!("Failed to write PID file {}", pid_file.display()))?;
    Ok(())
}

fn is_process_running(pid: &str) -> bool {
    // 0 and negative values address process groups, not one process
    let Ok(pid) = pid.parse::<i32>() else {
        return false;
    };
    if pid <= 0 {
        return false;
    }

    #[cfg(unix)]
    {
        // Signal 0 probes for existence without delivering anything
        unsafe { libc::kill(pid, 0) == 0 }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}
