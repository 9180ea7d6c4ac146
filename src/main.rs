use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::sync::Mutex;

use owlwatch::cli::{self, Cli, Commands};
use owlwatch::config::{Config, LoggingConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Config commands must work before a config file exists
    let command = match cli.command {
        Commands::Config(args) => {
            init_logging(cli.verbose, cli.log_json, None)?;
            return cli::config::run(args).await;
        }
        Commands::Paths => {
            init_logging(cli.verbose, cli.log_json, None)?;
            return cli::paths::run();
        }
        other => other,
    };

    let config = Config::load()?;
    init_logging(cli.verbose, cli.log_json, Some(&config.logging))?;

    match command {
        Commands::Watch(args) => cli::watch::run(args, &config).await,
        Commands::Baseline(args) => cli::baseline::run(args, &config).await,
        Commands::Verify(args) => cli::verify::run(args, &config).await,
        Commands::Report(args) => cli::report::run(args, &config).await,
        Commands::Audit(args) => cli::audit::run(args, &config).await,
        Commands::Scan(args) => cli::scan::run(args, &config).await,
        Commands::Config(_) | Commands::Paths => Ok(()),
    }
}

fn init_logging(verbose: bool, json: bool, logging: Option<&LoggingConfig>) -> Result<()> {
    let log_level = if verbose {
        "debug"
    } else {
        logging.map_or("info", |l| l.level.as_str())
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let log_file = match logging.map(|l| l.file.trim()) {
        Some(file) if !file.is_empty() => {
            let path = std::path::PathBuf::from(shellexpand::tilde(file).to_string());
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(Mutex::new(file))
        }
        _ => None,
    };

    match (json, log_file) {
        (false, None) => builder.init(),
        (true, None) => builder.json().init(),
        (false, Some(file)) => builder.with_ansi(false).with_writer(file).init(),
        (true, Some(file)) => builder.json().with_writer(file).init(),
    }

    Ok(())
}
