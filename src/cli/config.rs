use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use std::fs;
use std::path::PathBuf;

use crate::config::{Config, DEFAULT_CONFIG_TEMPLATE};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show {
        /// Print JSON instead of TOML
        #[arg(long)]
        json: bool,
    },

    /// Print one value (e.g. security.burst_threshold)
    Get { key: String },

    /// Set one value; lists are comma-separated
    Set { key: String, value: String },

    /// Print the config file location
    Path,

    /// Write the commented default config
    Init {
        /// Replace an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Add a directory to watch.watched_paths
    AddPath { dir: PathBuf },

    /// Remove a directory from watch.watched_paths
    RemovePath { dir: PathBuf },
}

pub async fn run(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show { json } => {
            let config = Config::load()?;
            let text = if json {
                serde_json::to_string_pretty(&config)?
            } else {
                toml::to_string_pretty(&config)?
            };
            println!("{}", text);
        }
        ConfigCommands::Get { key } => {
            println!("{}", Config::load()?.get_value(&key)?);
        }
        ConfigCommands::Set { key, value } => {
            let mut config = Config::load()?;
            config.set_value(&key, &value)?;
            config.save()?;
            println!("{} = {}", key, config.get_value(&key)?);
        }
        ConfigCommands::Path => println!("{}", Config::config_path()?.display()),
        ConfigCommands::Init { force } => init(force)?,
        ConfigCommands::AddPath { dir } => {
            let mut config = Config::load()?;
            let entry = dir.display().to_string();
            if config.watch.watched_paths.contains(&entry) {
                println!("Already watching {}", entry);
                return Ok(());
            }
            if !dir.is_dir() {
                eprintln!("Warning: {} is not a directory yet", entry);
            }
            config.watch.watched_paths.push(entry.clone());
            config.save()?;
            println!("Watching {}", entry);
        }
        ConfigCommands::RemovePath { dir } => {
            let mut config = Config::load()?;
            let entry = dir.display().to_string();
            let before = config.watch.watched_paths.len();
            config.watch.watched_paths.retain(|p| *p != entry);
            if config.watch.watched_paths.len() == before {
                bail!("{} is not a watched path", entry);
            }
            config.save()?;
            println!("No longer watching {}", entry);
        }
    }
    Ok(())
}

fn init(force: bool) -> Result<()> {
    let path = Config::config_path()?;
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to replace it)",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&path, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Wrote {}", path.display());
    Ok(())
}
