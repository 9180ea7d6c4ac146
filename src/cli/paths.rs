//! CLI subcommand: `owlwatch paths`
//!
//! Prints all resolved paths for debugging and scripting.

use anyhow::Result;

use crate::concurrency::STORE_LOCK_FILENAME;
use crate::config::Config;
use crate::security::{AUDIT_FILENAME, INTEGRITY_DB_FILENAME, list_archives};

pub fn run() -> Result<()> {
    let config = Config::load()?;
    let paths = &config.paths;
    let security_dir = config.security_dir();

    println!("OwlWatch Paths");
    println!("==============");
    println!();
    println!("Config:     {}", paths.config_dir.display());
    println!("  config.toml:    {}", paths.config_file().display());
    println!("  legacy json:    {}", paths.legacy_config_file().display());
    println!();
    println!("State:      {}", paths.state_dir.display());
    println!("  logs:           {}", paths.logs_dir().display());
    println!();
    println!("Security:   {}", security_dir.display());
    println!(
        "  integrity db:   {}",
        security_dir.join(INTEGRITY_DB_FILENAME).display()
    );
    println!("  audit log:      {}", security_dir.join(AUDIT_FILENAME).display());
    println!(
        "  store lock:     {}",
        security_dir.join(STORE_LOCK_FILENAME).display()
    );
    println!("  archives:       {}", list_archives(&security_dir).len());
    println!();
    match paths.runtime_dir {
        Some(ref dir) => println!("Runtime:    {}", dir.display()),
        None => println!("Runtime:    (not available)"),
    }
    println!("  PID file:       {}", paths.pid_file().display());

    Ok(())
}
