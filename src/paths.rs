//! Where OwlWatch keeps its files.
//!
//! Each directory resolves in order: an `OWLWATCH_*` override, the XDG
//! base directory via `etcetera`, then the platform default. Overrides
//! must be absolute; empty or relative values are ignored.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "owlwatch";

/// Environment lookup, so resolution can be tested without touching the
/// process environment.
pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
pub struct ProcessEnv;

impl Env for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Env for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Resolved OwlWatch directories. All absolute.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Holds `config.toml`.
    pub config_dir: PathBuf,

    /// Holds the security directory and logs.
    pub state_dir: PathBuf,

    /// Holds the watch PID file when the platform has one.
    pub runtime_dir: Option<PathBuf>,
}

impl Paths {
    pub fn resolve() -> Result<Self> {
        Self::from_env(&ProcessEnv)
    }

    pub fn from_env(env: &impl Env) -> Result<Self> {
        use etcetera::BaseStrategy;

        let base = etcetera::choose_base_strategy()
            .map_err(|e| anyhow::anyhow!("Failed to determine base directories: {}", e))?;

        let config_dir = absolute_var(env, "OWLWATCH_CONFIG_DIR")
            .unwrap_or_else(|| base.config_dir().join(APP_DIR));
        // No XDG state dir on macOS/Windows; use the data dir there.
        let state_dir = absolute_var(env, "OWLWATCH_STATE_DIR").unwrap_or_else(|| {
            base.state_dir()
                .unwrap_or_else(|| base.data_dir())
                .join(APP_DIR)
        });

        Ok(Self {
            config_dir,
            state_dir,
            runtime_dir: runtime_dir(env),
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// JSON config written by older releases, migrated on first load.
    pub fn legacy_config_file(&self) -> PathBuf {
        self.config_dir.join("watch_config.json")
    }

    /// Integrity store, audit log, archives and the store lock live here.
    /// Events under it are never audited.
    pub fn security_dir(&self) -> PathBuf {
        self.state_dir.join("security")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.runtime_dir
            .as_deref()
            .unwrap_or(&self.state_dir)
            .join("watch.pid")
    }

    /// Create the config, state and runtime directories (mode 0700).
    pub fn ensure_dirs(&self) -> Result<()> {
        let dirs = [Some(&self.config_dir), Some(&self.state_dir), self.runtime_dir.as_ref()];
        for dir in dirs.into_iter().flatten() {
            create_private_dir(dir)?;
        }
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::resolve().unwrap_or_else(|_| {
            let home = etcetera::home_dir().unwrap_or_else(|_| PathBuf::from("."));
            Self {
                config_dir: home.join(".config").join(APP_DIR),
                state_dir: home.join(".local").join("state").join(APP_DIR),
                runtime_dir: None,
            }
        })
    }
}

fn absolute_var(env: &impl Env, key: &str) -> Option<PathBuf> {
    env.var(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
}

fn runtime_dir(env: &impl Env) -> Option<PathBuf> {
    if let Some(dir) = absolute_var(env, "XDG_RUNTIME_DIR") {
        return Some(dir.join(APP_DIR));
    }

    #[cfg(unix)]
    {
        // SAFETY: getuid has no preconditions and cannot fail.
        let uid = unsafe { libc::getuid() };
        let tmp = absolute_var(env, "TMPDIR").unwrap_or_else(|| PathBuf::from("/tmp"));
        Some(tmp.join(format!("{}-{}", APP_DIR, uid)))
    }

    #[cfg(not(unix))]
    {
        let user = env.var("USERNAME").unwrap_or_else(|| "user".into());
        absolute_var(env, "TEMP").map(|t| t.join(format!("{}-{}", APP_DIR, user)))
    }
}

fn create_private_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}
