mod migrate;

pub use migrate::try_migrate_legacy_config;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::paths::Paths;
use crate::security::EngineSettings;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Resolved XDG-compliant paths (not serialized)
    #[serde(skip)]
    pub paths: Paths,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Root directories to watch recursively
    #[serde(default)]
    pub watched_paths: Vec<String>,

    /// Path components (e.g. ".git") or `*`-prefixed suffixes (e.g. "*.pyc") to ignore
    #[serde(default = "default_ignored_patterns")]
    pub ignored_patterns: Vec<String>,

    /// Only admit paths containing one of these names as a component (empty = all)
    #[serde(default)]
    pub enabled_skills: Vec<String>,

    /// Minimum seconds between two accepted events for the same path
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Files larger than this raise a WARNING (default: 50MB)
    #[serde(default = "default_large_file_bytes")]
    pub large_file_bytes: u64,

    /// Events per directory inside the window before a burst is reported
    #[serde(default = "default_burst_threshold")]
    pub burst_threshold: usize,

    #[serde(default = "default_burst_window")]
    pub burst_window_secs: f64,

    /// Active audit log size that triggers rotation
    #[serde(default = "default_max_audit_entries")]
    pub max_audit_entries: usize,

    /// Bounded wait for the engine lock and the store file lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Override for the security directory (default: state_dir/security)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file used by `owlwatch watch --log-file` (empty = stderr only)
    #[serde(default)]
    pub file: String,
}

// Default value functions
fn default_ignored_patterns() -> Vec<String> {
    ["__pycache__", ".git", "*.pyc", "backups", "logs", "dist"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_sync_interval() -> f64 {
    5.0
}
fn default_large_file_bytes() -> u64 {
    52_428_800 // 50MB
}
fn default_burst_threshold() -> usize {
    10
}
fn default_burst_window() -> f64 {
    5.0
}
fn default_max_audit_entries() -> usize {
    10_000
}
fn default_lock_timeout_ms() -> u64 {
    5000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            watched_paths: Vec::new(),
            ignored_patterns: default_ignored_patterns(),
            enabled_skills: Vec::new(),
            sync_interval_secs: default_sync_interval(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            large_file_bytes: default_large_file_bytes(),
            burst_threshold: default_burst_threshold(),
            burst_window_secs: default_burst_window(),
            max_audit_entries: default_max_audit_entries(),
            lock_timeout_ms: default_lock_timeout_ms(),
            security_dir: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: String::new(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Paths::resolve()?;
        paths.ensure_dirs()?;
        Self::load_from(paths)
    }

    /// Load using already-resolved paths.
    pub fn load_from(paths: Paths) -> Result<Self> {
        let path = paths.config_file();

        if !path.exists() {
            // Import a legacy watch_config.json if one is lying around
            if let Some(mut migrated) = try_migrate_legacy_config(&paths.legacy_config_file()) {
                migrated.paths = paths;
                migrated.save()?;
                return Ok(migrated);
            }
            let config = Config {
                paths,
                ..Config::default()
            };
            config.save_with_template()?;
            return Ok(config);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config.paths = paths;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = self.paths.config_file();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;

        Ok(())
    }

    /// Save config with a helpful template (for first-time setup)
    pub fn save_with_template(&self) -> Result<()> {
        let path = self.paths.config_file();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        eprintln!("Created default config at {}", path.display());

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let paths = Paths::resolve()?;
        Ok(paths.config_file())
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["watch", "watched_paths"] => Ok(self.watch.watched_paths.join(",")),
            ["watch", "ignored_patterns"] => Ok(self.watch.ignored_patterns.join(",")),
            ["watch", "enabled_skills"] => Ok(self.watch.enabled_skills.join(",")),
            ["watch", "sync_interval_secs"] => Ok(self.watch.sync_interval_secs.to_string()),
            ["security", "large_file_bytes"] => Ok(self.security.large_file_bytes.to_string()),
            ["security", "burst_threshold"] => Ok(self.security.burst_threshold.to_string()),
            ["security", "burst_window_secs"] => Ok(self.security.burst_window_secs.to_string()),
            ["security", "max_audit_entries"] => Ok(self.security.max_audit_entries.to_string()),
            ["security", "lock_timeout_ms"] => Ok(self.security.lock_timeout_ms.to_string()),
            ["security", "security_dir"] => Ok(self.security_dir().display().to_string()),
            ["logging", "level"] => Ok(self.logging.level.clone()),
            ["logging", "file"] => Ok(self.logging.file.clone()),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["watch", "watched_paths"] => self.watch.watched_paths = split_list(value),
            ["watch", "ignored_patterns"] => self.watch.ignored_patterns = split_list(value),
            ["watch", "enabled_skills"] => self.watch.enabled_skills = split_list(value),
            ["watch", "sync_interval_secs"] => self.watch.sync_interval_secs = value.parse()?,
            ["security", "large_file_bytes"] => self.security.large_file_bytes = value.parse()?,
            ["security", "burst_threshold"] => self.security.burst_threshold = value.parse()?,
            ["security", "burst_window_secs"] => self.security.burst_window_secs = value.parse()?,
            ["security", "max_audit_entries"] => self.security.max_audit_entries = value.parse()?,
            ["security", "lock_timeout_ms"] => self.security.lock_timeout_ms = value.parse()?,
            ["security", "security_dir"] => self.security.security_dir = Some(value.to_string()),
            ["logging", "level"] => self.logging.level = value.to_string(),
            ["logging", "file"] => self.logging.file = value.to_string(),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        Ok(())
    }

    /// Security directory, honoring the `security.security_dir` override.
    pub fn security_dir(&self) -> PathBuf {
        match self.security.security_dir {
            Some(ref dir) if !dir.trim().is_empty() => expand_path(dir),
            _ => self.paths.security_dir(),
        }
    }

    /// Watched roots with `~` expanded.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watch
            .watched_paths
            .iter()
            .map(|p| expand_path(p))
            .collect()
    }

    /// Engine parameters derived from this config.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            security_dir: self.security_dir(),
            ignored_patterns: self.watch.ignored_patterns.clone(),
            enabled_skills: self.watch.enabled_skills.clone(),
            throttle_interval: secs(self.watch.sync_interval_secs),
            large_file_bytes: self.security.large_file_bytes,
            burst_threshold: self.security.burst_threshold,
            burst_window: secs(self.security.burst_window_secs),
            max_audit_entries: self.security.max_audit_entries,
            lock_timeout: Duration::from_millis(self.security.lock_timeout_ms),
        }
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path.trim()).to_string())
}

/// Negative or non-finite durations from a hand-edited file collapse to zero.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Default config template with helpful comments (used for first-time setup)
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# OwlWatch Configuration
# Auto-created on first run. Edit as needed.

[watch]
# Directories watched recursively by `owlwatch watch`
watched_paths = []

# Path components or "*"-prefixed suffixes to ignore
ignored_patterns = ["__pycache__", ".git", "*.pyc", "backups", "logs", "dist"]

# Only admit paths containing one of these names as a component (empty = all)
enabled_skills = []

# Minimum seconds between two accepted events for the same path
sync_interval_secs = 5.0

[security]
large_file_bytes = 52428800     # 50MB
burst_threshold = 10            # events per directory...
burst_window_secs = 5.0         # ...inside this trailing window
max_audit_entries = 10000       # rotate the oldest half past this
lock_timeout_ms = 5000
# security_dir = "~/.local/state/owlwatch/security"

[logging]
level = "info"
# file = "~/.local/state/owlwatch/logs/watch.log"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn test_paths(dir: &std::path::Path) -> Paths {
        Paths {
            config_dir: dir.join("config"),
            state_dir: dir.join("state"),
            runtime_dir: None,
        }
    }

    #[test]
    fn template_parses_to_defaults() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.watch.ignored_patterns, default_ignored_patterns());
        assert_eq!(config.security.burst_threshold, 10);
        assert_eq!(config.security.max_audit_entries, 10_000);
        assert_eq!(config.security.large_file_bytes, 50 * 1024 * 1024);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: Config = toml::from_str("[watch]\nsync_interval_secs = 2.5\n").unwrap();
        assert_eq!(config.watch.sync_interval_secs, 2.5);
        assert!(config.watch.enabled_skills.is_empty());
        assert_eq!(config.security.lock_timeout_ms, 5000);
    }

    #[test]
    fn first_load_writes_template() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = test_paths(tmp.path());

        let config = Config::load_from(paths.clone()).unwrap();
        assert!(paths.config_file().exists());
        assert_eq!(config.security.burst_threshold, 10);
    }

    #[test]
    fn set_and_get_roundtrip() {
        let mut config = Config::default();
        config
            .set_value("watch.enabled_skills", "alpha, beta")
            .unwrap();
        config.set_value("security.burst_threshold", "3").unwrap();

        assert_eq!(config.get_value("watch.enabled_skills").unwrap(), "alpha,beta");
        assert_eq!(config.get_value("security.burst_threshold").unwrap(), "3");
        assert!(config.get_value("nope.key").is_err());
        assert!(config.set_value("security.burst_threshold", "many").is_err());
    }

    #[test]
    fn security_dir_override() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config {
            paths: test_paths(tmp.path()),
            ..Config::default()
        };
        assert_eq!(config.security_dir(), tmp.path().join("state").join("security"));

        config.security.security_dir = Some("/srv/owl".to_string());
        assert_eq!(config.security_dir(), PathBuf::from("/srv/owl"));
    }

    #[test]
    fn engine_settings_carry_durations() {
        let mut config = Config::default();
        config.watch.sync_interval_secs = 1.5;
        config.security.burst_window_secs = -3.0;

        let settings = config.engine_settings();
        assert_eq!(settings.throttle_interval, Duration::from_millis(1500));
        assert_eq!(settings.burst_window, Duration::ZERO);
        assert_eq!(settings.lock_timeout, Duration::from_secs(5));
    }
}
