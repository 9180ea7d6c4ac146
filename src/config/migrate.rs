//! Legacy watch config migration support
//!
//! Provides best-effort import of the older `watch_config.json` format into
//! OwlWatch's TOML config. Missing keys keep their defaults.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use super::Config;

/// Legacy config structure (only fields we can migrate)
#[derive(Debug, Deserialize)]
struct LegacyWatchConfig {
    #[serde(default)]
    watched_paths: Option<Vec<String>>,

    #[serde(default)]
    ignored_patterns: Option<Vec<String>>,

    /// Throttle interval in seconds; older files store it as an integer
    #[serde(default)]
    sync_interval: Option<f64>,

    #[serde(default)]
    enabled_skills: Option<Vec<String>>,
}

/// Try to load and migrate a legacy `watch_config.json`.
pub fn try_migrate_legacy_config(path: &Path) -> Option<Config> {
    if !path.exists() {
        debug!("No legacy watch config found at {:?}", path);
        return None;
    }

    info!("Found legacy watch config at {:?}, attempting migration", path);

    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read legacy watch config: {}", e);
            return None;
        }
    };

    let legacy: LegacyWatchConfig = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse legacy watch config: {}", e);
            return None;
        }
    };

    Some(convert_legacy_config(legacy))
}

fn convert_legacy_config(legacy: LegacyWatchConfig) -> Config {
    let mut config = Config::default();

    if let Some(paths) = legacy.watched_paths {
        config.watch.watched_paths = paths;
    }
    if let Some(patterns) = legacy.ignored_patterns {
        config.watch.ignored_patterns = patterns;
    }
    if let Some(interval) = legacy.sync_interval
        && interval.is_finite()
        && interval >= 0.0
    {
        config.watch.sync_interval_secs = interval;
    }
    if let Some(skills) = legacy.enabled_skills {
        config.watch.enabled_skills = skills;
    }

    info!(
        "Migrated legacy watch config ({} watched paths)",
        config.watch.watched_paths.len()
    );

    config
}
