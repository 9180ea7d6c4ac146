//! Append-only audit trail of every admitted file event.
//!
//! Stored at `<security_dir>/audit_log.json` as a JSON array. Insertion
//! order is log order. When the active log grows past its cap, the oldest
//! half is written verbatim to `audit_log.<YYYYMMDDTHHMMSSZ>.json` and
//! dropped from the active log. Nothing is ever deleted.
//!
//! # Format
//!
//! | Field | Description |
//! |-------|-------------|
//! | `timestamp` | ISO 8601 UTC timestamp |
//! | `event_type` | `created`, `modified`, `deleted` or `moved` |
//! | `path` | Absolute path of the affected file |
//! | `file_size` | Size in bytes, when the file existed and could be stat'ed |
//! | `file_hash` | SHA-256 of the content, when the file could be read |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;
use tracing::{debug, info, warn};

use super::error::EngineResult;
use super::persist::{Loaded, Persister, modified_time, quarantine, read_json};

pub const AUDIT_FILENAME: &str = "audit_log.json";

const ARCHIVE_PREFIX: &str = "audit_log.";
const ARCHIVE_STAMP: &str = "%Y%m%dT%H%M%SZ";

/// File-system event kinds delivered by a watch source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Moved => "moved",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" => Ok(Self::Created),
            "modified" => Ok(Self::Modified),
            "deleted" => Ok(Self::Deleted),
            "moved" => Ok(Self::Moved),
            other => Err(format!("unknown event type: {}", other)),
        }
    }
}

/// Audit log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub event_type: EventKind,
    pub path: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub file_hash: Option<String>,
}

impl AuditEntry {
    /// Parsed timestamp; `None` for entries written with a malformed one.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// In-memory copy of the active audit log, persisted after every append.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    entries: Vec<AuditEntry>,
    max_entries: usize,
    /// mtime of the file when it last matched `entries`.
    synced: Option<SystemTime>,
}

impl AuditLog {
    /// Load the active log. Missing or malformed logs start empty; a
    /// malformed file is moved aside first so it is not overwritten.
    pub fn load(security_dir: &Path, max_entries: usize) -> Self {
        let path = audit_file_path(security_dir);
        let entries = read_entries(&path).unwrap_or_default();

        Self {
            synced: modified_time(&path),
            path,
            entries,
            max_entries: max_entries.max(2),
        }
    }

    /// Pick up entries another process appended since our last write.
    pub fn reload_if_changed(&mut self) {
        let on_disk = modified_time(&self.path);
        if on_disk.is_none() || on_disk == self.synced {
            return;
        }
        if let Some(entries) = read_entries(&self.path) {
            debug!(
                "Audit log changed on disk, reloaded {} entries",
                entries.len()
            );
            self.entries = entries;
        }
        self.synced = modified_time(&self.path);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append and persist. Returns the archive path when the append
    /// triggered a rotation.
    ///
    /// Runs under the store file lock, after reloading the file if another
    /// process wrote it. On a write failure the entry stays in memory and
    /// is written with the next successful append; the error still reaches
    /// the caller.
    pub fn append(
        &mut self,
        entry: AuditEntry,
        persister: &Persister,
    ) -> EngineResult<Option<PathBuf>> {
        persister.locked(|| {
            self.reload_if_changed();
            self.entries.push(entry);

            let archived = if self.entries.len() > self.max_entries {
                Some(self.rotate(persister)?)
            } else {
                None
            };

            persister.write_json_locked(&self.path, &self.entries, "audit log")?;
            self.synced = modified_time(&self.path);
            Ok(archived)
        })
    }

    /// Move the oldest half to a timestamped archive.
    ///
    /// The archive is written before the active log shrinks, so a failure
    /// at worst duplicates entries across the two files.
    fn rotate(&mut self, persister: &Persister) -> EngineResult<PathBuf> {
        let split_point = self.entries.len() / 2;
        let archive_path = next_archive_path(self.security_dir());

        persister.write_json_locked(&archive_path, &self.entries[..split_point], "audit archive")?;
        self.entries.drain(..split_point);

        info!(
            "Rotated {} audit entries to {}",
            split_point,
            archive_path.display()
        );
        Ok(archive_path)
    }

    /// Entries with `start <= timestamp <= end`, in log order. Entries whose
    /// timestamp cannot be parsed are skipped.
    pub fn read_range(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Vec<AuditEntry> {
        filter_range(&self.entries, start, end)
    }

    fn security_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Parse the active log. Malformed files are moved aside and yield `None`.
fn read_entries(path: &Path) -> Option<Vec<AuditEntry>> {
    match read_json::<Vec<AuditEntry>>(path) {
        Loaded::Found(entries) => Some(entries),
        Loaded::Missing => None,
        Loaded::Malformed(reason) => {
            warn!("Could not read audit log {}: {}", path.display(), reason);
            quarantine(path);
            None
        }
    }
}

pub(crate) fn filter_range(
    entries: &[AuditEntry],
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Vec<AuditEntry> {
    entries
        .iter()
        .filter(|entry| match entry.time() {
            Some(ts) => start.is_none_or(|s| ts >= s) && end.is_none_or(|e| ts <= e),
            None => false,
        })
        .cloned()
        .collect()
}

/// Get the full path to the active audit log.
pub fn audit_file_path(security_dir: &Path) -> PathBuf {
    security_dir.join(AUDIT_FILENAME)
}

/// Archive path for a rotation happening now. Never reuses an existing name.
fn next_archive_path(security_dir: &Path) -> PathBuf {
    let stamp = Utc::now().format(ARCHIVE_STAMP).to_string();
    let base = security_dir.join(format!("{}{}.json", ARCHIVE_PREFIX, stamp));
    if !base.exists() {
        return base;
    }
    (1..)
        .map(|n| security_dir.join(format!("{}{}-{}.json", ARCHIVE_PREFIX, stamp, n)))
        .find(|p| !p.exists())
        .unwrap_or(base)
}

/// Rotated archives in the security directory, oldest first.
pub fn list_archives(security_dir: &Path) -> Vec<PathBuf> {
    let Ok(dir) = fs::read_dir(security_dir) else {
        return Vec::new();
    };
    let mut archives: Vec<PathBuf> = dir
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| {
                    n.starts_with(ARCHIVE_PREFIX) && n.ends_with(".json") && n != AUDIT_FILENAME
                })
        })
        .collect();
    archives.sort_by_cached_key(|p| archive_order(p));
    archives
}

/// Sort key for an archive name: rotation stamp, then collision number
/// (`audit_log.<stamp>.json` is 0, `audit_log.<stamp>-<n>.json` is n).
fn archive_order(path: &Path) -> (String, u64) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let body = name
        .strip_prefix(ARCHIVE_PREFIX)
        .and_then(|n| n.strip_suffix(".json"))
        .unwrap_or(&name);
    match body.rsplit_once('-') {
        Some((stamp, n)) => match n.parse() {
            Ok(n) => (stamp.to_string(), n),
            Err(_) => (body.to_string(), 0),
        },
        None => (body.to_string(), 0),
    }
}

/// Read one archive; unreadable archives yield an empty list with a warning.
pub fn read_archive(path: &Path) -> Vec<AuditEntry> {
    match read_json(path) {
        Loaded::Found(entries) => entries,
        Loaded::Missing => Vec::new(),
        Loaded::Malformed(reason) => {
            warn!("Could not read audit archive {}: {}", path.display(), reason);
            Vec::new()
        }
    }
}
