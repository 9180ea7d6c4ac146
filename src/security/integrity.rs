//! SHA-256 integrity baselines.
//!
//! Stored at `<security_dir>/integrity_db.json`:
//!
//! ```json
//! {
//!   "files": {
//!     "/srv/skills/SKILL.md": {
//!       "sha256": "…",
//!       "attributes": { "size": 120, "mode": 33188, "readonly": false, "hidden": false, "mtime": 1771581600.0 },
//!       "baselined_at": "2026-02-20T10:00:00+00:00"
//!     }
//!   },
//!   "created": "…",
//!   "last_updated": "…"
//! }
//! ```
//!
//! Records are only written by an explicit baseline. Verification reports
//! drift and never rewrites a record.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use super::alert::{Alert, AlertDetails, Severity};
use super::error::EngineResult;
use super::persist::{Loaded, Persister, modified_time, quarantine, read_json};

pub const INTEGRITY_DB_FILENAME: &str = "integrity_db.json";

const READ_CHUNK: usize = 8192;

/// Stat attributes relevant to tamper detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub size: u64,
    /// Full `st_mode` on Unix; synthesized from the read-only flag elsewhere.
    pub mode: u32,
    pub readonly: bool,
    pub hidden: bool,
    /// Seconds since the Unix epoch.
    pub mtime: f64,
}

impl StatSnapshot {
    pub fn capture(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;

        #[cfg(unix)]
        let (mode, readonly) = {
            use std::os::unix::fs::PermissionsExt;
            let mode = meta.permissions().mode();
            (mode, mode & 0o200 == 0)
        };
        #[cfg(not(unix))]
        let (mode, readonly) = {
            let readonly = meta.permissions().readonly();
            (if readonly { 0o444 } else { 0o666 }, readonly)
        };

        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0.0, |d| d.as_secs_f64());

        Ok(Self {
            size: meta.len(),
            mode,
            readonly,
            hidden: path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.')),
            mtime,
        })
    }
}

/// Describe read-only, mode and hidden-flag changes between two snapshots.
/// Size and mtime are left to the content hash.
pub fn diff_attributes(old: &StatSnapshot, new: &StatSnapshot) -> Vec<String> {
    let mut changes = Vec::new();
    if old.readonly != new.readonly {
        changes.push(format!(
            "read-only changed from {} to {}",
            old.readonly, new.readonly
        ));
    }
    if old.mode != new.mode {
        changes.push(format!("mode changed from {:#o} to {:#o}", old.mode, new.mode));
    }
    if old.hidden != new.hidden {
        changes.push(format!(
            "hidden changed from {} to {}",
            old.hidden, new.hidden
        ));
    }
    changes
}

/// Hex-encoded SHA-256 of a file's content, read in chunks.
pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

/// Baseline record for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityRecord {
    pub sha256: String,
    pub attributes: StatSnapshot,
    pub baselined_at: String,
}

impl IntegrityRecord {
    /// Hash and stat `path` as it is right now.
    pub fn capture(path: &Path, baselined_at: &str) -> io::Result<Self> {
        let sha256 = file_sha256(path)?;
        let attributes = StatSnapshot::capture(path)?;
        Ok(Self {
            sha256,
            attributes,
            baselined_at: baselined_at.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IntegrityDb {
    #[serde(default)]
    files: BTreeMap<String, IntegrityRecord>,
    #[serde(default = "now_iso")]
    created: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_updated: Option<String>,
}

impl Default for IntegrityDb {
    fn default() -> Self {
        Self {
            files: BTreeMap::new(),
            created: now_iso(),
            last_updated: None,
        }
    }
}

/// In-memory integrity database.
///
/// Upserts since the last save are kept aside so that a save can merge
/// them over records another process wrote in the meantime.
#[derive(Debug)]
pub struct IntegrityStore {
    path: PathBuf,
    db: IntegrityDb,
    pending: BTreeMap<String, IntegrityRecord>,
    /// mtime of the file when it last matched `db`.
    synced: Option<SystemTime>,
}

impl IntegrityStore {
    /// Load the store. Missing or malformed stores start empty; a malformed
    /// file is moved aside first.
    pub fn load(security_dir: &Path) -> Self {
        let path = security_dir.join(INTEGRITY_DB_FILENAME);
        let db = read_db(&path).unwrap_or_default();
        Self {
            synced: modified_time(&path),
            path,
            db,
            pending: BTreeMap::new(),
        }
    }

    /// Re-read the file if another process saved it since we last synced.
    /// Unsaved upserts stay on top of the reloaded records.
    pub fn reload_if_changed(&mut self) {
        let on_disk = modified_time(&self.path);
        if on_disk.is_none() || on_disk == self.synced {
            return;
        }
        if let Some(mut db) = read_db(&self.path) {
            db.files.extend(self.pending.clone());
            debug!("Integrity store changed on disk, reloaded {} records", db.files.len());
            self.db = db;
        }
        self.synced = on_disk;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, path: &str) -> Option<&IntegrityRecord> {
        self.db.files.get(path)
    }

    pub fn upsert(&mut self, path: String, record: IntegrityRecord) {
        self.pending.insert(path.clone(), record.clone());
        self.db.files.insert(path, record);
    }

    pub fn len(&self) -> usize {
        self.db.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.files.is_empty()
    }

    pub fn last_updated(&self) -> Option<&str> {
        self.db.last_updated.as_deref()
    }

    /// Copy of every record, in path order.
    pub fn snapshot(&self) -> Vec<(String, IntegrityRecord)> {
        self.db
            .files
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Merge with the file under the store lock, stamp `last_updated` and
    /// persist.
    pub fn save(&mut self, persister: &Persister) -> EngineResult<()> {
        persister.locked(|| {
            self.reload_if_changed();
            self.db.last_updated = Some(now_iso());
            persister.write_json_locked(&self.path, &self.db, "integrity store")?;
            self.pending.clear();
            self.synced = modified_time(&self.path);
            Ok(())
        })
    }
}

/// Parse the store. Malformed files are moved aside and yield `None`.
fn read_db(path: &Path) -> Option<IntegrityDb> {
    match read_json::<IntegrityDb>(path) {
        Loaded::Found(db) => Some(db),
        Loaded::Missing => None,
        Loaded::Malformed(reason) => {
            warn!("Could not read integrity store {}: {}", path.display(), reason);
            quarantine(path);
            None
        }
    }
}

/// Check one baselined file against its live state.
///
/// Hash and attribute checks are independent: a file can produce one
/// hash-mismatch alert and one attribute-change alert.
pub fn verify_record(key: &str, baseline: &IntegrityRecord, now: &str) -> Vec<Alert> {
    let path = Path::new(key);
    let mut alerts = Vec::new();

    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            alerts.push(Alert::new(
                Severity::Critical,
                "Baselined file is missing",
                key,
                now,
                AlertDetails::MissingFile {
                    expected_hash: baseline.sha256.clone(),
                    baseline_date: baseline.baselined_at.clone(),
                },
            ));
            return alerts;
        }
        Err(e) => return vec![unreadable(key, now, &e)],
    };

    if !meta.is_file() {
        return alerts;
    }

    let current_hash = match file_sha256(path) {
        Ok(hash) => hash,
        Err(e) => return vec![unreadable(key, now, &e)],
    };

    if current_hash != baseline.sha256 {
        alerts.push(Alert::new(
            Severity::Critical,
            "File integrity violation (hash mismatch)",
            key,
            now,
            AlertDetails::BaselineMismatch {
                expected_hash: baseline.sha256.clone(),
                current_hash,
            },
        ));
    }

    if let Ok(current) = StatSnapshot::capture(path) {
        let changes = diff_attributes(&baseline.attributes, &current);
        if !changes.is_empty() {
            alerts.push(Alert::new(
                Severity::Critical,
                "File attribute change detected",
                key,
                now,
                AlertDetails::AttributeDrift {
                    attribute_changes: changes,
                },
            ));
        }
    }

    alerts
}

fn unreadable(key: &str, now: &str, error: &io::Error) -> Alert {
    Alert::new(
        Severity::Warning,
        format!("Cannot read file for integrity check: {}", error),
        key,
        now,
        AlertDetails::Unreadable {
            error: error.to_string(),
        },
    )
}

pub(crate) fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}
