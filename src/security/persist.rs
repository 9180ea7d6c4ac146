//! JSON document persistence for the security directory.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use super::error::{EngineError, EngineResult};
use crate::concurrency::{StoreLock, StoreLockGuard};

/// Outcome of reading a persisted document.
#[derive(Debug)]
pub enum Loaded<T> {
    Found(T),
    Missing,
    /// Unparseable or unreadable; the reason is logged by the caller's context.
    Malformed(String),
}

/// Read and parse a JSON document without ever failing the caller.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Loaded<T> {
    if !path.exists() {
        return Loaded::Missing;
    }
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => return Loaded::Malformed(e.to_string()),
    };
    match serde_json::from_str(&content) {
        Ok(value) => Loaded::Found(value),
        Err(e) => Loaded::Malformed(e.to_string()),
    }
}

/// Move an unparseable document aside so the next save cannot destroy it.
pub fn quarantine(path: &Path) -> Option<PathBuf> {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    let name = path.file_name()?.to_string_lossy().into_owned();
    let target = path.with_file_name(format!("{}.corrupt-{}", name, stamp));
    match fs::rename(path, &target) {
        Ok(()) => {
            warn!("Moved unreadable {} to {}", path.display(), target.display());
            Some(target)
        }
        Err(e) => {
            warn!("Could not move aside {}: {}", path.display(), e);
            None
        }
    }
}

/// Last modification time of a persisted document, if it exists.
///
/// Documents remember the mtime they last synced with so that writes from
/// another process are noticed and reloaded.
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Serializes documents into the security directory under the store lock.
#[derive(Debug, Clone)]
pub struct Persister {
    lock: StoreLock,
    timeout: Duration,
}

impl Persister {
    pub fn new(security_dir: &Path, timeout: Duration) -> Self {
        Self {
            lock: StoreLock::new(security_dir),
            timeout,
        }
    }

    /// Run `f` while holding the store file lock.
    ///
    /// The lock is not re-entrant: inside `f`, write with
    /// [`write_json_locked`](Self::write_json_locked).
    pub fn locked<R>(&self, f: impl FnOnce() -> EngineResult<R>) -> EngineResult<R> {
        let _guard = self.acquire()?;
        f()
    }

    fn acquire(&self) -> EngineResult<StoreLockGuard> {
        self.lock
            .acquire(self.timeout)
            .map_err(|e| EngineError::persist(self.lock.path(), std::io::Error::other(e)))?
            .ok_or(EngineError::LockTimeout {
                what: "store file",
                waited: self.timeout,
            })
    }

    /// Take the store lock and write `value`.
    pub fn write_json<T: Serialize + ?Sized>(
        &self,
        path: &Path,
        value: &T,
        what: &'static str,
    ) -> EngineResult<()> {
        self.locked(|| self.write_json_locked(path, value, what))
    }

    /// Write `value` as pretty JSON via temp file + rename. The caller
    /// holds the store lock.
    ///
    /// The temp name follows the `<name>.tmp.<pid>.<n>` convention, which the
    /// classifier treats as transient wherever the directory lives.
    pub fn write_json_locked<T: Serialize + ?Sized>(
        &self,
        path: &Path,
        value: &T,
        what: &'static str,
    ) -> EngineResult<()> {
        let content = serde_json::to_string_pretty(value)
            .map_err(|source| EngineError::Serialize { what, source })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::persist(parent, e))?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| what.to_string());
        let tmp_path = path.with_file_name(format!(
            "{}.tmp.{}.{}",
            file_name,
            std::process::id(),
            uuid::Uuid::new_v4().as_u128()
        ));

        fs::write(&tmp_path, &content).map_err(|e| EngineError::persist(&tmp_path, e))?;
        if let Err(e) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(EngineError::persist(path, e));
        }

        debug!("Saved {} to {:?}", what, path);
        Ok(())
    }
}
