//! Cross-process store lock using advisory file locking (fs2 flock).
//!
//! Serializes persistence writes across processes (a running `owlwatch
//! watch` and a one-shot `owlwatch baseline`, for example) so that the
//! integrity store and the audit log are never rewritten concurrently.

use anyhow::Result;
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Filename of the lock sidecar inside the security directory.
pub const STORE_LOCK_FILENAME: &str = "owlwatch.lock";

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Advisory file lock for the security directory.
///
/// The lock file lives inside the security directory, which the path
/// classifier already treats as self-referential, and its `.lock` name is
/// transient, so taking it never feeds back into the audit trail.
#[derive(Debug, Clone)]
pub struct StoreLock {
    path: PathBuf,
}

/// RAII guard that releases the lock on drop.
pub struct StoreLockGuard {
    file: File,
}

impl Drop for StoreLockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl StoreLock {
    /// Create a lock for the given security directory.
    pub fn new(security_dir: &Path) -> Self {
        Self {
            path: security_dir.join(STORE_LOCK_FILENAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire with a bounded wait.
    ///
    /// Polls until the lock is free or `timeout` elapses. Returns `None`
    /// on timeout so the caller can report a clear failure instead of
    /// blocking its watch thread forever.
    pub fn acquire(&self, timeout: Duration) -> Result<Option<StoreLockGuard>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(guard) = self.try_acquire()? {
                return Ok(Some(guard));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Non-blocking; `None` while another holder has it.
    pub fn try_acquire(&self) -> Result<Option<StoreLockGuard>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(StoreLockGuard { file })),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            #[cfg(unix)]
            Err(ref e) if e.raw_os_error() == Some(35) || e.raw_os_error() == Some(11) => {
                // EAGAIN (11), or EWOULDBLOCK (35) on macOS
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
