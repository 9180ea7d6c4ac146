//! # OwlWatch Security Engine
//!
//! This file is the **front door** for the security audit engine. Every
//! public type, constant and function is re-exported here.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                  owlwatch.rs (you are here)                      │
//! │                  Public API facade & documentation               │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  engine.rs: SecurityEngine: admission, scan, baseline, verify    │
//! ├───────────────┬──────────────┬─────────────┬─────────────────────┤
//! │ classifier.rs │ throttle.rs  │ burst.rs    │ report.rs           │
//! │ Transient,    │ Per-path     │ Per-dir     │ Markdown audit      │
//! │ self-ref,     │ rate limit   │ sliding     │ report              │
//! │ ignore/scope  │              │ window      │                     │
//! ├───────────────┴──────┬───────┴─────────────┴─────────────────────┤
//! │ integrity.rs         │ audit.rs                                  │
//! │ SHA-256 baselines    │ Append-only log + rotation to archives    │
//! ├──────────────────────┴───────────────────────────────────────────┤
//! │  persist.rs: atomic JSON writes under the store file lock        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Event Pipeline
//!
//! 1. **Admission**: directory events, transient files (`.tmp_*`,
//!    `*.tmp.<pid>.<n>`, `*.lock`), paths inside the security directory,
//!    ignored patterns and out-of-scope skills are dropped. Repeats for the
//!    same path inside the throttle interval are dropped too.
//!
//! 2. **Audit**: every admitted event is appended to the audit log with
//!    the file's size and SHA-256 when it can be read.
//!
//! 3. **Classification**: the first matching rule produces the alert:
//!
//! | Rule | Severity |
//! |------|----------|
//! | Suspicious extension | CRITICAL on create, WARNING otherwise |
//! | Hidden file created | WARNING |
//! | Burst in parent directory | WARNING |
//! | Large file | WARNING |
//! | Baselined file modified | CRITICAL |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use owlwatch::security::{EngineSettings, EventKind, SecurityEngine};
//!
//! let engine = SecurityEngine::open(EngineSettings::new(&security_dir))?;
//! engine.baseline(&skills_dir, &AtomicBool::new(false))?;
//!
//! if let Some(alert) = engine.handle_event(EventKind::Modified, &path)? {
//!     notify(&alert);
//! }
//!
//! engine.export_report(Path::new("audit.md"), None, None)?;
//! ```
//!
//! ## File Hierarchy
//!
//! ```text
//! <state_dir>/security/
//! ├── integrity_db.json                     # Baselines
//! ├── audit_log.json                        # Active audit log
//! ├── audit_log.20260220T100000Z.json       # Rotated archive
//! └── owlwatch.lock                         # Store file lock
//! ```
//!
//! ## Threat Model
//!
//! | Threat | Detection |
//! |--------|-----------|
//! | Executable dropped into a skill | Suspicious extension rule |
//! | Dotfile planted to hide content | Hidden file rule |
//! | Mass rewrite of a directory | Burst rule |
//! | Skill content altered after baseline | Hash mismatch on modify and verify |
//! | Permissions flipped on a skill file | Attribute drift on verify |
//! | File removed after baseline | Missing file on verify |
//!
//! An attacker able to rewrite the baseline along with the file defeats
//! hash-mismatch detection.

// ── Engine ──────────────────────────────────────────────────────────

pub use super::engine::{
    DEFAULT_BURST_THRESHOLD, DEFAULT_BURST_WINDOW, DEFAULT_LARGE_FILE_BYTES,
    DEFAULT_LOCK_TIMEOUT, DEFAULT_MAX_AUDIT_ENTRIES, DEFAULT_THROTTLE_INTERVAL, EngineSettings,
    SecurityEngine,
};
pub use super::error::{EngineError, EngineResult};

// ── Alerts ──────────────────────────────────────────────────────────

pub use super::alert::{Alert, AlertDetails, Severity};

// ── Path Classification ─────────────────────────────────────────────

pub use super::classifier::{
    PathClass, PathClassifier, SUSPICIOUS_EXTENSIONS, is_hidden, is_suspicious_path,
    is_transient, matches_enabled_skills, matches_ignored, suspicious_extension,
};

// ── Rate Tracking ───────────────────────────────────────────────────

pub use super::burst::BurstDetector;
pub use super::throttle::ThrottleGate;

// ── Audit Log ───────────────────────────────────────────────────────

pub use super::audit::{
    AUDIT_FILENAME, AuditEntry, AuditLog, EventKind, audit_file_path, list_archives,
    read_archive,
};

// ── Integrity ───────────────────────────────────────────────────────

pub use super::integrity::{
    INTEGRITY_DB_FILENAME, IntegrityRecord, IntegrityStore, StatSnapshot, diff_attributes,
    file_sha256, verify_record,
};

// ── Reports ─────────────────────────────────────────────────────────

pub use super::report::{ReportInput, TIMELINE_LIMIT, format_size, render as render_report};

// ── Persistence ─────────────────────────────────────────────────────

pub use super::persist::Persister;
