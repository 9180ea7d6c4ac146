//! Path admission rules.
//!
//! Decides, without touching the file system, whether a change
//! notification is write-mechanics noise (atomic-write temp files, lock
//! sidecars), the engine's own persistence traffic, excluded by the
//! configured ignore patterns, or outside the enabled skill scopes.
//!
//! The self-referential check is what keeps the engine from looping:
//! persisting the audit log produces a change notification for the audit
//! log, which must never be appended to the audit log.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Component, Path, PathBuf};

/// Extensions (lowercase, with leading dot) flagged as executable or script content.
pub const SUSPICIOUS_EXTENSIONS: &[&str] = &[
    ".exe", ".dll", ".bat", ".cmd", ".ps1", ".vbs", ".js", ".scr", ".com", ".msi",
];

/// Filename conventions for atomic writes and lock sidecars:
/// `.tmp_<rand>.<ext>`, `<name>.tmp.<pid>.<ts>` and `<name>.lock`.
static TRANSIENT_FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^\.tmp_[a-z0-9_]+\..+$)|(\.tmp\.\d+\.\d+$)|(\.lock$)")
        .expect("transient filename pattern is valid")
});

/// Outcome of classifying a path, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    Transient,
    SelfReferential,
    Ignored,
    ScopeExcluded,
    Admissible,
}

impl PathClass {
    pub fn is_admissible(self) -> bool {
        self == Self::Admissible
    }
}

/// Classifier bound to one engine's security directory and filter config.
#[derive(Debug, Clone)]
pub struct PathClassifier {
    security_dir: PathBuf,
    /// Resolved form, for watchers that report canonical paths through symlinks.
    canonical_security_dir: Option<PathBuf>,
    ignored_patterns: Vec<String>,
    enabled_skills: Vec<String>,
}

impl PathClassifier {
    pub fn new(
        security_dir: impl Into<PathBuf>,
        ignored_patterns: Vec<String>,
        enabled_skills: Vec<String>,
    ) -> Self {
        let security_dir = security_dir.into();
        let canonical_security_dir = security_dir
            .canonicalize()
            .ok()
            .filter(|c| *c != security_dir);
        Self {
            security_dir,
            canonical_security_dir,
            ignored_patterns,
            enabled_skills,
        }
    }

    pub fn security_dir(&self) -> &Path {
        &self.security_dir
    }

    pub fn classify(&self, path: &Path) -> PathClass {
        if is_transient(path) {
            PathClass::Transient
        } else if self.is_self_referential(path) {
            PathClass::SelfReferential
        } else if matches_ignored(path, &self.ignored_patterns) {
            PathClass::Ignored
        } else if !matches_enabled_skills(path, &self.enabled_skills) {
            PathClass::ScopeExcluded
        } else {
            PathClass::Admissible
        }
    }

    /// True if `path` lies inside the security directory.
    pub fn is_self_referential(&self, path: &Path) -> bool {
        path.starts_with(&self.security_dir)
            || self
                .canonical_security_dir
                .as_ref()
                .is_some_and(|dir| path.starts_with(dir))
    }

    /// Transient or self-referential: never audited, never alerted.
    pub fn is_noise(&self, path: &Path) -> bool {
        is_transient(path) || self.is_self_referential(path)
    }
}

/// True if the filename follows an atomic-write or lock naming convention.
pub fn is_transient(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| TRANSIENT_FILE_RE.is_match(name))
}

/// True if any component equals a pattern, or the path ends with the
/// text following a leading `*`.
pub fn matches_ignored(path: &Path, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let path_str = path.to_string_lossy();
    patterns.iter().any(|pattern| {
        if has_component(path, pattern) {
            return true;
        }
        pattern
            .strip_prefix('*')
            .is_some_and(|suffix| path_str.ends_with(suffix))
    })
}

/// True if `enabled_skills` is empty or the path contains one of its names
/// as a component.
pub fn matches_enabled_skills(path: &Path, enabled_skills: &[String]) -> bool {
    enabled_skills.is_empty() || enabled_skills.iter().any(|skill| has_component(path, skill))
}

fn has_component(path: &Path, name: &str) -> bool {
    path.components().any(|c| match c {
        Component::Normal(part) => part.to_str() == Some(name),
        _ => false,
    })
}

/// Lowercase extension with its leading dot, if it is on the denylist.
pub fn suspicious_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    let dotted = format!(".{}", ext);
    SUSPICIOUS_EXTENSIONS
        .contains(&dotted.as_str())
        .then_some(dotted)
}

/// Dot-prefixed filename.
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

/// Report predicate: suspicious extension or hidden name, excluding transient files.
pub fn is_suspicious_path(path: &Path) -> bool {
    if is_transient(path) {
        return false;
    }
    suspicious_extension(path).is_some() || is_hidden(path)
}
