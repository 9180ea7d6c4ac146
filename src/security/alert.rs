//! Alert values handed to the host's notification layer.

use serde::Serialize;
use std::fmt;

use super::audit::EventKind;

/// Severity levels for security alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule-specific detail fields. Each rule has a fixed shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertDetails {
    SuspiciousExtension {
        extension: String,
        event_type: EventKind,
        file_size: Option<u64>,
    },
    HiddenFile {
        event_type: EventKind,
    },
    Burst {
        directory: String,
        event_type: EventKind,
        burst_threshold: usize,
        burst_window_secs: f64,
    },
    LargeFile {
        file_size: u64,
        threshold: u64,
        event_type: EventKind,
    },
    /// Content changed on a `modified` event.
    HashMismatch {
        old_hash: String,
        new_hash: String,
        event_type: EventKind,
    },
    /// Content and attributes changed on a `modified` event.
    ModifiedWithAttributes {
        old_hash: String,
        new_hash: String,
        attribute_changes: Vec<String>,
        event_type: EventKind,
    },
    /// Content differs from the baseline during verification.
    BaselineMismatch {
        expected_hash: String,
        current_hash: String,
    },
    MissingFile {
        expected_hash: String,
        baseline_date: String,
    },
    Unreadable {
        error: String,
    },
    AttributeDrift {
        attribute_changes: Vec<String>,
    },
}

impl AlertDetails {
    /// Ordered `(key, value)` pairs for rendering.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::SuspiciousExtension {
                extension,
                event_type,
                file_size,
            } => vec![
                ("extension", extension.clone()),
                ("event_type", event_type.to_string()),
                ("file_size", optional(file_size)),
            ],
            Self::HiddenFile { event_type } => vec![("event_type", event_type.to_string())],
            Self::Burst {
                directory,
                event_type,
                burst_threshold,
                burst_window_secs,
            } => vec![
                ("directory", directory.clone()),
                ("event_type", event_type.to_string()),
                ("burst_threshold", burst_threshold.to_string()),
                ("burst_window_seconds", burst_window_secs.to_string()),
            ],
            Self::LargeFile {
                file_size,
                threshold,
                event_type,
            } => vec![
                ("file_size", file_size.to_string()),
                ("threshold", threshold.to_string()),
                ("event_type", event_type.to_string()),
            ],
            Self::HashMismatch {
                old_hash,
                new_hash,
                event_type,
            } => vec![
                ("old_hash", old_hash.clone()),
                ("new_hash", new_hash.clone()),
                ("event_type", event_type.to_string()),
            ],
            Self::ModifiedWithAttributes {
                old_hash,
                new_hash,
                attribute_changes,
                event_type,
            } => vec![
                ("old_hash", old_hash.clone()),
                ("new_hash", new_hash.clone()),
                ("attribute_changes", attribute_changes.join(", ")),
                ("event_type", event_type.to_string()),
            ],
            Self::BaselineMismatch {
                expected_hash,
                current_hash,
            } => vec![
                ("expected_hash", expected_hash.clone()),
                ("current_hash", current_hash.clone()),
            ],
            Self::MissingFile {
                expected_hash,
                baseline_date,
            } => vec![
                ("expected_hash", expected_hash.clone()),
                ("baseline_date", baseline_date.clone()),
            ],
            Self::Unreadable { error } => vec![("error", error.clone())],
            Self::AttributeDrift { attribute_changes } => {
                vec![("attribute_changes", attribute_changes.join(", "))]
            }
        }
    }
}

fn optional<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "None".to_string())
}

/// A single security alert. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    #[serde(rename = "level")]
    pub severity: Severity,
    pub message: String,
    #[serde(rename = "file_path")]
    pub path: String,
    /// ISO 8601 UTC timestamp.
    pub timestamp: String,
    pub details: AlertDetails,
}

impl Alert {
    pub fn new(
        severity: Severity,
        message: impl Into<String>,
        path: impl Into<String>,
        timestamp: impl Into<String>,
        details: AlertDetails,
    ) -> Self {
        Self {
            severity,
            message: message.into(),
            path: path.into(),
            timestamp: timestamp.into(),
            details,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    /// Details rendered as `key=value; key=value`.
    pub fn details_summary(&self) -> String {
        self.details
            .pairs()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.message, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_by_urgency() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn serializes_level_uppercase_with_tagged_details() {
        let alert = Alert::new(
            Severity::Critical,
            "Suspicious file type detected: .exe",
            "/srv/malware.exe",
            "2026-02-20T10:00:00+00:00",
            AlertDetails::SuspiciousExtension {
                extension: ".exe".to_string(),
                event_type: EventKind::Created,
                file_size: None,
            },
        );

        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["level"], "CRITICAL");
        assert_eq!(json["file_path"], "/srv/malware.exe");
        assert_eq!(json["details"]["kind"], "suspicious_extension");
        assert_eq!(json["details"]["event_type"], "created");
    }

    #[test]
    fn detail_pairs_keep_declared_order() {
        let details = AlertDetails::Burst {
            directory: "/srv/skills".to_string(),
            event_type: EventKind::Modified,
            burst_threshold: 10,
            burst_window_secs: 5.0,
        };
        let keys: Vec<_> = details.pairs().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                "directory",
                "event_type",
                "burst_threshold",
                "burst_window_seconds"
            ]
        );
    }

    #[test]
    fn display_and_summary() {
        let alert = Alert::new(
            Severity::Warning,
            "Hidden file created: .env",
            "/srv/.env",
            "2026-02-20T10:00:00+00:00",
            AlertDetails::HiddenFile {
                event_type: EventKind::Created,
            },
        );
        assert_eq!(
            alert.to_string(),
            "[WARNING] Hidden file created: .env: /srv/.env"
        );
        assert_eq!(alert.details_summary(), "event_type=created");
        assert!(!alert.is_critical());
    }
}
