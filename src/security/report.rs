//! Markdown audit report rendering.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use super::alert::Alert;
use super::audit::AuditEntry;
use super::classifier::is_suspicious_path;
use super::error::{EngineError, EngineResult};

/// Timeline rows kept at the end of the report.
pub const TIMELINE_LIMIT: usize = 100;

const HASH_PREVIEW_CHARS: usize = 12;

/// Inputs for one report. Entries are expected already filtered to the period.
#[derive(Debug)]
pub struct ReportInput<'a> {
    pub entries: &'a [AuditEntry],
    pub integrity_alerts: &'a [Alert],
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
    pub generated_at: String,
}

/// Render the report document.
pub fn render(input: &ReportInput<'_>) -> String {
    let mut out = String::new();

    out.push_str("# Security Audit Report\n\n");
    let range_start = input
        .start
        .map(|s| s.to_rfc3339())
        .unwrap_or_else(|| "(all time)".to_string());
    let _ = writeln!(out, "**Period:** {} to {}", range_start, input.end.to_rfc3339());
    let _ = writeln!(out, "**Generated:** {}", input.generated_at);
    out.push('\n');

    render_summary(&mut out, input);
    render_suspicious(&mut out, input.entries);
    render_violations(&mut out, input.integrity_alerts);
    render_timeline(&mut out, input.entries);

    out
}

fn render_summary(out: &mut String, input: &ReportInput<'_>) {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in input.entries {
        *counts.entry(entry.event_type.as_str()).or_default() += 1;
    }

    out.push_str("## Summary\n\n");
    let _ = writeln!(out, "- **Total events:** {}", input.entries.len());
    for (event_type, count) in &counts {
        let _ = writeln!(out, "  - {}: {}", event_type, count);
    }
    let _ = writeln!(
        out,
        "- **Integrity alerts:** {}",
        input.integrity_alerts.len()
    );
    out.push('\n');
}

fn render_suspicious(out: &mut String, entries: &[AuditEntry]) {
    out.push_str("## Suspicious Events\n\n");
    let suspicious: Vec<_> = entries
        .iter()
        .filter(|e| is_suspicious_path(Path::new(&e.path)))
        .collect();

    if suspicious.is_empty() {
        out.push_str("No suspicious events detected.\n\n");
        return;
    }

    out.push_str("| Timestamp | Event | Path | Size |\n");
    out.push_str("|-----------|-------|------|------|\n");
    for entry in suspicious {
        let size = entry
            .file_size
            .map(format_size)
            .unwrap_or_else(|| "N/A".to_string());
        let _ = writeln!(
            out,
            "| {} | {} | `{}` | {} |",
            entry.timestamp, entry.event_type, entry.path, size
        );
    }
    out.push('\n');
}

fn render_violations(out: &mut String, alerts: &[Alert]) {
    out.push_str("## Integrity Violations\n\n");
    if alerts.is_empty() {
        out.push_str("No integrity violations detected.\n\n");
        return;
    }

    out.push_str("| Level | File | Message | Details |\n");
    out.push_str("|-------|------|---------|---------|\n");
    for alert in alerts {
        let _ = writeln!(
            out,
            "| {} | `{}` | {} | {} |",
            alert.severity,
            alert.path,
            alert.message,
            alert.details_summary()
        );
    }
    out.push('\n');
}

fn render_timeline(out: &mut String, entries: &[AuditEntry]) {
    let _ = writeln!(out, "## Event Timeline (last {})\n", TIMELINE_LIMIT);
    if entries.is_empty() {
        out.push_str("No events in the selected period.\n");
        return;
    }

    out.push_str("| Timestamp | Event | Path | Hash |\n");
    out.push_str("|-----------|-------|------|------|\n");
    let recent = &entries[entries.len().saturating_sub(TIMELINE_LIMIT)..];
    for entry in recent {
        let hash = entry
            .file_hash
            .as_deref()
            .filter(|h| !h.is_empty())
            .map(|h| format!("{}...", h.chars().take(HASH_PREVIEW_CHARS).collect::<String>()))
            .unwrap_or_else(|| "N/A".to_string());
        let _ = writeln!(
            out,
            "| {} | {} | `{}` | {} |",
            entry.timestamp, entry.event_type, entry.path, hash
        );
    }
}

/// Write a rendered report, creating parent directories.
pub fn write_report(output: &Path, text: &str) -> EngineResult<PathBuf> {
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| EngineError::persist(parent, e))?;
    }
    fs::write(output, text).map_err(|e| EngineError::persist(output, e))?;
    Ok(output.to_path_buf())
}

/// Human-readable byte count: `512 B`, `1.5 KB`, `50.0 MB`.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else if b < GB {
        format!("{:.1} MB", b / MB)
    } else {
        format!("{:.1} GB", b / GB)
    }
}
