//! Shared utility functions for the ideation crate.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use crate::errors::{InvokeError, truncate_chars};

static FENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```(?:json)?\s*").unwrap());

/// Extract the first balanced JSON object or array from free-form text.
///
/// Markdown code fences are stripped first. Scanning starts at the first `{`
/// or `[` and stops at its matching close bracket; brackets inside quoted
/// strings are ignored and backslash escapes are honored. Trailing prose after
/// the close bracket is never parsed.
pub fn extract_json(raw: &str) -> Result<serde_json::Value, InvokeError> {
    let cleaned = FENCE_REGEX.replace_all(raw, "");
    let cleaned = cleaned.trim();

    let Some((start, open)) = cleaned.char_indices().find(|(_, ch)| *ch == '{' || *ch == '[')
    else {
        return Err(InvokeError::NoJson {
            preview: truncate_chars(raw, 200),
        });
    };
    let close = if open == '{' { '}' } else { ']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;
    let mut end = None;

    for (i, ch) in cleaned[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if ch == '\\' {
            escape_next = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                end = Some(start + i + ch.len_utf8());
                break;
            }
        }
    }

    let Some(end) = end else {
        return Err(InvokeError::Unbalanced {
            preview: truncate_chars(&cleaned[start..], 300),
        });
    };

    serde_json::from_str(&cleaned[start..end]).map_err(|source| InvokeError::Parse {
        source,
        preview: truncate_chars(&cleaned[start..], 300),
    })
}

/// Generate a time-sortable batch id: `YYYYMMDD-HHMM-xxxxxxxx`.
pub fn generate_batch_id(now: DateTime<Local>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", now.format("%Y%m%d-%H%M"), &suffix[..8])
}

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Append one JSON record as a line to a JSONL file, creating parents as needed.
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let line = serde_json::to_string(record).context("Failed to serialize JSONL record")?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    writeln!(file, "{}", line).with_context(|| format!("Failed to append to {}", path.display()))?;
    Ok(())
}

/// Read every parseable record from a JSONL file. Missing file yields an empty
/// list; malformed lines are skipped.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let records = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "skipping malformed JSONL line");
                None
            }
        })
        .collect();
    Ok(records)
}

/// Write JSON to a temp file next to `path`, then rename over it.
pub fn atomic_json_write<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    let content = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    std::fs::write(&tmp, content)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}
