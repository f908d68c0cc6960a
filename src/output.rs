//! Output files and the end-of-run summary.

use crate::extractor::ExtractionResult;
use crate::tiktok::RelatedResource;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde_json::Value;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// `<username>_FULL_DATA_<YYYYmmdd_HHMMSS>.json`.
///
/// Characters that are not safe in a file name are replaced with `_`.
pub fn output_file_name(username: &str, at: DateTime<Local>) -> String {
    let safe: String = username
        .trim_start_matches('@')
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}_FULL_DATA_{}.json", at.format("%Y%m%d_%H%M%S"))
}

/// Write the result as pretty JSON into `dir`, returning the file path.
///
/// # Details
/// Creates `dir` if needed. Two runs for the same user within one second
/// write to the same name.
pub fn write_output(result: &ExtractionResult, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let path = dir.join(output_file_name(&result.username, Local::now()));
    let json = serde_json::to_string_pretty(result).context("Failed to serialize results")?;

    fs::write(&path, json)
        .with_context(|| format!("Failed to write output file: {}", path.display()))?;

    info!(path = %path.display(), "Data saved");
    Ok(path)
}

fn format_count(value: Option<&Value>) -> String {
    let Some(n) = value.and_then(Value::as_u64) else {
        return "0".to_string();
    };
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Human-readable summary printed after a successful run.
pub fn summary(result: &ExtractionResult) -> String {
    let mut out = String::from("DATA SUMMARY:\n");
    let profile = &result.profile;

    let _ = writeln!(out, "Username: @{}", result.username);
    if !profile.is_empty() {
        let display_name = profile
            .get("display_name")
            .and_then(Value::as_str)
            .unwrap_or("N/A");
        let _ = writeln!(out, "Display Name: {display_name}");
        let _ = writeln!(out, "Followers: {}", format_count(profile.get("follower_count")));
        let _ = writeln!(out, "Videos: {}", format_count(profile.get("video_count")));
    }

    let _ = writeln!(out, "Videos extracted: {}", result.videos.len());
    for kind in RelatedResource::ALL {
        if let Some(records) = result.related(kind) {
            let _ = writeln!(out, "{} extracted: {}", capitalize(kind.name()), records.len());
        }
    }
    let _ = write!(out, "Requests used: {}", result.request_count);
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
