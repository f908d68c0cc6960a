//! Daily API usage tracking.
//!
//! Persists request counts per day to a JSON file so quota use can be
//! checked across runs.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Request counts keyed by `YYYY-MM-DD`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageLog {
    days: BTreeMap<String, u64>,
}

impl UsageLog {
    /// Load the usage log, or an empty one if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read usage log: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse usage log: {}", path.display()))
    }

    /// Save the usage log, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create usage log directory: {}", parent.display())
            })?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize usage log")?;

        fs::write(path, json)
            .with_context(|| format!("Failed to write usage log: {}", path.display()))?;

        Ok(())
    }

    fn key(date: NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }

    /// Add `count` requests to `date` and return the new total for that day.
    pub fn record(&mut self, date: NaiveDate, count: u64) -> u64 {
        let total = self.days.entry(Self::key(date)).or_insert(0);
        *total += count;
        *total
    }

    /// Requests recorded for `date`.
    #[cfg(test)]
    pub fn count_for(&self, date: NaiveDate) -> u64 {
        self.days.get(&Self::key(date)).copied().unwrap_or(0)
    }
}

/// Add this run's requests to today's entry in the usage log at `path`.
///
/// # Details
/// The daily limit is informational: exceeding it only produces a warning.
pub fn log_usage(path: &Path, request_count: u32, daily_limit: u64) -> Result<UsageLog> {
    let today = Local::now().date_naive();
    let mut log = UsageLog::load(path)?;
    let used = log.record(today, u64::from(request_count));
    log.save(path)?;

    if used > daily_limit {
        warn!(used, daily_limit, "Daily request limit exceeded");
    } else {
        info!(
            used,
            daily_limit,
            remaining = daily_limit - used,
            "Daily usage"
        );
    }

    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_record_accumulates_per_day() {
        let mut log = UsageLog::default();
        assert_eq!(log.record(date(2024, 5, 1), 3), 3);
        assert_eq!(log.record(date(2024, 5, 1), 5), 8);
        assert_eq!(log.record(date(2024, 5, 2), 1), 1);
        assert_eq!(log.count_for(date(2024, 5, 1)), 8);
        assert_eq!(log.count_for(date(2024, 5, 3)), 0);
    }

    #[test]
    fn test_log_usage_twice_same_day() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tiktok_api_usage_log.json");

        log_usage(&path, 3, 1000).unwrap();
        let log = log_usage(&path, 5, 1000).unwrap();

        let today = Local::now().date_naive();
        assert_eq!(log.count_for(today), 8);
        assert_eq!(UsageLog::load(&path).unwrap().count_for(today), 8);
    }

    #[test]
    fn test_file_is_plain_date_map() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("usage.json");

        fs::write(&path, r#"{"2024-01-01": 12}"#).unwrap();
        let mut log = UsageLog::load(&path).unwrap();
        log.record(date(2024, 1, 2), 4);
        log.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"2024-01-01": 12, "2024-01-02": 4}));
    }

    #[test]
    fn test_log_usage_over_limit_still_records() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("usage.json");

        let log = log_usage(&path, 20, 10).unwrap();
        assert_eq!(log.count_for(Local::now().date_naive()), 20);
    }
}
