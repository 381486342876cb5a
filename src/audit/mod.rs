//! Append-only audit trail, partitioned by UTC calendar day.
//!
//! Every state change in the pipeline is recorded here with actor, action,
//! source and result. One JSON array file per day under `Logs/`; entries are
//! never mutated. The single-writer-per-zone rule (one scheduler cycle at a
//! time) is what makes the read-append-rewrite safe.

pub mod quota;

pub use quota::RateCounter;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub source: String,
    pub result: String,
}

/// The daily log sink over a vault's `Logs/` directory.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    logs_dir: PathBuf,
}

impl ActivityLog {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self { logs_dir: logs_dir.into() }
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    fn day_file(&self, date: NaiveDate) -> PathBuf {
        self.logs_dir.join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    /// Append an entry to today's file (read, push, rewrite).
    pub fn append(&self, actor: &str, action: &str, source: &str, result: &str) -> Result<()> {
        fs::create_dir_all(&self.logs_dir).context("failed to create Logs directory")?;
        let now = Utc::now();
        let file = self.day_file(now.date_naive());

        let mut entries: Vec<LogEntry> = if file.exists() {
            let text = fs::read_to_string(&file).context("failed to read daily log")?;
            serde_json::from_str(&text).unwrap_or_default()
        } else {
            Vec::new()
        };

        entries.push(LogEntry {
            timestamp: now,
            actor: actor.to_string(),
            action: action.to_string(),
            source: source.to_string(),
            result: result.to_string(),
        });

        let json = serde_json::to_string_pretty(&entries).context("failed to serialize log")?;
        fs::write(&file, json).context("failed to write daily log")?;
        Ok(())
    }

    /// All entries from day files dated `since` or later. The filter is on
    /// the parsed calendar date in the filename, not entry timestamps.
    pub fn entries_since(&self, since: NaiveDate) -> Result<Vec<LogEntry>> {
        let mut all = Vec::new();
        if !self.logs_dir.exists() {
            return Ok(all);
        }
        let mut files: Vec<PathBuf> = fs::read_dir(&self.logs_dir)
            .context("failed to read Logs directory")?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();
        files.sort();

        for file in files {
            let Some(stem) = file.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            // Counter files and other dotfiles have non-date stems.
            let Ok(date) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") else {
                continue;
            };
            if date < since {
                continue;
            }
            let Ok(text) = fs::read_to_string(&file) else { continue };
            if let Ok(mut entries) = serde_json::from_str::<Vec<LogEntry>>(&text) {
                all.append(&mut entries);
            }
        }
        Ok(all)
    }

    /// The newest `n` entries of today's file, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        let file = self.day_file(Utc::now().date_naive());
        let Ok(text) = fs::read_to_string(&file) else {
            return Vec::new();
        };
        let entries: Vec<LogEntry> = serde_json::from_str(&text).unwrap_or_default();
        let skip = entries.len().saturating_sub(n);
        entries.into_iter().skip(skip).collect()
    }
}
