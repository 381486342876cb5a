//! Per-day counters for capped operations (e.g. the outbound send limit).
//!
//! Backed by `Logs/.count_<name>_<yyyy-mm-dd>.json` holding `{"count": n}`.
//! A new day gets a new file, so the cap resets at UTC midnight.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Default)]
struct CountFile {
    count: u32,
}

/// Daily rate counters over a vault's `Logs/` directory.
#[derive(Debug, Clone)]
pub struct RateCounter {
    logs_dir: PathBuf,
}

impl RateCounter {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self { logs_dir: logs_dir.into() }
    }

    fn counter_file(&self, name: &str) -> PathBuf {
        let today = Utc::now().format("%Y-%m-%d");
        self.logs_dir.join(format!(".count_{name}_{today}.json"))
    }

    /// Current count for today, 0 when the file is absent.
    pub fn count(&self, name: &str) -> u32 {
        let file = self.counter_file(name);
        let Ok(text) = fs::read_to_string(&file) else {
            return 0;
        };
        serde_json::from_str::<CountFile>(&text).map(|c| c.count).unwrap_or(0)
    }

    /// True while today's count is strictly below `limit`.
    pub fn check(&self, name: &str, limit: u32) -> bool {
        self.count(name) < limit
    }

    /// Increment today's counter, returning the new count.
    pub fn increment(&self, name: &str) -> Result<u32> {
        fs::create_dir_all(&self.logs_dir).context("failed to create Logs directory")?;
        let count = self.count(name) + 1;
        let file = self.counter_file(name);
        fs::write(&file, serde_json::to_string(&CountFile { count })?)
            .with_context(|| format!("failed to write counter {}", file.display()))?;
        Ok(count)
    }
}
