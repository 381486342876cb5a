//! Bounded retry with exponential backoff, and the quarantine holding area
//! for artifacts whose processing kept failing transiently.
//!
//! Permanent faults bypass retries. Artifacts that exhaust the retry budget
//! are moved to `Quarantine/` with two header fields recording the reason
//! and time; a sweeper runs each cycle and reinstates anything older than
//! `min_age`, stripping those fields.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::Fault;
use crate::store::{Folder, Vault};

pub const QUARANTINE_ERROR_KEY: &str = "quarantine_error";
pub const QUARANTINE_TIME_KEY: &str = "quarantine_time";

/// Default minimum age before a quarantined item is retried.
pub const DEFAULT_MIN_AGE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying after the given 1-based attempt:
    /// `base · 2^(attempt-1)`, clamped by `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `op` up to `policy.max_attempts` times, backing off between
/// Transient failures. Permanent faults are returned immediately.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, Fault>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Fault>>,
{
    let mut last_error = None;
    for attempt in 1..=policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(fault @ Fault::Permanent(_)) => return Err(fault),
            Err(fault) => {
                if attempt < policy.max_attempts {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        "attempt {attempt}/{} failed: {}; retrying in {:.1}s",
                        policy.max_attempts,
                        fault.reason(),
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                } else {
                    tracing::error!(
                        "all {} attempts exhausted; last error: {}",
                        policy.max_attempts,
                        fault.reason()
                    );
                }
                last_error = Some(fault);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| Fault::transient("retry budget was zero")))
}

/// Move a failed artifact into `Quarantine/`, tagging its header with the
/// error and the current time.
pub fn quarantine_artifact(vault: &Vault, path: &Path, error_msg: &str) -> anyhow::Result<PathBuf> {
    let (mut header, body) = vault.read(path)?;
    header.set(QUARANTINE_ERROR_KEY, error_msg);
    header.set(QUARANTINE_TIME_KEY, Utc::now().to_rfc3339());

    let (_, rel) = vault.locate(path)?;
    let dest = vault.dir(Folder::Quarantine).join(&rel);
    vault.write_raw(&dest, &header.render(&body))?;
    vault.delete(path)?;
    tracing::info!("quarantined {}: {error_msg}", rel.display());
    Ok(dest)
}

/// Sweep `Quarantine/`, returning to `Needs_Action` every artifact whose age
/// exceeds `min_age`. Items without a parseable quarantine time count as
/// infinitely old. Returns the reinstated paths.
pub fn process_quarantine(vault: &Vault, min_age: Duration) -> anyhow::Result<Vec<PathBuf>> {
    let mut moved = Vec::new();
    let now = Utc::now();

    for item in vault.list(Folder::Quarantine)? {
        let (mut header, body) = vault.read(&item)?;

        let age = header
            .get(QUARANTINE_TIME_KEY)
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| now.signed_duration_since(t.with_timezone(&Utc)));
        if let Some(age) = age
            && age.num_seconds() >= 0
            && (age.num_seconds() as u64) < min_age.as_secs()
        {
            continue;
        }

        header.remove(QUARANTINE_ERROR_KEY);
        header.remove(QUARANTINE_TIME_KEY);

        let (_, rel) = vault.locate(&item)?;
        let dest = vault.dir(Folder::NeedsAction).join(&rel);
        vault.write_raw(&dest, &header.render(&body))?;
        vault.delete(&item)?;
        tracing::info!("restored {} from quarantine", rel.display());
        moved.push(dest);
    }
    Ok(moved)
}
