//! Typed error hierarchy for the steward pipeline.
//!
//! Two layers:
//! - `Fault`: the Transient/Permanent split every fallible pipeline
//!   operation reports in. The retry wrapper matches on it exhaustively.
//! - Per-subsystem enums (`StoreError`, `MailError`, `SyncError`) that
//!   convert into `Fault` at the orchestration boundary.

use std::path::PathBuf;
use thiserror::Error;

/// A pipeline fault, tagged by whether retrying can help.
///
/// Transient faults (network, timeout, remote 5xx) are candidates for the
/// retry wrapper and, when exhausted, for quarantine. Permanent faults
/// (auth revoked, schema violation, quota logically exceeded) bypass
/// retries entirely.
#[derive(Debug, Error)]
pub enum Fault {
    #[error("transient: {0}")]
    Transient(#[source] anyhow::Error),

    #[error("permanent: {0}")]
    Permanent(#[source] anyhow::Error),
}

impl Fault {
    pub fn transient(msg: impl Into<String>) -> Self {
        Fault::Transient(anyhow::anyhow!(msg.into()))
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Fault::Permanent(anyhow::anyhow!(msg.into()))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Fault::Transient(_))
    }

    /// The human-readable reason without the kind prefix.
    pub fn reason(&self) -> String {
        match self {
            Fault::Transient(e) | Fault::Permanent(e) => e.to_string(),
        }
    }
}

/// Errors from the content store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact not found: {0}")]
    NotFound(PathBuf),

    #[error("destination already exists: {0}")]
    DestinationExists(PathBuf),

    #[error("path {0} is outside any vault state folder")]
    OutsideVault(PathBuf),

    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the mail provider boundary.
///
/// The transient/permanent boundary for sends is fixed here so the
/// orchestrator's failure matrix is statically exhaustive.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail operation timed out")]
    Timeout,

    #[error("mail provider rate limited the request")]
    RateLimited,

    #[error("mail provider unavailable: {0}")]
    Unavailable(String),

    #[error("mail authorization revoked: {0}")]
    AuthRevoked(String),

    #[error("message not found: {0}")]
    NotFound(String),

    #[error("mail provider rejected the payload: {0}")]
    Rejected(String),
}

impl MailError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MailError::Timeout | MailError::RateLimited | MailError::Unavailable(_)
        )
    }
}

impl From<MailError> for Fault {
    fn from(err: MailError) -> Self {
        if err.is_transient() {
            Fault::Transient(err.into())
        } else {
            Fault::Permanent(err.into())
        }
    }
}

/// Errors from the cross-zone sync transport.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("vault is not a git repository; run init_sync first")]
    NotARepo,

    #[error("git {op} failed: {detail}")]
    Git { op: &'static str, detail: String },

    #[error("git command timed out: {0}")]
    Timeout(String),

    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("item already claimed by {agent}: {name}")]
    AlreadyClaimed { agent: String, name: String },
}
