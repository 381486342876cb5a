//! The content store ("vault"): a filesystem directory with a prescribed
//! folder layout, holding one text artifact per unit of work.
//!
//! The store does not interpret content; semantic parsing lives in the
//! planner and orchestrator. What it does guarantee:
//! - writes are atomic (write-to-temp-then-rename)
//! - moves are atomic renames that fail if the destination exists
//! - listing is name-ordered and recurses into sub-folders
//! - `ensure_layout` is idempotent and always creates the full folder
//!   superset, plus the handbook and memory seed files

pub mod header;

pub use header::Header;

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::errors::StoreError;

/// The vault state folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Folder {
    NeedsAction,
    Plans,
    PendingApproval,
    Approved,
    Rejected,
    Done,
    Logs,
    IncomingFiles,
    Quarantine,
    InProgress,
    Updates,
    Briefings,
}

impl Folder {
    pub const ALL: [Folder; 12] = [
        Folder::NeedsAction,
        Folder::Plans,
        Folder::PendingApproval,
        Folder::Approved,
        Folder::Rejected,
        Folder::Done,
        Folder::Logs,
        Folder::IncomingFiles,
        Folder::Quarantine,
        Folder::InProgress,
        Folder::Updates,
        Folder::Briefings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Folder::NeedsAction => "Needs_Action",
            Folder::Plans => "Plans",
            Folder::PendingApproval => "Pending_Approval",
            Folder::Approved => "Approved",
            Folder::Rejected => "Rejected",
            Folder::Done => "Done",
            Folder::Logs => "Logs",
            Folder::IncomingFiles => "Incoming_Files",
            Folder::Quarantine => "Quarantine",
            Folder::InProgress => "In_Progress",
            Folder::Updates => "Updates",
            Folder::Briefings => "Briefings",
        }
    }
}

impl std::fmt::Display for Folder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Seed text for the handbook created on first layout.
const DEFAULT_HANDBOOK: &str = "\
# Company Handbook

## About
This handbook contains rules and preferences that guide steward's behavior.
Edit this file to customize how incoming items are processed.

## Processing Rules
- Prioritize items from known contacts
- Flag invoices and payment requests for approval
- Archive newsletters after summarizing
- Urgent keywords: \"urgent\", \"asap\", \"deadline\", \"overdue\"

## Approval Thresholds
- All outbound replies: require approval
- All payment-related actions: require approval
- Archiving/labeling: auto-approve

## Tone & Style
- Professional and concise in all drafted responses
- Match the sender's formality level
- Always acknowledge receipt of important items
";

/// Seed header for the memory file.
const MEMORY_HEADER: &str = "\
# Agent Memory

Learnings extracted from rejected plans. Each bullet is fed back into every
subsequent planning prompt.
";

/// Handle to a vault on disk.
#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
}

impl Vault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, folder: Folder) -> PathBuf {
        self.root.join(folder.as_str())
    }

    pub fn handbook_path(&self) -> PathBuf {
        self.root.join("Company_Handbook.md")
    }

    pub fn memory_path(&self) -> PathBuf {
        self.root.join("Agent_Memory.md")
    }

    pub fn dashboard_path(&self) -> PathBuf {
        self.root.join("Dashboard.md")
    }

    /// Idempotently create the full folder superset and seed files.
    pub fn ensure_layout(&self) -> Result<()> {
        for folder in Folder::ALL {
            fs::create_dir_all(self.dir(folder))
                .with_context(|| format!("failed to create {}", folder.as_str()))?;
        }
        fs::create_dir_all(self.dir(Folder::IncomingFiles).join(".processed"))
            .context("failed to create Incoming_Files/.processed")?;

        let handbook = self.handbook_path();
        if !handbook.exists() {
            fs::write(&handbook, DEFAULT_HANDBOOK).context("failed to seed handbook")?;
        }
        let memory = self.memory_path();
        if !memory.exists() {
            fs::write(&memory, MEMORY_HEADER).context("failed to seed memory file")?;
        }
        Ok(())
    }

    /// List artifacts in a folder, recursing into sub-folders, ordered by
    /// path name. Dotfiles (counters, temp files) are skipped.
    pub fn list(&self, folder: Folder) -> Result<Vec<PathBuf>> {
        let dir = self.dir(folder);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let hidden = |name: &std::ffi::OsStr| {
            name.to_str().map(|n| n.starts_with('.')).unwrap_or(true)
        };
        let mut paths: Vec<PathBuf> = WalkDir::new(&dir)
            .sort_by_file_name()
            .into_iter()
            // Skip dotfiles and dot-directories (counters, temp files,
            // Incoming_Files/.processed).
            .filter_entry(|e| e.depth() == 0 || !hidden(e.file_name()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Read an artifact into (header, body).
    pub fn read(&self, path: &Path) -> Result<(Header, String), StoreError> {
        let text = fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(path.to_path_buf())
            } else {
                StoreError::Io { action: "read", path: path.to_path_buf(), source }
            }
        })?;
        Ok(Header::parse_document(&text))
    }

    /// Atomically write an artifact under `folder/name`. `name` may contain
    /// sub-folder components. Returns the written path.
    pub fn write(
        &self,
        folder: Folder,
        name: &str,
        header: &Header,
        body: &str,
    ) -> Result<PathBuf, StoreError> {
        let dest = self.dir(folder).join(name);
        self.write_raw(&dest, &header.render(body))?;
        Ok(dest)
    }

    /// Atomic raw write: temp file in the destination directory, then rename.
    pub fn write_raw(&self, dest: &Path, content: &str) -> Result<(), StoreError> {
        let parent = dest.parent().ok_or_else(|| StoreError::OutsideVault(dest.to_path_buf()))?;
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            action: "create directory for",
            path: parent.to_path_buf(),
            source,
        })?;
        let file_name = dest
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::OutsideVault(dest.to_path_buf()))?;
        let tmp = parent.join(format!(".{file_name}.tmp"));
        fs::write(&tmp, content).map_err(|source| StoreError::Io {
            action: "write",
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, dest).map_err(|source| StoreError::Io {
            action: "rename into place",
            path: dest.to_path_buf(),
            source,
        })
    }

    /// Atomically move an artifact into `dest` folder, preserving its path
    /// relative to the source state folder. Fails if the destination exists.
    pub fn move_to(&self, path: &Path, dest: Folder) -> Result<PathBuf, StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let (_, rel) = self.locate(path)?;
        let dest_path = self.dir(dest).join(rel);
        if dest_path.exists() {
            return Err(StoreError::DestinationExists(dest_path));
        }
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                action: "create directory for",
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::rename(path, &dest_path).map_err(|source| StoreError::Io {
            action: "move",
            path: path.to_path_buf(),
            source,
        })?;
        Ok(dest_path)
    }

    pub fn delete(&self, path: &Path) -> Result<(), StoreError> {
        fs::remove_file(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(path.to_path_buf())
            } else {
                StoreError::Io { action: "delete", path: path.to_path_buf(), source }
            }
        })
    }

    /// Which state folder a path lives in, and its path relative to it.
    pub fn locate(&self, path: &Path) -> Result<(Folder, PathBuf), StoreError> {
        for folder in Folder::ALL {
            if let Ok(rel) = path.strip_prefix(self.dir(folder)) {
                return Ok((folder, rel.to_path_buf()));
            }
        }
        Err(StoreError::OutsideVault(path.to_path_buf()))
    }

    /// Append one bullet learning to the memory file, creating it with its
    /// header when absent.
    pub fn append_memory(&self, line: &str) -> Result<()> {
        let path = self.memory_path();
        let mut content = if path.exists() {
            fs::read_to_string(&path).context("failed to read memory file")?
        } else {
            MEMORY_HEADER.to_string()
        };
        if !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(line);
        content.push('\n');
        self.write_raw(&path, &content).context("failed to write memory file")?;
        Ok(())
    }
}
