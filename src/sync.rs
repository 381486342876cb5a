//! Cross-zone coordination: claim-by-move and the git sync transport.
//!
//! Atomic rename is the only coordination primitive between zones. The
//! transport layers a git repository over the vault so the two zones
//! exchange snapshots: `push` stages and commits everything then pushes if a
//! remote exists, `pull` rebases onto the remote. Merge conflicts are not
//! resolved here; they surface as errors. The `Updates/` drain pattern (see
//! the dashboard module) keeps the common case conflict-free.

use git2::{IndexAddOption, Repository, Signature, StatusOptions};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use crate::errors::SyncError;
use crate::store::{Folder, Vault};

/// Timeout for network git operations.
const GIT_NET_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    pub is_repo: bool,
    pub has_remote: bool,
    pub pending_changes: usize,
    /// Subject of the last commit, or "never".
    pub last_sync: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncOutcome {
    pub pulled: bool,
    pub pushed: bool,
}

pub struct SyncTransport {
    root: PathBuf,
}

impl SyncTransport {
    pub fn new(vault: &Vault) -> Self {
        Self { root: vault.root().to_path_buf() }
    }

    fn open(&self) -> Result<Repository, SyncError> {
        Repository::open(&self.root).map_err(|_| SyncError::NotARepo)
    }

    pub fn is_repo(&self) -> bool {
        Repository::open(&self.root).is_ok()
    }

    /// Initialize a repository in the vault. Returns true if one was
    /// created, false if the vault already is a repository.
    pub fn init_sync(&self) -> Result<bool, SyncError> {
        if self.is_repo() {
            return Ok(false);
        }
        Repository::init(&self.root)
            .map_err(|e| SyncError::Git { op: "init", detail: e.message().to_string() })?;
        tracing::info!("initialized sync repository in {}", self.root.display());
        Ok(true)
    }

    pub fn status(&self) -> SyncStatus {
        let mut status = SyncStatus { last_sync: "never".to_string(), ..Default::default() };
        let Ok(repo) = self.open() else {
            return status;
        };
        status.is_repo = true;
        status.has_remote = repo.remotes().map(|r| !r.is_empty()).unwrap_or(false);

        let mut opts = StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        if let Ok(statuses) = repo.statuses(Some(&mut opts)) {
            status.pending_changes = statuses.len();
        }
        if let Ok(head) = repo.head()
            && let Ok(commit) = head.peel_to_commit()
            && let Some(summary) = commit.summary()
        {
            status.last_sync = summary.to_string();
        }
        status
    }

    /// Stage everything and commit. Returns false when the tree is clean.
    fn commit_all(&self, message: &str) -> Result<bool, SyncError> {
        let repo = self.open()?;

        let mut opts = StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let dirty = repo
            .statuses(Some(&mut opts))
            .map_err(|e| SyncError::Git { op: "status", detail: e.message().to_string() })?
            .len();
        if dirty == 0 {
            return Ok(false);
        }

        let mut index = repo
            .index()
            .map_err(|e| SyncError::Git { op: "index", detail: e.message().to_string() })?;
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .and_then(|_| index.write())
            .map_err(|e| SyncError::Git { op: "add", detail: e.message().to_string() })?;

        let tree_id = index
            .write_tree()
            .map_err(|e| SyncError::Git { op: "write-tree", detail: e.message().to_string() })?;
        let result = (|| -> Result<(), git2::Error> {
            let tree = repo.find_tree(tree_id)?;
            let sig = Signature::now("steward", "steward@localhost")?;
            // Unborn branch on the first commit.
            let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
            match parent {
                Some(parent) => {
                    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?
                }
                None => repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[])?,
            };
            Ok(())
        })();
        result.map_err(|e| SyncError::Git { op: "commit", detail: e.message().to_string() })?;
        Ok(true)
    }

    async fn run_git(&self, args: &[&str]) -> Result<std::process::Output, SyncError> {
        let child = tokio::process::Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SyncError::Git { op: "spawn", detail: e.to_string() })?;

        match tokio::time::timeout(GIT_NET_TIMEOUT, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(SyncError::Git { op: "wait", detail: e.to_string() }),
            Err(_) => Err(SyncError::Timeout(format!("git {}", args.join(" ")))),
        }
    }

    /// Commit local changes and push to the remote if one is configured.
    /// Returns true when anything was committed; a clean tree is a no-op.
    pub async fn push(&self, message: &str) -> Result<bool, SyncError> {
        let committed = self.commit_all(message)?;
        if !committed {
            tracing::debug!("nothing to push");
            return Ok(false);
        }
        if self.status().has_remote {
            let output = self.run_git(&["push"]).await?;
            if !output.status.success() {
                return Err(SyncError::Git {
                    op: "push",
                    detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
            tracing::info!("pushed vault changes: {message}");
        } else {
            tracing::info!("committed vault changes (no remote): {message}");
        }
        Ok(true)
    }

    /// Pull remote changes with rebase. Returns true when new changes
    /// arrived; without a remote this is a no-op.
    pub async fn pull(&self) -> Result<bool, SyncError> {
        if !self.is_repo() {
            return Err(SyncError::NotARepo);
        }
        if !self.status().has_remote {
            tracing::debug!("no remote configured, skipping pull");
            return Ok(false);
        }
        let output = self.run_git(&["pull", "--rebase"]).await?;
        if !output.status.success() {
            return Err(SyncError::Git {
                op: "pull",
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let up_to_date =
            stdout.contains("Already up to date") || stdout.contains("Already up-to-date");
        Ok(!up_to_date)
    }

    /// Full cycle: pull, then push.
    pub async fn sync(&self, message: &str) -> Result<SyncOutcome, SyncError> {
        let pulled = self.pull().await?;
        let pushed = self.push(message).await?;
        Ok(SyncOutcome { pulled, pushed })
    }
}

/// Claim an item by moving it between state folders. The rename fails if
/// the destination already holds the name, which is what makes the claim
/// exclusive.
pub fn claim(
    vault: &Vault,
    filename: &str,
    from: Folder,
    to: Folder,
) -> Result<PathBuf, SyncError> {
    let source = vault.dir(from).join(filename);
    if !source.exists() {
        return Err(SyncError::ItemNotFound(source.display().to_string()));
    }
    vault
        .move_to(&source, to)
        .map_err(|e| SyncError::Git { op: "claim", detail: e.to_string() })
        .inspect(|_| tracing::info!("claimed {filename}: {from} -> {to}"))
}

/// Claim a Needs_Action item into `In_Progress/<agent>/`. Fails if any
/// agent sub-folder already contains the name.
pub fn claim_to_in_progress(
    vault: &Vault,
    filename: &str,
    agent: &str,
) -> Result<PathBuf, SyncError> {
    let source = vault.dir(Folder::NeedsAction).join(filename);
    if !source.exists() {
        return Err(SyncError::ItemNotFound(source.display().to_string()));
    }

    let in_progress = vault.dir(Folder::InProgress);
    if in_progress.is_dir() {
        for entry in std::fs::read_dir(&in_progress).into_iter().flatten().flatten() {
            let agent_dir = entry.path();
            if agent_dir.is_dir() && agent_dir.join(filename).exists() {
                let holder = entry.file_name().to_string_lossy().to_string();
                return Err(SyncError::AlreadyClaimed {
                    agent: holder,
                    name: filename.to_string(),
                });
            }
        }
    }

    let dest_dir = in_progress.join(agent);
    std::fs::create_dir_all(&dest_dir)
        .map_err(|e| SyncError::Git { op: "claim", detail: e.to_string() })?;
    let dest = dest_dir.join(filename);
    std::fs::rename(&source, &dest)
        .map_err(|e| SyncError::Git { op: "claim", detail: e.to_string() })?;
    tracing::info!("agent '{agent}' claimed {filename} into In_Progress");
    Ok(dest)
}

/// Cloud-side write of a dashboard addition into `Updates/`. The Local zone
/// drains these into the dashboard index on its next cycle.
pub fn write_update(vault: &Vault, filename: &str, content: &str) -> anyhow::Result<PathBuf> {
    let dest = vault.dir(Folder::Updates).join(filename);
    vault.write_raw(&dest, content)?;
    tracing::info!("wrote update: {filename}");
    Ok(dest)
}
