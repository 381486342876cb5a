//! Read model over the vault, plus the `Dashboard.md` index.
//!
//! The index file is written only by the Local zone; the Cloud zone
//! communicates additions by dropping files into `Updates/`, which Local
//! drains here on each cycle (the single-writer rule).

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::path::Path;

use crate::audit::ActivityLog;
use crate::store::{Folder, Vault};

/// Folders surfaced on the dashboard overview.
pub const OVERVIEW_FOLDERS: [Folder; 6] = [
    Folder::NeedsAction,
    Folder::PendingApproval,
    Folder::Approved,
    Folder::Rejected,
    Folder::Done,
    Folder::Quarantine,
];

pub fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .count()
}

pub fn folder_counts(vault: &Vault) -> Vec<(String, usize)> {
    OVERVIEW_FOLDERS
        .iter()
        .map(|f| (f.as_str().to_string(), count_files(&vault.dir(*f))))
        .collect()
}

/// Items the pipeline still has to act on.
pub fn items_to_process(vault: &Vault) -> usize {
    count_files(&vault.dir(Folder::NeedsAction))
        + count_files(&vault.dir(Folder::PendingApproval))
        + count_files(&vault.dir(Folder::Approved))
}

/// One plan awaiting approval, with header metadata for the UI.
#[derive(Debug, Clone, Serialize)]
pub struct PendingPlan {
    pub name: String,
    pub created: String,
    pub confidence: String,
    pub action: String,
    pub source: String,
}

pub fn pending_approvals(vault: &Vault) -> Vec<PendingPlan> {
    let Ok(paths) = vault.list(Folder::PendingApproval) else {
        return Vec::new();
    };
    let base = vault.dir(Folder::PendingApproval);
    paths
        .iter()
        .filter_map(|path| {
            let name = path.strip_prefix(&base).ok()?.to_string_lossy().to_string();
            let (header, _) = vault.read(path).ok()?;
            Some(PendingPlan {
                name,
                created: header.created.clone().unwrap_or_else(|| "unknown".into()),
                confidence: header
                    .get("confidence")
                    .map(String::from)
                    .unwrap_or_else(|| "N/A".into()),
                action: header.action.clone().unwrap_or_else(|| "review".into()),
                source: header.source.clone().unwrap_or_default(),
            })
        })
        .collect()
}

/// One Needs_Action item for the UI.
#[derive(Debug, Clone, Serialize)]
pub struct ActionItem {
    pub name: String,
    pub priority: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub subject: String,
}

pub fn needs_action_items(vault: &Vault) -> Vec<ActionItem> {
    let Ok(paths) = vault.list(Folder::NeedsAction) else {
        return Vec::new();
    };
    let base = vault.dir(Folder::NeedsAction);
    paths
        .iter()
        .filter_map(|path| {
            let name = path.strip_prefix(&base).ok()?.to_string_lossy().to_string();
            let (header, _) = vault.read(path).ok()?;
            let stem = path.file_stem().map(|s| s.to_string_lossy().to_string());
            Some(ActionItem {
                priority: header.priority().to_string(),
                kind: header.kind.clone().unwrap_or_else(|| "unknown".into()),
                subject: header
                    .get("subject")
                    .map(String::from)
                    .or(stem)
                    .unwrap_or_else(|| name.clone()),
                name,
            })
        })
        .collect()
}

/// Names of the most recently completed artifacts, newest first.
pub fn done_tail(vault: &Vault, n: usize) -> Vec<String> {
    let Ok(paths) = vault.list(Folder::Done) else {
        return Vec::new();
    };
    let base = vault.dir(Folder::Done);
    let mut with_mtime: Vec<(std::time::SystemTime, String)> = paths
        .iter()
        .filter_map(|path| {
            let mtime = path.metadata().and_then(|m| m.modified()).ok()?;
            let name = path.strip_prefix(&base).ok()?.to_string_lossy().to_string();
            Some((mtime, name))
        })
        .collect();
    with_mtime.sort_by(|a, b| b.0.cmp(&a.0));
    with_mtime.into_iter().take(n).map(|(_, name)| name).collect()
}

/// Drain `Updates/` into `Dashboard.md`. Returns the number of updates
/// merged. Local zone only; the caller enforces the gate.
pub fn merge_updates(vault: &Vault) -> Result<usize> {
    let updates = vault.list(Folder::Updates)?;
    if updates.is_empty() {
        return Ok(0);
    }

    let dashboard = vault.dashboard_path();
    let mut content = std::fs::read_to_string(&dashboard).unwrap_or_default();

    let mut merged = 0;
    for update in updates {
        let Ok(text) = std::fs::read_to_string(&update) else {
            continue;
        };
        let stem = update
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        content.push_str(&format!("\n\n## Update: {stem}\n{text}"));
        vault.delete(&update)?;
        merged += 1;
    }

    if merged > 0 {
        vault.write_raw(&dashboard, &content)?;
        tracing::info!("merged {merged} update(s) into Dashboard.md");
    }
    Ok(merged)
}

/// Rewrite the `Dashboard.md` index from the current vault state. Local
/// zone only; the caller enforces the gate.
pub fn update_dashboard(vault: &Vault) -> Result<()> {
    let counts = folder_counts(vault);
    let pending = pending_approvals(vault);
    let log = ActivityLog::new(vault.dir(Folder::Logs));
    let activity = log.recent(10);

    let mut out = String::new();
    out.push_str("# Steward Dashboard\n\n");
    out.push_str(&format!("Updated: {}\n\n", Utc::now().to_rfc3339()));

    out.push_str("## Overview\n\n| Folder | Items |\n|--------|-------|\n");
    for (name, count) in &counts {
        out.push_str(&format!("| {name} | {count} |\n"));
    }

    out.push_str("\n## Pending Approvals\n\n");
    if pending.is_empty() {
        out.push_str("None.\n");
    } else {
        for plan in &pending {
            out.push_str(&format!(
                "- {} (source: {}, confidence: {}, action: {})\n",
                plan.name, plan.source, plan.confidence, plan.action
            ));
        }
    }

    out.push_str("\n## Recent Activity\n\n");
    if activity.is_empty() {
        out.push_str("None.\n");
    } else {
        for entry in activity.iter().rev() {
            out.push_str(&format!(
                "- {} {} {} -> {}\n",
                entry.timestamp.to_rfc3339(),
                entry.action,
                entry.source,
                entry.result
            ));
        }
    }

    vault.write_raw(&vault.dashboard_path(), &out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Header;
    use crate::sync::write_update;
    use tempfile::tempdir;

    fn vault() -> (Vault, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let vault = Vault::new(dir.path());
        vault.ensure_layout().unwrap();
        (vault, dir)
    }

    #[test]
    fn test_folder_counts_and_items_to_process() {
        let (vault, _dir) = vault();
        vault.write(Folder::NeedsAction, "a.md", &Header::new(), "").unwrap();
        vault.write(Folder::PendingApproval, "b.md", &Header::new(), "").unwrap();
        vault.write(Folder::Done, "c.md", &Header::new(), "").unwrap();

        let counts: std::collections::HashMap<_, _> = folder_counts(&vault).into_iter().collect();
        assert_eq!(counts["Needs_Action"], 1);
        assert_eq!(counts["Pending_Approval"], 1);
        assert_eq!(counts["Done"], 1);
        assert_eq!(counts["Quarantine"], 0);

        assert_eq!(items_to_process(&vault), 2);
    }

    #[test]
    fn test_pending_approvals_metadata() {
        let (vault, _dir) = vault();
        let mut header = Header::new();
        header.set("source", "email-a.md");
        header.set("created", "2026-02-16T10:00:00Z");
        header.set("confidence", "0.75");
        header.set("action", "reply");
        vault.write(Folder::PendingApproval, "plan-a.md", &header, "").unwrap();
        vault.write(Folder::PendingApproval, "plan-b.md", &Header::new(), "").unwrap();

        let pending = pending_approvals(&vault);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].name, "plan-a.md");
        assert_eq!(pending[0].confidence, "0.75");
        assert_eq!(pending[0].action, "reply");
        // Missing metadata degrades to placeholders.
        assert_eq!(pending[1].confidence, "N/A");
        assert_eq!(pending[1].action, "review");
    }

    #[test]
    fn test_needs_action_items_fall_back_to_stem() {
        let (vault, _dir) = vault();
        let mut header = Header::new();
        header.set("type", "email");
        header.set("priority", "high");
        vault.write(Folder::NeedsAction, "email-x.md", &header, "").unwrap();

        let items = needs_action_items(&vault);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].priority, "high");
        assert_eq!(items[0].kind, "email");
        assert_eq!(items[0].subject, "email-x");
    }

    #[test]
    fn test_merge_updates_drains_into_dashboard() {
        let (vault, _dir) = vault();
        write_update(&vault, "cloud-1.md", "drafted plan-a").unwrap();
        write_update(&vault, "cloud-2.md", "drafted plan-b").unwrap();

        let merged = merge_updates(&vault).unwrap();
        assert_eq!(merged, 2);
        assert!(vault.list(Folder::Updates).unwrap().is_empty());

        let dashboard = std::fs::read_to_string(vault.dashboard_path()).unwrap();
        assert!(dashboard.contains("## Update: cloud-1"));
        assert!(dashboard.contains("drafted plan-b"));
    }

    #[test]
    fn test_merge_updates_empty_is_noop() {
        let (vault, _dir) = vault();
        assert_eq!(merge_updates(&vault).unwrap(), 0);
        assert!(!vault.dashboard_path().exists());
    }

    #[test]
    fn test_update_dashboard_writes_index() {
        let (vault, _dir) = vault();
        let mut header = Header::new();
        header.set("source", "email-a.md");
        vault.write(Folder::PendingApproval, "plan-a.md", &header, "").unwrap();

        update_dashboard(&vault).unwrap();
        let content = std::fs::read_to_string(vault.dashboard_path()).unwrap();
        assert!(content.contains("# Steward Dashboard"));
        assert!(content.contains("| Pending_Approval | 1 |"));
        assert!(content.contains("plan-a.md"));
    }

    #[test]
    fn test_done_tail_newest_first() {
        let (vault, _dir) = vault();
        vault.write(Folder::Done, "old.md", &Header::new(), "").unwrap();
        // Ensure distinct mtimes even on coarse filesystems.
        std::thread::sleep(std::time::Duration::from_millis(20));
        vault.write(Folder::Done, "new.md", &Header::new(), "").unwrap();

        let tail = done_tail(&vault, 10);
        assert_eq!(tail[0], "new.md");
        assert_eq!(tail.len(), 2);

        assert_eq!(done_tail(&vault, 1).len(), 1);
    }
}
