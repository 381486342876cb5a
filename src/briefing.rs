//! Period report builder: activity counts, completed set and bottlenecks
//! over the audit log, rendered as a markdown briefing.

use anyhow::Result;
use chrono::{Duration, Utc};
use std::path::PathBuf;

use crate::audit::ActivityLog;
use crate::dashboard::count_files;
use crate::store::{Folder, Vault};

/// Pending items older than this are reported as bottlenecks.
const BOTTLENECK_AGE_SECS: u64 = 24 * 3600;

/// Log actions mapped to briefing stat buckets.
fn stat_key(action: &str) -> Option<&'static str> {
    match action {
        "email_sent" => Some("emails_sent"),
        "plan_created" => Some("plans_created"),
        "auto_approved" => Some("auto_approved"),
        "executed" => Some("manually_approved"),
        "rejection_reviewed" => Some("rejected"),
        "send_failed" | "reply_failed" | "post_failed" | "quarantined" => Some("errors"),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodStats {
    pub emails_sent: usize,
    pub plans_created: usize,
    pub auto_approved: usize,
    pub manually_approved: usize,
    pub rejected: usize,
    pub errors: usize,
    pub total_actions: usize,
}

/// Collect per-action counts from the logs within the period.
pub fn period_stats(vault: &Vault, period_days: i64) -> Result<PeriodStats> {
    let log = ActivityLog::new(vault.dir(Folder::Logs));
    let since = (Utc::now() - Duration::days(period_days)).date_naive();

    let mut stats = PeriodStats::default();
    for entry in log.entries_since(since)? {
        stats.total_actions += 1;
        match stat_key(&entry.action) {
            Some("emails_sent") => stats.emails_sent += 1,
            Some("plans_created") => stats.plans_created += 1,
            Some("auto_approved") => stats.auto_approved += 1,
            Some("manually_approved") => stats.manually_approved += 1,
            Some("rejected") => stats.rejected += 1,
            Some("errors") => stats.errors += 1,
            _ => {}
        }
    }
    Ok(stats)
}

/// Names of `Done/` artifacts modified within the period.
pub fn completed_items(vault: &Vault, period_days: i64) -> Vec<String> {
    let cutoff = std::time::SystemTime::now()
        - std::time::Duration::from_secs((period_days as u64) * 86400);
    let Ok(paths) = vault.list(Folder::Done) else {
        return Vec::new();
    };
    let base = vault.dir(Folder::Done);
    paths
        .iter()
        .filter_map(|path| {
            let mtime = path.metadata().and_then(|m| m.modified()).ok()?;
            if mtime < cutoff {
                return None;
            }
            Some(path.strip_prefix(&base).ok()?.to_string_lossy().to_string())
        })
        .collect()
}

/// An artifact stuck in an early pipeline stage for more than 24 hours.
#[derive(Debug, Clone, PartialEq)]
pub struct Bottleneck {
    pub name: String,
    pub folder: String,
    pub age_hours: u64,
}

pub fn bottlenecks(vault: &Vault) -> Vec<Bottleneck> {
    let now = std::time::SystemTime::now();
    let mut found = Vec::new();

    for folder in [Folder::PendingApproval, Folder::NeedsAction] {
        let Ok(paths) = vault.list(folder) else { continue };
        let base = vault.dir(folder);
        for path in paths {
            let Ok(mtime) = path.metadata().and_then(|m| m.modified()) else {
                continue;
            };
            let Ok(age) = now.duration_since(mtime) else { continue };
            if age.as_secs() > BOTTLENECK_AGE_SECS {
                let name = path
                    .strip_prefix(&base)
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_default();
                found.push(Bottleneck {
                    name,
                    folder: folder.as_str().to_string(),
                    age_hours: age.as_secs() / 3600,
                });
            }
        }
    }
    found
}

/// Build the briefing markdown for the last `period_days`.
pub fn generate_briefing(vault: &Vault, period_days: i64) -> Result<String> {
    let now = Utc::now();
    let period_start = now - Duration::days(period_days);

    let stats = period_stats(vault, period_days)?;
    let completed = completed_items(vault, period_days);
    let stuck = bottlenecks(vault);

    let needs_action_count = count_files(&vault.dir(Folder::NeedsAction));
    let pending_approval_count = count_files(&vault.dir(Folder::PendingApproval));
    let quarantine_count = count_files(&vault.dir(Folder::Quarantine));

    let summary = if stats.total_actions == 0 {
        "No activity recorded this period. The system is idle.".to_string()
    } else {
        format!(
            "This period saw {} total actions: {} emails sent, {} plans created, \
             and {} errors.",
            stats.total_actions, stats.emails_sent, stats.plans_created, stats.errors
        )
    };

    let completed_lines = if completed.is_empty() {
        "No tasks completed this period.".to_string()
    } else {
        completed
            .iter()
            .map(|name| format!("- [x] {name}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let bottleneck_table = if stuck.is_empty() {
        "No bottlenecks detected.".to_string()
    } else {
        let rows = stuck
            .iter()
            .map(|b| format!("| {} | {} | {} hours |", b.name, b.folder, b.age_hours))
            .collect::<Vec<_>>()
            .join("\n");
        format!("| Item | Folder | Waiting |\n|------|--------|---------|\n{rows}")
    };

    let mut suggestions = Vec::new();
    if !stuck.is_empty() {
        suggestions
            .push("- Review items in Pending_Approval that have been waiting > 24 hours".into());
    }
    if quarantine_count > 0 {
        suggestions.push(format!("- {quarantine_count} quarantined item(s) need attention"));
    }
    if stats.errors > 0 {
        suggestions.push(format!(
            "- {} error(s) occurred this period; review Logs for details",
            stats.errors
        ));
    }
    if suggestions.is_empty() {
        suggestions.push("- No immediate actions required".into());
    }

    Ok(format!(
        "---\ngenerated: {generated}\nperiod: {start} to {end}\n---\n\n\
# Operations Briefing\n\n\
## Executive Summary\n{summary}\n\n\
## Activity This Period\n\
| Metric | Count |\n\
|--------|-------|\n\
| Emails sent | {emails_sent} |\n\
| Plans created | {plans_created} |\n\
| Auto-approved | {auto_approved} |\n\
| Manually approved | {manually_approved} |\n\
| Rejected | {rejected} |\n\
| Errors | {errors} |\n\n\
## Completed Tasks\n{completed_lines}\n\n\
## Bottlenecks\n{bottleneck_table}\n\n\
## Pending Items\n\
- Needs_Action: {needs_action_count} items\n\
- Pending_Approval: {pending_approval_count} items\n\
- Quarantine: {quarantine_count} items\n\n\
## Proactive Suggestions\n{suggestions}\n",
        generated = now.format("%Y-%m-%dT%H:%M:%SZ"),
        start = period_start.format("%Y-%m-%d"),
        end = now.format("%Y-%m-%d"),
        emails_sent = stats.emails_sent,
        plans_created = stats.plans_created,
        auto_approved = stats.auto_approved,
        manually_approved = stats.manually_approved,
        rejected = stats.rejected,
        errors = stats.errors,
        suggestions = suggestions.join("\n"),
    ))
}

/// Write the briefing under `Briefings/<yyyy-mm-dd>_Briefing.md`.
pub fn save_briefing(vault: &Vault, content: &str) -> Result<PathBuf> {
    let name = format!("{}_Briefing.md", Utc::now().format("%Y-%m-%d"));
    let path = vault.dir(Folder::Briefings).join(name);
    vault.write_raw(&path, content)?;
    tracing::info!("briefing saved to {}", path.display());
    Ok(path)
}
