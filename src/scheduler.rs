//! The periodic cycle driving watchers, the orchestrator, the quarantine
//! sweeper and the dashboard refresh.
//!
//! A cycle is single-threaded cooperative: each stage runs to completion
//! before the next, so filesystem renames carry all the coordination. One
//! artifact's failure is logged (and the artifact quarantined where it still
//! exists) without halting the rest of the cycle. Daemon mode sleeps
//! between cycles and honors Ctrl-C at the cycle boundary.

use anyhow::Result;
use std::time::Duration;

use crate::dashboard;
use crate::orchestrator::Orchestrator;
use crate::retry::{self, DEFAULT_MIN_AGE};
use crate::sync::SyncTransport;
use crate::watchers::{FileWatcher, MailWatcher, Watcher};

/// Counts of work performed in one cycle.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleReport {
    pub emails_detected: usize,
    pub files_detected: usize,
    pub actions_processed: usize,
    pub approved_executed: usize,
    pub rejections_reviewed: usize,
    pub quarantine_restored: usize,
    pub updates_merged: usize,
}

impl CycleReport {
    pub fn total(&self) -> usize {
        self.emails_detected
            + self.files_detected
            + self.actions_processed
            + self.approved_executed
            + self.rejections_reviewed
            + self.quarantine_restored
            + self.updates_merged
    }
}

pub struct Scheduler {
    orchestrator: Orchestrator,
    mail_watcher: Option<MailWatcher>,
    file_watcher: Option<FileWatcher>,
    transport: Option<SyncTransport>,
}

impl Scheduler {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator, mail_watcher: None, file_watcher: None, transport: None }
    }

    pub fn with_mail_watcher(mut self, watcher: MailWatcher) -> Self {
        self.mail_watcher = Some(watcher);
        self
    }

    pub fn with_file_watcher(mut self, watcher: FileWatcher) -> Self {
        self.file_watcher = Some(watcher);
        self
    }

    /// Run the sync transport at the end of each cycle.
    pub fn with_transport(mut self, transport: SyncTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Execute one full pipeline cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        let vault = self.orchestrator.vault().clone();

        if let Some(watcher) = self.mail_watcher.as_mut() {
            report.emails_detected = watcher.run_once().await;
        }
        if let Some(watcher) = self.file_watcher.as_mut() {
            report.files_detected = watcher.run_once().await;
        }

        match self.orchestrator.get_pending() {
            Ok(pending) => {
                for path in pending {
                    match self.orchestrator.process_pending(&path).await {
                        Ok(_) => report.actions_processed += 1,
                        Err(e) => {
                            tracing::error!("processing {} failed: {e:#}", path.display());
                            // The artifact survives a failed pass: hold it
                            // in quarantine until the fault window passes.
                            if path.exists()
                                && let Err(qe) =
                                    retry::quarantine_artifact(&vault, &path, &format!("{e:#}"))
                            {
                                tracing::error!("quarantine failed: {qe:#}");
                            }
                        }
                    }
                }
            }
            Err(e) => tracing::error!("listing Needs_Action failed: {e:#}"),
        }

        match self.orchestrator.get_approved() {
            Ok(approved) => {
                for path in approved {
                    match self.orchestrator.execute_approved(&path).await {
                        Ok(_) => report.approved_executed += 1,
                        Err(e) => tracing::error!("executing {} failed: {e:#}", path.display()),
                    }
                }
            }
            Err(e) => tracing::error!("listing Approved failed: {e:#}"),
        }

        match self.orchestrator.get_rejected() {
            Ok(rejected) => {
                for path in rejected {
                    match self.orchestrator.review_rejected(&path).await {
                        Ok(_) => report.rejections_reviewed += 1,
                        Err(e) => tracing::error!("reviewing {} failed: {e:#}", path.display()),
                    }
                }
            }
            Err(e) => tracing::error!("listing Rejected failed: {e:#}"),
        }

        match retry::process_quarantine(&vault, DEFAULT_MIN_AGE) {
            Ok(restored) => report.quarantine_restored = restored.len(),
            Err(e) => tracing::error!("quarantine sweep failed: {e:#}"),
        }

        if self.orchestrator.capabilities().write_dashboard {
            match dashboard::merge_updates(&vault) {
                Ok(merged) => report.updates_merged = merged,
                Err(e) => tracing::error!("draining Updates failed: {e:#}"),
            }
            if let Err(e) = dashboard::update_dashboard(&vault) {
                tracing::error!("dashboard refresh failed: {e:#}");
            }
        }

        if let Some(transport) = &self.transport
            && let Err(e) = transport.sync("steward cycle").await
        {
            tracing::error!("vault sync failed: {e}");
        }

        report
    }

    /// Daemon loop: cycle, sleep, repeat; Ctrl-C stops between cycles.
    pub async fn run_daemon(&mut self, interval: Duration) -> Result<()> {
        tracing::info!("scheduler started (interval: {}s)", interval.as_secs());
        loop {
            let report = self.run_cycle().await;
            if report.total() > 0 {
                tracing::info!(
                    "cycle: {} emails, {} files, {} planned, {} executed, {} reviewed",
                    report.emails_detected,
                    report.files_detected,
                    report.actions_processed,
                    report.approved_executed,
                    report.rejections_reviewed
                );
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::ScriptedAssistant;
    use crate::mail::{MailMessage, MemoryMailbox};
    use crate::store::{Folder, Header, Vault};
    use crate::zone::WorkZone;
    use std::sync::Arc;
    use tempfile::tempdir;

    const PLAN_RESPONSE: &str = "## Analysis\nok\n\n## Confidence\n0.40";

    fn setup(zone: WorkZone) -> (Vault, Arc<MemoryMailbox>, Scheduler, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let vault = Vault::new(dir.path());
        vault.ensure_layout().unwrap();

        let assistant = Arc::new(ScriptedAssistant::new(vec![PLAN_RESPONSE.into()]));
        let mailbox = Arc::new(MemoryMailbox::new());
        let orch = Orchestrator::new(vault.clone(), assistant.clone(), zone, 1.0, 20)
            .with_mailbox(mailbox.clone());
        let watcher =
            MailWatcher::new(vault.clone(), mailbox.clone(), "is:unread", vec![]);
        let scheduler = Scheduler::new(orch).with_mail_watcher(watcher);
        (vault, mailbox, scheduler, dir)
    }

    #[tokio::test]
    async fn test_cycle_moves_email_to_pending_approval() {
        let (vault, mailbox, mut scheduler, _dir) = setup(WorkZone::Local);
        mailbox.deliver(MailMessage {
            id: "m1".into(),
            from: "bob@x".into(),
            subject: "Hi".into(),
            date: "2026-02-16".into(),
            body: "ping".into(),
            labels: vec![],
        });

        let report = scheduler.run_cycle().await;
        assert_eq!(report.emails_detected, 1);
        assert_eq!(report.actions_processed, 1);

        assert!(vault.list(Folder::NeedsAction).unwrap().is_empty());
        assert_eq!(vault.list(Folder::PendingApproval).unwrap().len(), 1);
        // Local zone refreshed the dashboard index.
        assert!(vault.dashboard_path().exists());
    }

    #[tokio::test]
    async fn test_cycle_executes_approved_and_reviews_rejected() {
        let (vault, _mailbox, mut scheduler, _dir) = setup(WorkZone::Local);
        vault.write(Folder::Approved, "plan-a.md", &Header::new(), "done deal").unwrap();
        let mut header = Header::new();
        header.set("source", "email-x.md");
        vault.write(Folder::Rejected, "plan-b.md", &header, "too formal").unwrap();

        let report = scheduler.run_cycle().await;
        assert_eq!(report.approved_executed, 1);
        assert_eq!(report.rejections_reviewed, 1);
        assert_eq!(vault.list(Folder::Done).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cycle_idle_report_is_zero() {
        let (_vault, _mailbox, mut scheduler, _dir) = setup(WorkZone::Local);
        let report = scheduler.run_cycle().await;
        assert_eq!(report.total(), 0);
    }

    #[tokio::test]
    async fn test_cloud_cycle_does_not_write_dashboard() {
        let (vault, mailbox, mut scheduler, _dir) = setup(WorkZone::Cloud);
        mailbox.deliver(MailMessage {
            id: "m1".into(),
            from: "a@b".into(),
            subject: "x".into(),
            date: "d".into(),
            body: "".into(),
            labels: vec![],
        });

        scheduler.run_cycle().await;
        assert!(!vault.dashboard_path().exists());
    }

    #[tokio::test]
    async fn test_cycle_drains_updates_in_local_zone() {
        let (vault, _mailbox, mut scheduler, _dir) = setup(WorkZone::Local);
        crate::sync::write_update(&vault, "u1.md", "cloud drafted plan-z").unwrap();

        let report = scheduler.run_cycle().await;
        assert_eq!(report.updates_merged, 1);
        assert!(vault.list(Folder::Updates).unwrap().is_empty());
        let dashboard = std::fs::read_to_string(vault.dashboard_path()).unwrap();
        assert!(dashboard.contains("cloud drafted plan-z"));
    }

    #[tokio::test]
    async fn test_cycle_restores_old_quarantined_items() {
        let (vault, _mailbox, mut scheduler, _dir) = setup(WorkZone::Local);
        let mut header = Header::new();
        header.set("type", "email");
        header.set(
            crate::retry::QUARANTINE_TIME_KEY,
            (chrono::Utc::now() - chrono::Duration::minutes(10)).to_rfc3339(),
        );
        header.set(crate::retry::QUARANTINE_ERROR_KEY, "API timeout");
        vault.write(Folder::Quarantine, "email-a.md", &header, "body").unwrap();

        let report = scheduler.run_cycle().await;
        assert_eq!(report.quarantine_restored, 1);
        // Restored artifacts are planned on the next cycle, not this one.
        // (The restore stage runs after process_pending.)
        let restored = vault.dir(Folder::NeedsAction).join("email-a.md");
        assert!(restored.exists());
    }
}
