//! The state-transition engine: drives artifacts from `Needs_Action`
//! through planning, approval, execution and rejection review.
//!
//! Every operation is bounded to one artifact; failures are reported to the
//! caller (the scheduler), which logs and moves on so one bad artifact never
//! halts a cycle. Zone gates are enforced here: only the Local zone executes
//! side effects or auto-approves.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::assistant::{Assistant, INVOKE_TIMEOUT};
use crate::audit::{ActivityLog, RateCounter};
use crate::mail::Mailbox;
use crate::planner::{Planner, extract_reply_block};
use crate::social::SocialSink;
use crate::store::{Folder, Header, Vault};
use crate::zone::{Capabilities, WorkZone};

/// Name of the daily outbound-send counter.
pub const SEND_QUOTA: &str = "send";

pub struct Orchestrator {
    vault: Vault,
    assistant: Arc<dyn Assistant>,
    planner: Planner,
    log: ActivityLog,
    quota: RateCounter,
    mailbox: Option<Arc<dyn Mailbox>>,
    social: Vec<Box<dyn SocialSink>>,
    zone: WorkZone,
    caps: Capabilities,
    auto_approve_threshold: f64,
    daily_send_limit: u32,
}

impl Orchestrator {
    pub fn new(
        vault: Vault,
        assistant: Arc<dyn Assistant>,
        zone: WorkZone,
        auto_approve_threshold: f64,
        daily_send_limit: u32,
    ) -> Self {
        let log = ActivityLog::new(vault.dir(Folder::Logs));
        let quota = RateCounter::new(vault.dir(Folder::Logs));
        let planner = Planner::new(assistant.clone());
        Self {
            vault,
            assistant,
            planner,
            log,
            quota,
            mailbox: None,
            social: Vec::new(),
            zone,
            caps: Capabilities::for_zone(zone),
            auto_approve_threshold,
            daily_send_limit,
        }
    }

    pub fn with_mailbox(mut self, mailbox: Arc<dyn Mailbox>) -> Self {
        self.mailbox = Some(mailbox);
        self
    }

    pub fn with_social_sinks(mut self, sinks: Vec<Box<dyn SocialSink>>) -> Self {
        self.social = sinks;
        self
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn zone(&self) -> WorkZone {
        self.zone
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    /// Needs_Action artifacts, priority-sorted (high first), name as
    /// tie-break.
    pub fn get_pending(&self) -> Result<Vec<PathBuf>> {
        let mut items: Vec<(crate::priority::Priority, PathBuf)> = Vec::new();
        for path in self.vault.list(Folder::NeedsAction)? {
            let priority = self
                .vault
                .read(&path)
                .map(|(header, _)| header.priority())
                .unwrap_or_default();
            items.push((priority, path));
        }
        items.sort();
        Ok(items.into_iter().map(|(_, path)| path).collect())
    }

    pub fn get_approved(&self) -> Result<Vec<PathBuf>> {
        Ok(self.vault.list(Folder::Approved)?)
    }

    pub fn get_rejected(&self) -> Result<Vec<PathBuf>> {
        Ok(self.vault.list(Folder::Rejected)?)
    }

    /// Plan one Needs_Action artifact: draft, persist under
    /// `Pending_Approval`, delete the original, then apply the auto-approve
    /// policy (Local zone only). Returns the plan's current location.
    pub async fn process_pending(&self, path: &Path) -> Result<PathBuf> {
        let (header, body) = self.vault.read(path).context("failed to read action artifact")?;
        let (_, rel) = self.vault.locate(path)?;
        let source_name = rel.to_string_lossy().to_string();
        tracing::info!("processing: {source_name}");

        let (plan_path, draft) = self
            .planner
            .draft_and_store(&self.vault, &source_name, &header, &body)
            .await?;
        self.vault.delete(path).context("failed to delete consumed artifact")?;

        self.log.append(
            "orchestrator",
            "plan_created",
            &source_name,
            &format!("pending_approval:{}", draft.name),
        )?;
        tracing::info!("plan created: {} (awaiting approval)", draft.name);

        // Auto-approve policy. Cloud never auto-approves.
        if !self.should_auto_approve(&draft.header, draft.confidence) {
            return Ok(plan_path);
        }

        let approved_path = self.vault.move_to(&plan_path, Folder::Approved)?;
        let executed = self.execute_approved(&approved_path).await?;
        let (folder, _) = self.vault.locate(&executed)?;
        if folder == Folder::Approved {
            // Transient execution failure: hand the plan back to a human.
            let back = self.vault.move_to(&executed, Folder::PendingApproval)?;
            tracing::warn!("auto-approve execution failed; {} returned to pending", draft.name);
            return Ok(back);
        }
        self.log.append(
            "orchestrator",
            "auto_approved",
            &draft.name,
            &format!("confidence:{:.2}", draft.confidence),
        )?;
        Ok(executed)
    }

    fn should_auto_approve(&self, plan_header: &Header, confidence: f64) -> bool {
        if !self.caps.auto_approve {
            return false;
        }
        // A threshold of 1.0 disables the policy.
        if self.auto_approve_threshold >= 1.0 || confidence < self.auto_approve_threshold {
            return false;
        }
        let Some(action) = plan_header.action.as_deref() else {
            return false;
        };
        if action == "reply" && !self.quota.check(SEND_QUOTA, self.daily_send_limit) {
            return false;
        }
        true
    }

    /// Execute an approved plan's side effect and move it to `Done`.
    ///
    /// Outside the Local zone this is a no-op returning the input unchanged.
    /// Transient failures leave the plan in `Approved` for the next cycle;
    /// permanent failures move it to `Done` with a failure-tagged log entry.
    pub async fn execute_approved(&self, path: &Path) -> Result<PathBuf> {
        if !self.caps.execute_side_effect {
            tracing::debug!("zone {} cannot execute; skipping {}", self.zone, path.display());
            return Ok(path.to_path_buf());
        }

        let (header, body) = self.vault.read(path).context("failed to read approved plan")?;
        let (_, rel) = self.vault.locate(path)?;
        let name = rel.to_string_lossy().to_string();

        match header.action.as_deref() {
            None => {
                let done = self.vault.move_to(path, Folder::Done)?;
                self.log.append("orchestrator", "executed", &name, "moved_to_done")?;
                tracing::info!("completed: {name}");
                Ok(done)
            }
            Some("reply") => self.execute_reply(path, &name, &header, &body).await,
            Some("social_post") => self.execute_social(path, &name, &header, &body).await,
            Some(other) => {
                // Unknown action is a schema violation: permanent.
                let done = self.vault.move_to(path, Folder::Done)?;
                self.log.append(
                    "orchestrator",
                    "execute_failed",
                    &name,
                    &format!("unknown_action:{other}"),
                )?;
                Ok(done)
            }
        }
    }

    async fn execute_reply(
        &self,
        path: &Path,
        name: &str,
        header: &Header,
        body: &str,
    ) -> Result<PathBuf> {
        if !self.quota.check(SEND_QUOTA, self.daily_send_limit) {
            self.log.append(
                "orchestrator",
                "send_limit_reached",
                name,
                &format!("limit:{}", self.daily_send_limit),
            )?;
            tracing::warn!("daily send limit reached; {name} stays in Approved");
            return Ok(path.to_path_buf());
        }

        let Some(reply_body) = extract_reply_block(body) else {
            let done = self.vault.move_to(path, Folder::Done)?;
            self.log.append("orchestrator", "reply_failed", name, "missing_reply_block")?;
            return Ok(done);
        };
        let (Some(to), Some(reply_to_id)) = (header.get("to"), header.get("gmail_id")) else {
            let done = self.vault.move_to(path, Folder::Done)?;
            self.log.append("orchestrator", "reply_failed", name, "missing_reply_headers")?;
            return Ok(done);
        };
        let subject = header.get("subject").unwrap_or("(no subject)");

        let Some(mailbox) = self.mailbox.as_ref() else {
            // No provider wired up: retryable once one is configured.
            self.log.append("orchestrator", "send_failed", name, "no_mailbox_configured")?;
            return Ok(path.to_path_buf());
        };

        match mailbox.send_reply(reply_to_id, to, subject, &reply_body).await {
            Ok(sent_id) => {
                let count = self.quota.increment(SEND_QUOTA)?;
                let done = self.vault.move_to(path, Folder::Done)?;
                self.log.append(
                    "orchestrator",
                    "email_sent",
                    name,
                    &format!("sent:{sent_id} to:{to} count:{count}"),
                )?;
                tracing::info!("reply sent to {to} ({sent_id})");
                Ok(done)
            }
            Err(e) if e.is_transient() => {
                self.log.append("orchestrator", "send_failed", name, &format!("transient:{e}"))?;
                tracing::warn!("transient send failure for {name}: {e}; will retry next cycle");
                Ok(path.to_path_buf())
            }
            Err(e) => {
                let done = self.vault.move_to(path, Folder::Done)?;
                self.log.append("orchestrator", "send_failed", name, &format!("permanent:{e}"))?;
                tracing::error!("permanent send failure for {name}: {e}");
                Ok(done)
            }
        }
    }

    async fn execute_social(
        &self,
        path: &Path,
        name: &str,
        header: &Header,
        body: &str,
    ) -> Result<PathBuf> {
        let platform = header.get("platform").unwrap_or_default().to_string();
        let content = extract_section(body, "## Content").unwrap_or_default();

        let Some(sink) = self.social.iter().find(|s| s.platform() == platform) else {
            let done = self.vault.move_to(path, Folder::Done)?;
            self.log.append(
                "orchestrator",
                "post_failed",
                name,
                &format!("unknown_platform:{platform}"),
            )?;
            return Ok(done);
        };

        match sink.post(&content).await {
            Ok(result) => {
                let done = self.vault.move_to(path, Folder::Done)?;
                self.log.append(
                    "orchestrator",
                    "social_posted",
                    name,
                    &format!("{}:ok", result.platform),
                )?;
                Ok(done)
            }
            Err(e) if e.is_transient() => {
                self.log
                    .append("orchestrator", "post_failed", name, &format!("transient:{}", e.reason()))?;
                Ok(path.to_path_buf())
            }
            Err(e) => {
                let done = self.vault.move_to(path, Folder::Done)?;
                self.log
                    .append("orchestrator", "post_failed", name, &format!("permanent:{}", e.reason()))?;
                Ok(done)
            }
        }
    }

    /// Extract one sentence of learning from a rejected plan, append it to
    /// the memory file, and retire the plan to `Done`.
    pub async fn review_rejected(&self, path: &Path) -> Result<PathBuf> {
        let (_, body) = self.vault.read(path).context("failed to read rejected plan")?;
        let (_, rel) = self.vault.locate(path)?;
        let name = rel.to_string_lossy().to_string();

        let prompt = format!(
            "The following plan was rejected by a human reviewer. State, in exactly \
             one sentence, what should be done differently next time. Respond with \
             only that sentence.\n\n## Rejected Plan\n{body}\n"
        );

        let lesson = match self.assistant.invoke(&prompt, INVOKE_TIMEOUT).await {
            Ok(text) => text.lines().next().unwrap_or("").trim().to_string(),
            Err(e) => {
                tracing::warn!("rejection review assistant failed for {name}: {}", e.reason());
                String::new()
            }
        };

        let result = if lesson.is_empty() {
            "no_learning".to_string()
        } else {
            self.vault
                .append_memory(&format!("- [{}] {lesson}", Utc::now().to_rfc3339()))?;
            "memory_updated".to_string()
        };

        let done = self.vault.move_to(path, Folder::Done)?;
        self.log.append("orchestrator", "rejection_reviewed", &name, &result)?;
        tracing::info!("rejection reviewed: {name} ({result})");
        Ok(done)
    }
}

/// The text under a `## Heading` line, up to the next `## ` heading.
fn extract_section(body: &str, heading: &str) -> Option<String> {
    let start = body.find(heading)? + heading.len();
    let rest = &body[start..];
    let end = rest.find("\n## ").unwrap_or(rest.len());
    Some(rest[..end].trim().to_string())
}
