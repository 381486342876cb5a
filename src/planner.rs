//! The planner: converts a Needs_Action artifact into a plan awaiting
//! approval.
//!
//! Prompt assembly pulls in the handbook and the accumulated memory, then
//! the artifact body. The assistant's response is parsed for a confidence
//! float and an optional verbatim reply payload between the BEGIN/END
//! markers; assistant failures degrade to a canonical "manual review
//! required" plan rather than aborting the cycle.

use anyhow::{Context, Result};
use chrono::Utc;
use regex::Regex;
use std::sync::{Arc, LazyLock};

use crate::assistant::{Assistant, INVOKE_TIMEOUT};
use crate::store::{Header, Vault};

pub const BEGIN_REPLY: &str = "---BEGIN REPLY---";
pub const END_REPLY: &str = "---END REPLY---";

/// Fallback plan body used when the assistant is unavailable.
pub const MANUAL_REVIEW_PLAN: &str = "\
## Analysis
Assistant processing failed. Manual review required.

## Requires Approval
- [ ] Manual review needed";

static CONFIDENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Matches "Confidence: 0.92", "## Confidence\n0.92", "confidence = .8".
    Regex::new(r"(?is)confidence[^0-9]*([01]?\.[0-9]+|[01])").expect("confidence regex")
});

/// Extract the confidence float from assistant output. Unparseable input
/// yields 0.0; values are clamped into [0, 1].
pub fn parse_confidence(text: &str) -> f64 {
    CONFIDENCE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(0.0)
}

/// Extract the reply body between the BEGIN/END markers, trimmed. `None`
/// when either marker is missing.
pub fn extract_reply_block(text: &str) -> Option<String> {
    let start = text.find(BEGIN_REPLY)?;
    let rest = &text[start + BEGIN_REPLY.len()..];
    let end = rest.find(END_REPLY)?;
    Some(rest[..end].trim().to_string())
}

/// A drafted plan, ready to be written to `Pending_Approval`.
#[derive(Debug)]
pub struct PlanDraft {
    pub name: String,
    pub header: Header,
    pub body: String,
    pub confidence: f64,
    pub has_reply: bool,
}

pub struct Planner {
    assistant: Arc<dyn Assistant>,
}

impl Planner {
    pub fn new(assistant: Arc<dyn Assistant>) -> Self {
        Self { assistant }
    }

    /// Draft a plan for one action artifact.
    pub async fn draft(
        &self,
        vault: &Vault,
        action_name: &str,
        action_header: &Header,
        action_body: &str,
    ) -> Result<PlanDraft> {
        let handbook = std::fs::read_to_string(vault.handbook_path()).unwrap_or_default();
        let memory = std::fs::read_to_string(vault.memory_path()).unwrap_or_default();
        let prompt = build_prompt(&handbook, &memory, action_body);

        let (response, confidence) = match self.assistant.invoke(&prompt, INVOKE_TIMEOUT).await {
            Ok(text) => {
                let confidence = parse_confidence(&text);
                (text, confidence)
            }
            Err(fault) => {
                tracing::warn!("assistant failed for {action_name}: {}", fault.reason());
                (MANUAL_REVIEW_PLAN.to_string(), 0.0)
            }
        };

        let has_reply = extract_reply_block(&response).is_some();
        let stem = action_name.strip_suffix(".md").unwrap_or(action_name);

        let mut header = Header::new();
        header.set("source", action_name);
        header.set("created", Utc::now().to_rfc3339());
        header.set("status", "pending_approval");
        header.set("confidence", format!("{confidence:.2}"));

        if has_reply {
            header.set("action", "reply");
            if let Some(id) = action_header.get("gmail_id") {
                header.set("gmail_id", id);
            }
            if let Some(from) = action_header.get("from") {
                header.set("to", from);
            }
            if let Some(subject) = action_header.get("subject") {
                header.set("subject", reply_subject(subject));
            }
        }

        let body = format!("# Plan: {stem}\n\n{response}\n");

        Ok(PlanDraft {
            name: plan_name(action_name),
            header,
            body,
            confidence,
            has_reply,
        })
    }
}

/// Derive the plan file name from the action file name. Sub-folder
/// components are dropped; plans are flat under `Pending_Approval`.
pub fn plan_name(action_name: &str) -> String {
    let base = action_name.rsplit('/').next().unwrap_or(action_name);
    for prefix in ["email-", "file-", "social-"] {
        if let Some(rest) = base.strip_prefix(prefix) {
            return format!("plan-{rest}");
        }
    }
    format!("plan-{base}")
}

/// Prefix `Re:` unless the subject already carries it.
pub fn reply_subject(subject: &str) -> String {
    if subject.to_lowercase().starts_with("re:") {
        subject.to_string()
    } else {
        format!("Re: {subject}")
    }
}

/// Assemble the planning prompt from handbook, memory and the artifact.
pub fn build_prompt(handbook: &str, memory: &str, action_body: &str) -> String {
    let memory_section = if memory.trim().is_empty() {
        String::new()
    } else {
        format!("\n## Learned Guidance\n{memory}\n")
    };
    format!(
        "You are a digital operations employee. Analyze the following action item \
and create a plan.

## Company Handbook
{handbook}
{memory_section}
## Action Item
{action_body}

## Instructions
1. Analyze the action item
2. Determine what needs to be done
3. List recommended actions
4. Identify which actions require human approval
5. If an email reply is appropriate, draft it between the literal lines \
{BEGIN_REPLY} and {END_REPLY}
6. End with your confidence in this plan as a single float in [0, 1]

Respond with:
## Analysis
[Your analysis]

## Recommended Actions
[Numbered list]

## Requires Approval
[Checklist of items needing human approval]

## Reply Draft
(optional, between the reply markers)

## Confidence
[0.0 - 1.0]
"
    )
}

/// Convenience wrapper used by the orchestrator: draft and persist.
impl Planner {
    pub async fn draft_and_store(
        &self,
        vault: &Vault,
        action_name: &str,
        action_header: &Header,
        action_body: &str,
    ) -> Result<(std::path::PathBuf, PlanDraft)> {
        let draft = self.draft(vault, action_name, action_header, action_body).await?;
        let path = vault
            .write(
                crate::store::Folder::PendingApproval,
                &draft.name,
                &draft.header,
                &draft.body,
            )
            .context("failed to write plan")?;
        Ok((path, draft))
    }
}
