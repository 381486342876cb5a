//! Mail watcher: polls the mail provider and materializes one artifact per
//! new message.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use super::Watcher;
use crate::audit::ActivityLog;
use crate::errors::Fault;
use crate::mail::{MailMessage, Mailbox, PROCESSED_LABEL};
use crate::priority::classify_priority;
use crate::retry::{RetryPolicy, with_retry};
use crate::store::{Folder, Header, Vault};
use crate::util::slugify;

const MAX_RESULTS: usize = 10;

pub struct MailWatcher {
    vault: Vault,
    mailbox: Arc<dyn Mailbox>,
    filter: String,
    vip_senders: Vec<String>,
    log: ActivityLog,
    retry: RetryPolicy,
    seen: HashSet<String>,
}

impl MailWatcher {
    pub fn new(
        vault: Vault,
        mailbox: Arc<dyn Mailbox>,
        filter: impl Into<String>,
        vip_senders: Vec<String>,
    ) -> Self {
        let log = ActivityLog::new(vault.dir(Folder::Logs));
        Self {
            vault,
            mailbox,
            filter: filter.into(),
            vip_senders,
            log,
            retry: RetryPolicy::default(),
            seen: HashSet::new(),
        }
    }

    fn artifact_name(message: &MailMessage) -> String {
        let slug: String = slugify(&message.subject).chars().take(50).collect();
        let slug = slug.trim_end_matches('-');
        let slug = if slug.is_empty() { "no-subject" } else { slug };
        let id_prefix: String = message.id.chars().take(8).collect();
        format!("email-{slug}-{id_prefix}.md")
    }
}

#[async_trait]
impl Watcher for MailWatcher {
    type Detection = MailMessage;

    async fn poll(&mut self) -> Vec<MailMessage> {
        let ids = match self.mailbox.search(&self.filter, MAX_RESULTS).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!("mail search failed: {e}");
                return Vec::new();
            }
        };

        let mut messages = Vec::new();
        for id in ids {
            if self.seen.contains(&id) {
                continue;
            }
            let mailbox = self.mailbox.clone();
            let fetched = with_retry(&self.retry, || {
                let mailbox = mailbox.clone();
                let id = id.clone();
                async move { mailbox.fetch(&id).await.map_err(Fault::from) }
            })
            .await;
            match fetched {
                Ok(message) => messages.push(message),
                Err(e) => tracing::error!("failed to fetch message {id}: {}", e.reason()),
            }
        }
        messages
    }

    async fn materialize(&mut self, message: &MailMessage) -> anyhow::Result<PathBuf> {
        let priority = classify_priority(
            &message.subject,
            &message.body,
            &message.from,
            &self.vip_senders,
        );

        let mut header = Header::new();
        header.set("type", "email");
        header.set("from", &message.from);
        header.set("subject", &message.subject);
        header.set("date", &message.date);
        header.set("priority", priority.as_str());
        header.set("gmail_id", &message.id);

        let body = format!(
            "# New Email: {subject}\n\n\
             **From:** {from}\n\
             **Date:** {date}\n\
             **Labels:** {labels}\n\n\
             ## Body\n{body}\n\n\
             ## Suggested Actions\n\
             - [ ] Reply\n\
             - [ ] Forward\n\
             - [ ] Archive\n",
            subject = message.subject,
            from = message.from,
            date = message.date,
            labels = message.labels.join(", "),
            body = message.body,
        );

        let name = Self::artifact_name(message);
        let path = self.vault.write(Folder::NeedsAction, &name, &header, &body)?;
        tracing::info!("created action file: {name} (priority={priority})");

        self.log.append(
            "mail_watcher",
            "email_detected",
            &message.id,
            &format!("action_file_created:{name}"),
        )?;

        // Tag the remote message so the same search stops returning it. A
        // labeling failure is not fatal; the seen set covers this process.
        if let Err(e) = self.mailbox.add_label(&message.id, PROCESSED_LABEL).await {
            tracing::error!("failed to label message {}: {e}", message.id);
        }
        self.seen.insert(message.id.clone());
        Ok(path)
    }
}
