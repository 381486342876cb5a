//! The mail provider boundary.
//!
//! The provider itself (OAuth, wire protocol) is a black box; this module
//! fixes the capability the pipeline needs (search, fetch, label, threaded
//! reply) and the transient/permanent split of its failures
//! ([`crate::errors::MailError`]). `MemoryMailbox` is the in-process
//! implementation used by tests and the demo walkthrough.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::errors::MailError;

/// Label applied to messages once an artifact has been materialized, so the
/// same search does not return them again across processes.
pub const PROCESSED_LABEL: &str = "Processed-by-Steward";

/// A fetched message, headers decoded and body as plain text.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub date: String,
    pub body: String,
    pub labels: Vec<String>,
}

#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Message ids matching a provider search expression.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, MailError>;

    /// Fetch one message in full.
    async fn fetch(&self, id: &str) -> Result<MailMessage, MailError>;

    /// Add a label to a message, creating the label on first use.
    async fn add_label(&self, id: &str, label: &str) -> Result<(), MailError>;

    /// Send a threaded reply to an existing message. Returns the sent
    /// message id.
    async fn send_reply(
        &self,
        reply_to_id: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, MailError>;
}

/// A sent reply recorded by [`MemoryMailbox`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentReply {
    pub reply_to_id: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// In-memory mailbox for tests and the demo.
#[derive(Default)]
pub struct MemoryMailbox {
    messages: Mutex<BTreeMap<String, MailMessage>>,
    sent: Mutex<Vec<SentReply>>,
    /// When set, `send_reply` fails with this error once, then clears.
    fail_next_send: Mutex<Option<MailError>>,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver(&self, message: MailMessage) {
        self.messages.lock().unwrap().insert(message.id.clone(), message);
    }

    pub fn sent(&self) -> Vec<SentReply> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_next_send(&self, error: MailError) {
        *self.fail_next_send.lock().unwrap() = Some(error);
    }

    pub fn labels_of(&self, id: &str) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .get(id)
            .map(|m| m.labels.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Mailbox for MemoryMailbox {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<String>, MailError> {
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .values()
            .filter(|m| !m.labels.iter().any(|l| l == PROCESSED_LABEL))
            .map(|m| m.id.clone())
            .take(max_results)
            .collect())
    }

    async fn fetch(&self, id: &str) -> Result<MailMessage, MailError> {
        self.messages
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| MailError::NotFound(id.to_string()))
    }

    async fn add_label(&self, id: &str, label: &str) -> Result<(), MailError> {
        let mut messages = self.messages.lock().unwrap();
        let message = messages
            .get_mut(id)
            .ok_or_else(|| MailError::NotFound(id.to_string()))?;
        if !message.labels.iter().any(|l| l == label) {
            message.labels.push(label.to_string());
        }
        Ok(())
    }

    async fn send_reply(
        &self,
        reply_to_id: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, MailError> {
        if let Some(error) = self.fail_next_send.lock().unwrap().take() {
            return Err(error);
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(SentReply {
            reply_to_id: reply_to_id.to_string(),
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(format!("sent-{}", sent.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str) -> MailMessage {
        MailMessage {
            id: id.to_string(),
            from: "bob@x".to_string(),
            subject: "Hi".to_string(),
            date: "2026-02-16T10:00:00Z".to_string(),
            body: "ping".to_string(),
            labels: vec![],
        }
    }

    #[tokio::test]
    async fn test_search_excludes_processed() {
        let mailbox = MemoryMailbox::new();
        mailbox.deliver(message("m1"));
        mailbox.deliver(message("m2"));
        mailbox.add_label("m1", PROCESSED_LABEL).await.unwrap();

        let ids = mailbox.search("is:unread", 10).await.unwrap();
        assert_eq!(ids, vec!["m2"]);
    }

    #[tokio::test]
    async fn test_fetch_missing_is_not_found() {
        let mailbox = MemoryMailbox::new();
        let err = mailbox.fetch("nope").await.unwrap_err();
        assert!(matches!(err, MailError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_send_reply_records() {
        let mailbox = MemoryMailbox::new();
        let id = mailbox.send_reply("m1", "bob@x", "Re: Hi", "pong").await.unwrap();
        assert_eq!(id, "sent-1");
        let sent = mailbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "bob@x");
    }

    #[tokio::test]
    async fn test_fail_next_send_fires_once() {
        let mailbox = MemoryMailbox::new();
        mailbox.fail_next_send(MailError::Timeout);
        assert!(mailbox.send_reply("m1", "a@b", "s", "b").await.is_err());
        assert!(mailbox.send_reply("m1", "a@b", "s", "b").await.is_ok());
    }
}
