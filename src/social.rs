//! Social media destinations as plug-in sinks.
//!
//! Each platform implements the `SocialSink` capability. The network halves
//! are out of scope; sinks validate their credentials and record posting
//! intent, returning a structured outcome the orchestrator logs. Draft-only
//! mode writes a `social_post` artifact into `Pending_Approval` for human
//! review.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;

use crate::errors::Fault;
use crate::store::{Folder, Header, Vault};

/// Twitter/X post length ceiling.
pub const TWITTER_MAX_CHARS: usize = 280;

/// Outcome of a post attempt.
#[derive(Debug, Clone, Serialize)]
pub struct PostResult {
    pub platform: String,
    pub content: String,
}

#[async_trait]
pub trait SocialSink: Send + Sync {
    fn platform(&self) -> &'static str;

    /// Whether the sink has credentials configured.
    fn credentialed(&self) -> bool;

    /// Post content. Missing credentials are a Permanent fault.
    async fn post(&self, content: &str) -> Result<PostResult, Fault>;
}

fn env_token(key: &str) -> String {
    std::env::var(key).unwrap_or_default().trim().to_string()
}

pub struct LinkedInSink {
    access_token: String,
}

impl LinkedInSink {
    pub fn from_env() -> Self {
        Self { access_token: env_token("LINKEDIN_ACCESS_TOKEN") }
    }

    pub fn with_token(access_token: impl Into<String>) -> Self {
        Self { access_token: access_token.into() }
    }
}

#[async_trait]
impl SocialSink for LinkedInSink {
    fn platform(&self) -> &'static str {
        "linkedin"
    }

    fn credentialed(&self) -> bool {
        !self.access_token.is_empty()
    }

    async fn post(&self, content: &str) -> Result<PostResult, Fault> {
        if !self.credentialed() {
            return Err(Fault::permanent("LinkedIn access token not configured"));
        }
        tracing::info!("linkedin post: {}", crate::util::preview(content, 100));
        Ok(PostResult { platform: "linkedin".into(), content: content.to_string() })
    }
}

pub struct FacebookSink {
    page_token: String,
}

impl FacebookSink {
    pub fn from_env() -> Self {
        Self { page_token: env_token("FACEBOOK_PAGE_TOKEN") }
    }

    pub fn with_token(page_token: impl Into<String>) -> Self {
        Self { page_token: page_token.into() }
    }
}

#[async_trait]
impl SocialSink for FacebookSink {
    fn platform(&self) -> &'static str {
        "facebook"
    }

    fn credentialed(&self) -> bool {
        !self.page_token.is_empty()
    }

    async fn post(&self, content: &str) -> Result<PostResult, Fault> {
        if !self.credentialed() {
            return Err(Fault::permanent("Facebook page token not configured"));
        }
        tracing::info!("facebook post: {}", crate::util::preview(content, 100));
        Ok(PostResult { platform: "facebook".into(), content: content.to_string() })
    }
}

pub struct TwitterSink {
    api_key: String,
    api_secret: String,
    access_token: String,
    access_secret: String,
}

impl TwitterSink {
    pub fn from_env() -> Self {
        Self {
            api_key: env_token("TWITTER_API_KEY"),
            api_secret: env_token("TWITTER_API_SECRET"),
            access_token: env_token("TWITTER_ACCESS_TOKEN"),
            access_secret: env_token("TWITTER_ACCESS_SECRET"),
        }
    }

    pub fn with_credentials(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_secret: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            access_token: access_token.into(),
            access_secret: access_secret.into(),
        }
    }
}

/// Truncate to exactly `TWITTER_MAX_CHARS` characters with an `…` suffix
/// when the input exceeds the ceiling.
pub fn truncate_for_twitter(content: &str) -> String {
    if content.chars().count() <= TWITTER_MAX_CHARS {
        return content.to_string();
    }
    let mut truncated: String = content.chars().take(TWITTER_MAX_CHARS - 1).collect();
    truncated.push('…');
    truncated
}

#[async_trait]
impl SocialSink for TwitterSink {
    fn platform(&self) -> &'static str {
        "twitter"
    }

    fn credentialed(&self) -> bool {
        !self.api_key.is_empty()
            && !self.api_secret.is_empty()
            && !self.access_token.is_empty()
            && !self.access_secret.is_empty()
    }

    async fn post(&self, content: &str) -> Result<PostResult, Fault> {
        if !self.credentialed() {
            return Err(Fault::permanent("Twitter API credentials not configured"));
        }
        let content = truncate_for_twitter(content);
        tracing::info!("twitter post: {}", crate::util::preview(&content, 100));
        Ok(PostResult { platform: "twitter".into(), content })
    }
}

/// All sinks, configured from the environment.
pub fn sinks_from_env() -> Vec<Box<dyn SocialSink>> {
    vec![
        Box::new(LinkedInSink::from_env()),
        Box::new(FacebookSink::from_env()),
        Box::new(TwitterSink::from_env()),
    ]
}

/// Write a draft post into `Pending_Approval` for human review.
pub fn draft_post(
    vault: &Vault,
    platform: &str,
    content: &str,
    scheduled: Option<&str>,
) -> anyhow::Result<PathBuf> {
    let now = Utc::now();
    let name = format!("social-{platform}-{}.md", now.format("%Y%m%d-%H%M%S"));

    let mut header = Header::new();
    header.set("type", "social_post");
    header.set("platform", platform);
    header.set("created", now.to_rfc3339());
    header.set("status", "pending_approval");
    header.set("action", "social_post");
    if let Some(scheduled) = scheduled {
        header.set("scheduled", scheduled);
    }

    let body = format!(
        "# Social Media Post — {platform}\n\n\
         ## Content\n{content}\n\n\
         ## To Approve\nMove this file to Approved/ to publish.\n\n\
         ## To Reject\nMove this file to Rejected/ to discard.\n"
    );
    let path = vault.write(Folder::PendingApproval, &name, &header, &body)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_truncate_under_limit_unchanged() {
        let content = "short post";
        assert_eq!(truncate_for_twitter(content), content);
    }

    #[test]
    fn test_truncate_at_limit_unchanged() {
        let content = "x".repeat(280);
        assert_eq!(truncate_for_twitter(&content), content);
    }

    #[test]
    fn test_truncate_over_limit_exactly_280_with_ellipsis() {
        let content = "y".repeat(400);
        let truncated = truncate_for_twitter(&content);
        assert_eq!(truncated.chars().count(), 280);
        assert!(truncated.ends_with('…'));
        assert!(truncated.starts_with(&"y".repeat(279)));
    }

    #[tokio::test]
    async fn test_twitter_post_applies_truncation() {
        let sink = TwitterSink::with_credentials("k", "s", "t", "ts");
        let result = sink.post(&"z".repeat(300)).await.unwrap();
        assert_eq!(result.content.chars().count(), 280);
    }

    #[tokio::test]
    async fn test_missing_credentials_is_permanent() {
        let sink = TwitterSink::with_credentials("", "", "", "");
        let err = sink.post("hello").await.unwrap_err();
        assert!(!err.is_transient());

        let sink = LinkedInSink::with_token("");
        assert!(!sink.post("hello").await.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_credentialed_post_succeeds() {
        let sink = LinkedInSink::with_token("tok");
        let result = sink.post("hello network").await.unwrap();
        assert_eq!(result.platform, "linkedin");
        assert_eq!(result.content, "hello network");
    }

    #[test]
    fn test_draft_post_lands_in_pending_approval() {
        let dir = tempdir().unwrap();
        let vault = Vault::new(dir.path());
        vault.ensure_layout().unwrap();

        let path = draft_post(&vault, "twitter", "launch day!", None).unwrap();
        assert!(path.starts_with(vault.dir(Folder::PendingApproval)));

        let (header, body) = vault.read(&path).unwrap();
        assert_eq!(header.kind.as_deref(), Some("social_post"));
        assert_eq!(header.get("platform"), Some("twitter"));
        assert_eq!(header.action.as_deref(), Some("social_post"));
        assert!(body.contains("launch day!"));
    }
}
