//! Rule-based priority classification for incoming items.

/// Keywords that mark an item urgent regardless of sender.
pub const URGENCY_KEYWORDS: [&str; 4] = ["urgent", "asap", "deadline", "overdue"];

/// Sender-address fragments that mark automated/newsletter traffic.
pub const NEWSLETTER_PATTERNS: [&str; 5] = [
    "noreply@",
    "no-reply@",
    "newsletter@",
    "notifications@",
    "mailer-daemon@",
];

/// Artifact priority. Ordering is processing order: high first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }

    /// Parse a priority value. Anything unrecognized is `Normal`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Normal,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify an item's priority.
///
/// Rules, first match wins:
/// 1. urgency keyword in subject or body → high
/// 2. sender equals a VIP entry (case-insensitive) → high
/// 3. sender contains a newsletter/no-reply pattern → low
/// 4. otherwise → normal
pub fn classify_priority(
    subject: &str,
    body: &str,
    sender: &str,
    vip_senders: &[String],
) -> Priority {
    let subject_lower = subject.to_lowercase();
    let body_lower = body.to_lowercase();

    for keyword in URGENCY_KEYWORDS {
        if subject_lower.contains(keyword) || body_lower.contains(keyword) {
            return Priority::High;
        }
    }

    let sender_lower = sender.to_lowercase();
    if vip_senders
        .iter()
        .any(|vip| vip.to_lowercase() == sender_lower)
    {
        return Priority::High;
    }

    for pattern in NEWSLETTER_PATTERNS {
        if sender_lower.contains(pattern) {
            return Priority::Low;
        }
    }

    Priority::Normal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urgency_keyword_in_subject() {
        let p = classify_priority("URGENT: server down", "", "anyone@x.com", &[]);
        assert_eq!(p, Priority::High);
    }

    #[test]
    fn test_urgency_keyword_in_body_case_insensitive() {
        let p = classify_priority("status", "please respond AsAp", "anyone@x.com", &[]);
        assert_eq!(p, Priority::High);
    }

    #[test]
    fn test_urgency_dominates_newsletter_pattern() {
        // A no-reply sender with an urgent subject is still high.
        let p = classify_priority("deadline tomorrow", "", "noreply@corp.com", &[]);
        assert_eq!(p, Priority::High);
    }

    #[test]
    fn test_vip_sender_exact_match() {
        let vips = vec!["Boss@Corp.com".to_string()];
        let p = classify_priority("hello", "", "boss@corp.com", &vips);
        assert_eq!(p, Priority::High);
    }

    #[test]
    fn test_vip_is_not_substring_match() {
        let vips = vec!["boss@corp.com".to_string()];
        let p = classify_priority("hello", "", "not-boss@corp.com", &vips);
        assert_eq!(p, Priority::Normal);
    }

    #[test]
    fn test_newsletter_sender_is_low() {
        for sender in [
            "noreply@store.com",
            "no-reply@svc.io",
            "newsletter@blog.net",
            "notifications@app.dev",
            "mailer-daemon@mail.org",
        ] {
            assert_eq!(classify_priority("weekly digest", "", sender, &[]), Priority::Low);
        }
    }

    #[test]
    fn test_default_is_normal() {
        let p = classify_priority("lunch?", "free today?", "friend@x.com", &[]);
        assert_eq!(p, Priority::Normal);
    }

    #[test]
    fn test_priority_parse_unknown_is_normal() {
        assert_eq!(Priority::parse("high"), Priority::High);
        assert_eq!(Priority::parse("LOW"), Priority::Low);
        assert_eq!(Priority::parse("critical"), Priority::Normal);
        assert_eq!(Priority::parse(""), Priority::Normal);
    }

    #[test]
    fn test_priority_ordering_high_first() {
        let mut priorities = vec![Priority::Low, Priority::Normal, Priority::High];
        priorities.sort();
        assert_eq!(priorities, vec![Priority::High, Priority::Normal, Priority::Low]);
    }
}
