//! Shared utility functions for the steward crate.

/// Convert text to a filesystem-safe slug: lowercase, alphanumerics and
/// hyphens only, runs of separators collapsed.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_dash = true;
    for ch in text.trim().to_lowercase().chars() {
        if ch.is_alphanumeric() {
            slug.push(ch);
            last_dash = false;
        } else if ch.is_whitespace() || ch == '-' || ch == '_' {
            if !last_dash {
                slug.push('-');
                last_dash = true;
            }
        }
        // Everything else (punctuation, symbols) is dropped.
    }
    slug.trim_matches('-').to_string()
}

/// Truncate `text` to at most `max` characters, appending a `[truncated]`
/// marker when anything was cut.
pub fn cap_text(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut capped: String = text.chars().take(max).collect();
    capped.push_str("\n[truncated]");
    capped
}

/// First `max` characters of `text` (UTF-8 safe), for log previews.
pub fn preview(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Serializes tests that mutate process environment variables.
#[cfg(test)]
pub(crate) static TEST_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
