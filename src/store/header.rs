//! Artifact header block: a `---`-delimited run of `key: value` lines at the
//! top of every artifact.
//!
//! The header is a record of well-known fields plus an extension map for
//! domain keys. Values are stored as raw strings; `priority` and
//! `confidence` get typed accessors. Parsing is a simple line scanner, not a
//! YAML implementation; multi-line values are unsupported and a missing
//! header block yields an empty header.

use std::collections::BTreeMap;

use crate::priority::Priority;

/// The line that opens and closes a header block.
pub const HEADER_DELIMITER: &str = "---";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    /// Artifact type (`email`, `file`, `social_post`, …); the `type:` key.
    pub kind: Option<String>,
    /// Name of the originating artifact, for plans.
    pub source: Option<String>,
    /// Creation timestamp, ISO-8601 UTC.
    pub created: Option<String>,
    /// Lifecycle status (`pending_approval`, `approved`, `rejected`).
    pub status: Option<String>,
    /// Executable action carried by a plan (`reply`, `social_post`).
    pub action: Option<String>,
    /// Everything else, in sorted key order.
    pub extra: BTreeMap<String, String>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.source.is_none()
            && self.created.is_none()
            && self.status.is_none()
            && self.action.is_none()
            && self.extra.is_empty()
    }

    /// Look up a key, well-known or extension.
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "type" => self.kind.as_deref(),
            "source" => self.source.as_deref(),
            "created" => self.created.as_deref(),
            "status" => self.status.as_deref(),
            "action" => self.action.as_deref(),
            _ => self.extra.get(key).map(String::as_str),
        }
    }

    /// Set a key, routing to the matching well-known field.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match key {
            "type" => self.kind = Some(value),
            "source" => self.source = Some(value),
            "created" => self.created = Some(value),
            "status" => self.status = Some(value),
            "action" => self.action = Some(value),
            _ => {
                self.extra.insert(key.to_string(), value);
            }
        }
    }

    /// Remove a key, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        match key {
            "type" => self.kind.take(),
            "source" => self.source.take(),
            "created" => self.created.take(),
            "status" => self.status.take(),
            "action" => self.action.take(),
            _ => self.extra.remove(key),
        }
    }

    /// Typed `priority` accessor; absent or unrecognized values are normal.
    pub fn priority(&self) -> Priority {
        self.get("priority").map(Priority::parse).unwrap_or_default()
    }

    /// Typed `confidence` accessor; absent or unparseable is `None`.
    pub fn confidence(&self) -> Option<f64> {
        self.get("confidence").and_then(|v| v.trim().parse().ok())
    }

    /// Parse a full document into (header, body). A document that does not
    /// open with the delimiter has an empty header and is all body.
    pub fn parse_document(text: &str) -> (Header, String) {
        let mut lines = text.lines();
        match lines.next() {
            Some(line) if line.trim_end() == HEADER_DELIMITER => {}
            _ => return (Header::new(), text.to_string()),
        }

        let mut header = Header::new();
        let mut consumed = HEADER_DELIMITER.len();
        // Account for the newline after the opening delimiter, if any.
        if text.len() > consumed {
            consumed += 1;
        }
        let mut closed = false;

        for line in lines {
            let line_len = line.len();
            if line.trim_end() == HEADER_DELIMITER {
                consumed += line_len;
                closed = true;
                break;
            }
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim();
                if !key.is_empty() {
                    header.set(key, unquote(value.trim()));
                }
            }
            consumed += line_len + 1;
        }

        if !closed {
            // Unterminated block: treat the whole document as body.
            return (Header::new(), text.to_string());
        }

        let mut body = &text[consumed..];
        // render() puts one blank line between the block and the body.
        for _ in 0..2 {
            if let Some(rest) = body.strip_prefix('\n') {
                body = rest;
            } else {
                break;
            }
        }
        (header, body.to_string())
    }

    /// Render the header block followed by the body. Fields appear in a
    /// fixed order (type, source, created, status, action, then extensions
    /// sorted by key) so rewrites are deterministic.
    pub fn render(&self, body: &str) -> String {
        if self.is_empty() {
            return body.to_string();
        }
        let mut out = String::new();
        out.push_str(HEADER_DELIMITER);
        out.push('\n');
        for (key, value) in [
            ("type", &self.kind),
            ("source", &self.source),
            ("created", &self.created),
            ("status", &self.status),
            ("action", &self.action),
        ] {
            if let Some(value) = value {
                push_field(&mut out, key, value);
            }
        }
        for (key, value) in &self.extra {
            push_field(&mut out, key, value);
        }
        out.push_str(HEADER_DELIMITER);
        out.push_str("\n\n");
        out.push_str(body);
        out
    }

    /// True when every field of `other` is present here with the same value.
    pub fn contains(&self, other: &Header) -> bool {
        let keys = |h: &Header| -> Vec<(String, String)> {
            let mut pairs = Vec::new();
            for key in ["type", "source", "created", "status", "action"] {
                if let Some(v) = h.get(key) {
                    pairs.push((key.to_string(), v.to_string()));
                }
            }
            for (k, v) in &h.extra {
                pairs.push((k.clone(), v.clone()));
            }
            pairs
        };
        keys(other)
            .into_iter()
            .all(|(k, v)| self.get(&k) == Some(v.as_str()))
    }
}

fn push_field(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push_str(": ");
    if needs_quoting(value) {
        out.push('"');
        out.push_str(value);
        out.push('"');
    } else {
        out.push_str(value);
    }
    out.push('\n');
}

fn needs_quoting(value: &str) -> bool {
    value.contains(':') || value.starts_with(' ') || value.ends_with(' ')
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}
