//! Blob-to-text extractors for the file watcher.
//!
//! Extractors never raise: any failure (missing file, corrupt blob,
//! subprocess error, timeout) collapses to an empty string, and output is
//! capped at `MAX_EXTRACT` characters with a `[truncated]` marker.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use crate::assistant::{Assistant, INVOKE_TIMEOUT};
use crate::util::cap_text;

/// Hard cap on extracted characters.
pub const MAX_EXTRACT: usize = 10_000;

const PDF_TIMEOUT: Duration = Duration::from_secs(60);

/// Extract text from a PDF via a `pdftotext` subprocess.
pub async fn pdf_text(path: &Path) -> String {
    pdf_text_capped(path, MAX_EXTRACT).await
}

pub async fn pdf_text_capped(path: &Path, max_chars: usize) -> String {
    if !path.exists() {
        return String::new();
    }
    let mut command = tokio::process::Command::new("pdftotext");
    command
        .arg(path)
        .arg("-") // write to stdout
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!("pdftotext unavailable for {}: {e}", path.display());
            return String::new();
        }
    };

    let output = match tokio::time::timeout(PDF_TIMEOUT, child.wait_with_output()).await {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(output)) => {
            tracing::warn!(
                "pdftotext exited with {} for {}",
                output.status.code().unwrap_or(-1),
                path.display()
            );
            return String::new();
        }
        Ok(Err(e)) => {
            tracing::warn!("pdftotext I/O failed for {}: {e}", path.display());
            return String::new();
        }
        Err(_) => {
            tracing::warn!("pdftotext timed out for {}", path.display());
            return String::new();
        }
    };

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    cap_text(&text, max_chars)
}

/// Describe an image by delegating to the assistant's image mode.
pub async fn image_description(path: &Path, assistant: &dyn Assistant) -> String {
    image_description_capped(path, assistant, MAX_EXTRACT).await
}

pub async fn image_description_capped(
    path: &Path,
    assistant: &dyn Assistant,
    max_chars: usize,
) -> String {
    if !path.exists() {
        return String::new();
    }
    match assistant.describe_image(path, INVOKE_TIMEOUT).await {
        Ok(text) => cap_text(text.trim(), max_chars),
        Err(e) => {
            tracing::warn!("image description failed for {}: {}", path.display(), e.reason());
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::ScriptedAssistant;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_pdf_text_missing_file_is_empty() {
        assert_eq!(pdf_text(Path::new("/nonexistent/doc.pdf")).await, "");
    }

    #[tokio::test]
    async fn test_pdf_text_corrupt_blob_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, "not a pdf at all").unwrap();
        // Either pdftotext is absent or it fails on garbage; both yield "".
        assert_eq!(pdf_text(&path).await, "");
    }

    #[tokio::test]
    async fn test_image_description_missing_file_is_empty() {
        let assistant = ScriptedAssistant::new(vec!["a cat".into()]);
        let text = image_description(Path::new("/nonexistent/pic.png"), &assistant).await;
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_image_description_delegates_to_assistant() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pic.png");
        std::fs::write(&path, [0u8; 4]).unwrap();
        let assistant =
            ScriptedAssistant::new(vec![]).with_image_response("Invoice dated 2026-01-31");
        let text = image_description(&path, &assistant).await;
        assert_eq!(text, "Invoice dated 2026-01-31");
    }

    #[tokio::test]
    async fn test_image_description_truncates_with_marker() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pic.png");
        std::fs::write(&path, [0u8; 4]).unwrap();
        let long = "x".repeat(50);
        let assistant = ScriptedAssistant::new(vec![]).with_image_response(long);
        let text = image_description_capped(&path, &assistant, 10).await;
        assert_eq!(text, format!("{}\n[truncated]", "x".repeat(10)));
    }
}
