//! File watcher: scans the `Incoming_Files/` drop zone for PDFs and images,
//! extracts their content, and materializes artifacts.
//!
//! Processed blobs move into `Incoming_Files/.processed/` so they are not
//! picked up again. Dry-run mode detects and logs but neither materializes
//! nor moves anything.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use super::Watcher;
use crate::assistant::Assistant;
use crate::audit::ActivityLog;
use crate::extract;
use crate::store::{Folder, Header, Vault};
use crate::util::slugify;

pub const SUPPORTED_EXTENSIONS: [&str; 8] =
    ["pdf", "png", "jpg", "jpeg", "gif", "bmp", "tiff", "webp"];

pub const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "gif", "bmp", "tiff", "webp"];

#[derive(Debug, Clone)]
pub struct FileDetection {
    pub filename: String,
    pub extension: String,
    pub path: PathBuf,
    pub detected_at: String,
    pub size_bytes: u64,
}

pub struct FileWatcher {
    vault: Vault,
    assistant: Arc<dyn Assistant>,
    dry_run: bool,
    log: ActivityLog,
    seen: HashSet<String>,
}

impl FileWatcher {
    pub fn new(vault: Vault, assistant: Arc<dyn Assistant>, dry_run: bool) -> Self {
        let log = ActivityLog::new(vault.dir(Folder::Logs));
        Self { vault, assistant, dry_run, log, seen: HashSet::new() }
    }

    fn incoming_dir(&self) -> PathBuf {
        self.vault.dir(Folder::IncomingFiles)
    }
}

#[async_trait]
impl Watcher for FileWatcher {
    type Detection = FileDetection;

    async fn poll(&mut self) -> Vec<FileDetection> {
        let dir = self.incoming_dir();
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        let mut detections = Vec::new();
        for path in paths {
            let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let extension = extension.to_lowercase();
            if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if self.seen.contains(filename) {
                continue;
            }
            let size_bytes = path.metadata().map(|m| m.len()).unwrap_or(0);
            let detection = FileDetection {
                filename: filename.to_string(),
                extension,
                path: path.clone(),
                detected_at: Utc::now().to_rfc3339(),
                size_bytes,
            };
            if self.dry_run {
                tracing::info!(
                    "dry-run: detected {} ({}, {} bytes)",
                    detection.filename,
                    detection.extension,
                    detection.size_bytes
                );
            }
            detections.push(detection);
        }
        if !detections.is_empty() && !self.dry_run {
            tracing::info!("detected {} new file(s) in Incoming_Files", detections.len());
        }
        detections
    }

    async fn materialize(&mut self, item: &FileDetection) -> anyhow::Result<PathBuf> {
        let extracted_text = if item.extension == "pdf" {
            extract::pdf_text(&item.path).await
        } else {
            extract::image_description(&item.path, self.assistant.as_ref()).await
        };
        let has_content = !extracted_text.trim().is_empty();

        let slug: String = slugify(&item.filename).chars().take(50).collect();
        let slug = slug.trim_end_matches('-');
        let slug = if slug.is_empty() { "file" } else { slug };
        let name = format!("file-{slug}.md");

        let mut header = Header::new();
        header.set("type", "file");
        header.set("filename", &item.filename);
        header.set("extension", &item.extension);
        header.set("detected_at", &item.detected_at);
        header.set("size_bytes", item.size_bytes.to_string());
        header.set("extracted", if has_content { "true" } else { "false" });
        header.set("priority", "normal");

        let summary_section = if has_content {
            format!("## Extracted Content\n{extracted_text}")
        } else {
            "## Summary\nPending analysis — file content extraction not yet available. \
             Review manually."
                .to_string()
        };

        let body = format!(
            "# New File: {filename}\n\n\
             **Filename:** {filename}\n\
             **Type:** {extension}\n\
             **Detected:** {detected}\n\
             **Size:** {size} bytes\n\n\
             {summary_section}\n\n\
             ## Suggested Actions\n\
             - [ ] Review file contents\n\
             - [ ] Categorize and file\n\
             - [ ] Forward to relevant party\n\
             - [ ] Archive\n",
            filename = item.filename,
            extension = item.extension,
            detected = item.detected_at,
            size = item.size_bytes,
        );

        let path = self.vault.write(Folder::NeedsAction, &name, &header, &body)?;
        tracing::info!("created action file: {name} (extracted={has_content})");

        // Move the blob out of the drop zone so it is not reprocessed.
        let processed_dir = self.incoming_dir().join(".processed");
        std::fs::create_dir_all(&processed_dir)?;
        std::fs::rename(&item.path, processed_dir.join(&item.filename))?;

        self.seen.insert(item.filename.clone());
        self.log.append(
            "file_watcher",
            "file_detected",
            &item.filename,
            &format!("action_file_created:{name}"),
        )?;
        Ok(path)
    }

    async fn run_once(&mut self) -> usize {
        let detections = self.poll().await;
        if self.dry_run {
            for item in &detections {
                self.seen.insert(item.filename.clone());
            }
            return 0;
        }
        let mut count = 0;
        for item in &detections {
            match self.materialize(item).await {
                Ok(_) => count += 1,
                Err(e) => tracing::error!("failed to process {}: {e:#}", item.filename),
            }
        }
        count
    }
}
