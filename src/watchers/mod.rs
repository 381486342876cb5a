//! Watchers convert external events into fresh artifacts under
//! `Needs_Action/`.
//!
//! The capability is two operations plus shared run-once logic: `poll`
//! detects new items (idempotent within a process via a seen set), and
//! `materialize` writes one artifact per detection. One detection failing
//! must never abort the rest of the batch.

pub mod file;
pub mod mail;

pub use file::FileWatcher;
pub use mail::MailWatcher;

use async_trait::async_trait;
use std::path::PathBuf;

#[async_trait]
pub trait Watcher: Send {
    type Detection: Send + Sync;

    /// Detect new items. Provider errors are logged and yield an empty
    /// batch rather than failing the cycle.
    async fn poll(&mut self) -> Vec<Self::Detection>;

    /// Write the artifact for one detection.
    async fn materialize(&mut self, detection: &Self::Detection) -> anyhow::Result<PathBuf>;

    /// Poll and materialize everything, counting successes. Per-item
    /// failures are logged and skipped.
    async fn run_once(&mut self) -> usize {
        let detections = self.poll().await;
        let mut count = 0;
        for detection in &detections {
            match self.materialize(detection).await {
                Ok(_) => count += 1,
                Err(e) => tracing::error!("failed to materialize detection: {e:#}"),
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyWatcher {
        items: Vec<u32>,
        materialized: AtomicUsize,
    }

    #[async_trait]
    impl Watcher for FlakyWatcher {
        type Detection = u32;

        async fn poll(&mut self) -> Vec<u32> {
            self.items.clone()
        }

        async fn materialize(&mut self, detection: &u32) -> anyhow::Result<PathBuf> {
            if *detection == 2 {
                anyhow::bail!("item 2 is poisoned");
            }
            self.materialized.fetch_add(1, Ordering::SeqCst);
            Ok(PathBuf::from(format!("item-{detection}.md")))
        }
    }

    #[tokio::test]
    async fn test_run_once_isolates_per_item_failures() {
        let mut watcher = FlakyWatcher {
            items: vec![1, 2, 3],
            materialized: AtomicUsize::new(0),
        };
        let count = watcher.run_once().await;
        // Item 2 fails; 1 and 3 still materialize.
        assert_eq!(count, 2);
        assert_eq!(watcher.materialized.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_once_empty_poll() {
        let mut watcher = FlakyWatcher { items: vec![], materialized: AtomicUsize::new(0) };
        assert_eq!(watcher.run_once().await, 0);
    }
}
