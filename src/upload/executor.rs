//! Upload of a file or directory tree to a bucket

use crate::error::UploadResult;
use crate::s3::store::ObjectStore;
use crate::s3::types::size_string;
use crate::upload::plan::{SourceKind, UploadPlan};
use crate::upload::progress::{ProgressDisplay, PROGRESS_INTERVAL};
use crate::upload::transfer::{Transfer, TransferOutcome};
use aws_sdk_s3::types::ObjectCannedAcl;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Objects uploaded concurrently within a directory transfer
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Uploads one source to one destination.
#[derive(Debug, Clone)]
pub struct UploadExecutor {
    pub show_progress: bool,
    pub concurrency: usize,
    pub poll_interval: Duration,
}

impl Default for UploadExecutor {
    fn default() -> Self {
        Self {
            show_progress: true,
            concurrency: DEFAULT_CONCURRENCY,
            poll_interval: PROGRESS_INTERVAL,
        }
    }
}

impl UploadExecutor {
    /// Upload `source`, giving up early if the process receives Ctrl-C
    pub async fn upload<S>(
        &self,
        store: Arc<S>,
        source: &Path,
        bucket: &str,
        destination: &str,
        recursive: bool,
    ) -> UploadResult<TransferOutcome>
    where
        S: ObjectStore + ?Sized + 'static,
    {
        self.upload_until(store, source, bucket, destination, recursive, ctrl_c())
            .await
    }

    /// Upload `source`, giving up when `interrupt` resolves first.
    ///
    /// Every object is written with the `bucket-owner-full-control` canned
    /// ACL. An interrupt yields a non-completed outcome rather than an error;
    /// uploads already in flight are not cancelled and partial results may
    /// remain in the bucket.
    pub async fn upload_until<S, I>(
        &self,
        store: Arc<S>,
        source: &Path,
        bucket: &str,
        destination: &str,
        recursive: bool,
        interrupt: I,
    ) -> UploadResult<TransferOutcome>
    where
        S: ObjectStore + ?Sized + 'static,
        I: Future<Output = ()>,
    {
        let plan = UploadPlan::build(source, destination, recursive)?;
        match plan.kind {
            SourceKind::File => tracing::debug!("Uploading file {:?} as {}", source, destination),
            SourceKind::Directory => tracing::debug!(
                "Uploading {} files from {:?} under {} (recursive={})",
                plan.objects.len(),
                source,
                destination,
                recursive
            ),
        }

        let total_bytes = plan.total_bytes();
        tracing::debug!("Transferring {} bytes...", total_bytes);

        let mut transfer = Transfer::start(
            store,
            bucket,
            plan,
            ObjectCannedAcl::BucketOwnerFullControl,
            self.concurrency,
        );

        let monitor = transfer.monitor();
        let wait = async {
            if self.show_progress {
                let display = ProgressDisplay::new(total_bytes, &source.display().to_string());
                let mut ticker = tokio::time::interval(self.poll_interval);
                while !monitor.is_done() {
                    ticker.tick().await;
                    display.update(&monitor.progress());
                }
                display.finish();
            }
            transfer.wait_for_completion().await
        };

        tokio::select! {
            result = wait => {
                result?;
            }
            _ = interrupt => {
                let progress = monitor.progress();
                tracing::warn!(
                    "Interrupted while waiting for the transfer to finish ({} of {} bytes sent)",
                    progress.bytes_transferred,
                    progress.total_bytes
                );
                return Ok(TransferOutcome {
                    bytes_transferred: progress.bytes_transferred,
                    completed: false,
                    objects: progress.objects_done,
                });
            }
        }

        let outcome = transfer.outcome();
        tracing::info!(
            "Transferred {} bytes ({}).",
            outcome.bytes_transferred,
            size_string(outcome.bytes_transferred)
        );

        Ok(outcome)
    }
}

/// Resolves on Ctrl-C; never resolves where signals are unavailable
async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadError;
    use crate::testing::MemoryStore;
    use std::fs;
    use tempfile::TempDir;

    fn quiet() -> UploadExecutor {
        UploadExecutor {
            show_progress: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_single_file_upload() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "abc").unwrap();
        let store = Arc::new(MemoryStore::with_bucket("test-bucket"));

        let outcome = quiet()
            .upload(store.clone(), &file, "test-bucket", "uploads/file.txt", false)
            .await
            .unwrap();

        assert!(outcome.completed);
        assert_eq!(outcome.bytes_transferred, 3);
        assert_eq!(store.keys("test-bucket"), vec!["uploads/file.txt"]);
        assert_eq!(store.object("test-bucket", "uploads/file.txt").unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_every_object_gets_owner_full_control() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), "b").unwrap();
        let store = Arc::new(MemoryStore::with_bucket("test-bucket"));

        quiet()
            .upload(store.clone(), dir.path(), "test-bucket", "out", true)
            .await
            .unwrap();

        for key in store.keys("test-bucket") {
            assert_eq!(
                store.acl("test-bucket", &key),
                Some(ObjectCannedAcl::BucketOwnerFullControl)
            );
        }
    }

    #[tokio::test]
    async fn test_progress_polling_still_completes() {
        let dir = TempDir::new().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("f{}.txt", i)), vec![b'x'; 100]).unwrap();
        }
        let store = Arc::new(MemoryStore::with_bucket("b").with_delay(Duration::from_millis(20)));
        let executor = UploadExecutor {
            show_progress: true,
            concurrency: 2,
            poll_interval: Duration::from_millis(5),
        };

        let outcome = executor
            .upload(store.clone(), dir.path(), "b", "out", false)
            .await
            .unwrap();

        assert!(outcome.completed);
        assert_eq!(outcome.objects, 5);
        assert_eq!(outcome.bytes_transferred, 500);
    }

    #[tokio::test]
    async fn test_interrupt_returns_failed_outcome() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("slow.txt");
        fs::write(&file, "slow").unwrap();
        let store = Arc::new(MemoryStore::with_bucket("b").with_delay(Duration::from_secs(30)));

        let outcome = quiet()
            .upload_until(store, &file, "b", "slow.txt", false, async {})
            .await
            .unwrap();

        assert!(!outcome.completed);
    }

    #[tokio::test]
    async fn test_interrupt_reports_bytes_already_sent() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "fast").unwrap();
        fs::write(dir.path().join("z.txt"), "stuck").unwrap();
        let store = Arc::new(
            MemoryStore::with_bucket("b").stalled_on("out/z.txt", Duration::from_secs(30)),
        );
        let executor = UploadExecutor {
            concurrency: 2,
            ..quiet()
        };

        let outcome = executor
            .upload_until(
                store.clone(),
                dir.path(),
                "b",
                "out",
                false,
                tokio::time::sleep(Duration::from_millis(300)),
            )
            .await
            .unwrap();

        assert!(!outcome.completed);
        assert_eq!(outcome.bytes_transferred, 4);
        assert_eq!(outcome.objects, 1);
        assert_eq!(store.keys("b"), vec!["out/a.txt"]);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "abc").unwrap();
        let store = Arc::new(MemoryStore::with_bucket("b").failing_with("AccessDenied"));

        let err = quiet()
            .upload(store, &file, "b", "file.txt", false)
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Storage(msg) if msg.contains("AccessDenied")));
    }
}
