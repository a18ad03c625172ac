//! In-flight transfer handle

use crate::error::{UploadError, UploadResult};
use crate::s3::store::ObjectStore;
use crate::upload::plan::UploadPlan;
use aws_sdk_s3::types::ObjectCannedAcl;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};

/// Lifecycle of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    InProgress,
    Completed,
    Failed,
}

impl TransferState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TransferState::Completed,
            2 => TransferState::Failed,
            _ => TransferState::InProgress,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            TransferState::InProgress => 0,
            TransferState::Completed => 1,
            TransferState::Failed => 2,
        }
    }
}

/// Snapshot of transfer counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub total_bytes: u64,
    pub bytes_transferred: u64,
    pub objects_done: usize,
    pub objects_total: usize,
}

/// Final result of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    pub bytes_transferred: u64,
    pub completed: bool,
    pub objects: usize,
}

#[derive(Default)]
struct Counters {
    total_bytes: AtomicU64,
    bytes_transferred: AtomicU64,
    objects_done: AtomicUsize,
    state: AtomicU8,
    first_error: Mutex<Option<UploadError>>,
}

impl Counters {
    fn state(&self) -> TransferState {
        TransferState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: TransferState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn record_failure(&self, err: UploadError) {
        if let Ok(mut slot) = self.first_error.lock() {
            if slot.is_none() {
                *slot = Some(err);
            }
        }
    }

    fn has_failed(&self) -> bool {
        self.first_error
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(true)
    }

    fn take_failure(&self) -> Option<UploadError> {
        self.first_error.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Read-only view of a running transfer's counters
#[derive(Clone)]
pub struct TransferMonitor {
    counters: Arc<Counters>,
    objects_total: usize,
}

impl TransferMonitor {
    pub fn progress(&self) -> TransferProgress {
        TransferProgress {
            total_bytes: self.counters.total_bytes.load(Ordering::Relaxed),
            bytes_transferred: self.counters.bytes_transferred.load(Ordering::Relaxed),
            objects_done: self.counters.objects_done.load(Ordering::Relaxed),
            objects_total: self.objects_total,
        }
    }

    pub fn state(&self) -> TransferState {
        self.counters.state()
    }

    pub fn is_done(&self) -> bool {
        self.state() != TransferState::InProgress
    }
}

/// A running upload of every object in an [`UploadPlan`].
///
/// Objects are sent on a background task, at most `concurrency` at a time.
/// Once one object fails no further objects are started; objects already
/// in flight are left to finish.
pub struct Transfer {
    monitor: TransferMonitor,
    handle: JoinHandle<()>,
}

impl Transfer {
    pub fn start<S>(
        store: Arc<S>,
        bucket: &str,
        plan: UploadPlan,
        acl: ObjectCannedAcl,
        concurrency: usize,
    ) -> Self
    where
        S: ObjectStore + ?Sized + 'static,
    {
        let counters = Arc::new(Counters::default());
        counters
            .total_bytes
            .store(plan.total_bytes(), Ordering::Relaxed);
        let objects_total = plan.objects.len();

        let task_counters = counters.clone();
        let bucket = bucket.to_string();
        let handle = tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
            let mut tasks = JoinSet::new();

            for object in plan.objects {
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                if task_counters.has_failed() {
                    break;
                }

                let store = store.clone();
                let bucket = bucket.clone();
                let acl = acl.clone();
                let counters = task_counters.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    match store.put_file(&bucket, &object.key, &object.path, acl).await {
                        Ok(bytes) => {
                            counters.bytes_transferred.fetch_add(bytes, Ordering::Relaxed);
                            counters.objects_done.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            tracing::error!("Failed to upload {:?} to {}: {}", object.path, object.key, e);
                            counters.record_failure(e);
                        }
                    }
                });
            }

            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    task_counters.record_failure(UploadError::Storage(format!("upload task aborted: {}", e)));
                }
            }

            let state = if task_counters.has_failed() {
                TransferState::Failed
            } else {
                TransferState::Completed
            };
            task_counters.set_state(state);
        });

        Self {
            monitor: TransferMonitor {
                counters,
                objects_total,
            },
            handle,
        }
    }

    /// Handle for reading progress while the transfer is being awaited
    pub fn monitor(&self) -> TransferMonitor {
        self.monitor.clone()
    }

    pub fn progress(&self) -> TransferProgress {
        self.monitor.progress()
    }

    pub fn state(&self) -> TransferState {
        self.monitor.state()
    }

    pub fn is_done(&self) -> bool {
        self.monitor.is_done()
    }

    /// Block until the transfer reaches a terminal state.
    ///
    /// An error raised by the store (bad credentials, missing permissions...)
    /// is handed back as-is; otherwise the terminal state is returned.
    pub async fn wait_for_completion(&mut self) -> UploadResult<TransferState> {
        if let Err(e) = (&mut self.handle).await {
            tracing::error!("Transfer task ended abnormally: {}", e);
            self.monitor.counters.set_state(TransferState::Failed);
        }

        match self.monitor.counters.take_failure() {
            Some(err) => Err(err),
            None => Ok(self.state()),
        }
    }

    pub fn outcome(&self) -> TransferOutcome {
        let progress = self.progress();
        TransferOutcome {
            bytes_transferred: progress.bytes_transferred,
            completed: self.state() == TransferState::Completed,
            objects: progress.objects_done,
        }
    }
}
