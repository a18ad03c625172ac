//! Top-level upload invocation
//!
//! Runs the pre-flight checks and the upload in a fixed order:
//! validate source, resolve client, check bucket, then either report a dry
//! run or upload and report the outcome. Any failure aborts the invocation
//! with a single [`UploadError`].

use crate::error::{UploadError, UploadResult};
use crate::s3::client::{ClientResolver, ClientSpec};
use crate::s3::store::ObjectStore;
use crate::s3::types::S3Url;
use crate::upload::executor::{UploadExecutor, DEFAULT_CONCURRENCY};
use crate::upload::progress::PROGRESS_INTERVAL;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

/// What to upload and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub source: PathBuf,
    pub bucket_name: String,
    pub destination: String,
    pub recursive: bool,
    pub dry_run: bool,
    pub show_progress: bool,
    pub concurrency: usize,
}

impl UploadRequest {
    pub fn new(source: impl Into<PathBuf>, bucket_name: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            bucket_name: bucket_name.into(),
            destination: destination.into(),
            recursive: false,
            dry_run: false,
            show_progress: true,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn target(&self) -> S3Url {
        S3Url::new(&self.bucket_name, &self.destination)
    }

    fn executor(&self) -> UploadExecutor {
        UploadExecutor {
            show_progress: self.show_progress,
            concurrency: self.concurrency,
            poll_interval: PROGRESS_INTERVAL,
        }
    }
}

/// Steps of an invocation, logged as they are entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Resolving,
    CheckingBucket,
    DryRun,
    Uploading,
    Reporting,
}

/// The terminal message of a successful invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    DryRun {
        source: PathBuf,
        target: S3Url,
    },
    Uploaded {
        source: PathBuf,
        target: S3Url,
        bytes_transferred: u64,
        objects: usize,
    },
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::DryRun { source, target } => write!(
                f,
                "File {} would have been uploaded to {} (dry run)",
                source.display(),
                target
            ),
            Report::Uploaded {
                source,
                target,
                bytes_transferred,
                ..
            } => write!(
                f,
                "File {} uploaded to {} ({} bytes)",
                source.display(),
                target,
                bytes_transferred
            ),
        }
    }
}

fn enter(stage: Stage) {
    tracing::debug!("Stage: {:?}", stage);
}

/// Run an invocation against S3
pub async fn run(
    request: &UploadRequest,
    spec: &ClientSpec,
    resolver: &ClientResolver,
) -> UploadResult<Report> {
    let connect = move || async move { Arc::new(resolver.resolve(spec).await) };
    run_with_store(request, connect, request.executor()).await
}

/// Run an invocation with a caller-supplied store.
///
/// `connect` is called at most once, and only after the source has been
/// found on disk.
pub async fn run_with_store<S, C, Fut>(
    request: &UploadRequest,
    connect: C,
    executor: UploadExecutor,
) -> UploadResult<Report>
where
    S: ObjectStore + ?Sized + 'static,
    C: FnOnce() -> Fut,
    Fut: Future<Output = Arc<S>>,
{
    enter(Stage::Validating);
    if !request.source.exists() {
        return Err(UploadError::SourceMissing(request.source.clone()));
    }

    enter(Stage::Resolving);
    let store = connect().await;

    enter(Stage::CheckingBucket);
    if !store.bucket_exists(&request.bucket_name).await? {
        return Err(UploadError::BucketMissing(request.bucket_name.clone()));
    }

    let target = request.target();

    if request.dry_run {
        enter(Stage::DryRun);
        return Ok(Report::DryRun {
            source: request.source.clone(),
            target,
        });
    }

    enter(Stage::Uploading);
    let outcome = executor
        .upload(
            store,
            &request.source,
            &request.bucket_name,
            &request.destination,
            request.recursive,
        )
        .await?;

    if !outcome.completed {
        return Err(UploadError::TransferIncomplete);
    }

    enter(Stage::Reporting);
    Ok(Report::Uploaded {
        source: request.source.clone(),
        target,
        bytes_transferred: outcome.bytes_transferred,
        objects: outcome.objects,
    })
}
