//! Storage operations the upload flow depends on

use crate::error::UploadResult;
use async_trait::async_trait;
use aws_sdk_s3::types::ObjectCannedAcl;
use std::path::Path;

/// The narrow slice of an object store used by an upload invocation.
///
/// [`crate::s3::S3Client`] is the production implementation.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Whether the bucket exists. A missing bucket is `Ok(false)`;
    /// authentication and authorization failures are errors.
    async fn bucket_exists(&self, bucket: &str) -> UploadResult<bool>;

    /// Upload a local file as one object, returning the bytes sent
    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        acl: ObjectCannedAcl,
    ) -> UploadResult<u64>;
}
