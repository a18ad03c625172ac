//! Multipart upload for files too large for a single request

use super::client::{storage_error, S3Client};
use crate::error::{UploadError, UploadResult};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, ObjectCannedAcl};
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::task::{JoinError, JoinSet};

/// Smallest part S3 accepts (the last part may be smaller)
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Upper bound on parts in one upload
const MAX_PARTS: u64 = 10_000;

/// Parts of one file uploaded at the same time
const PART_CONCURRENCY: usize = 4;

/// Byte range of the source file sent as one part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PartRange {
    pub number: i32,
    pub offset: u64,
    pub len: u64,
}

/// Split `size` bytes into numbered parts.
///
/// The part size is raised to the S3 minimum, and further when the file
/// would otherwise need more than the part limit.
pub(crate) fn part_ranges(size: u64, part_size: u64) -> Vec<PartRange> {
    let part_size = part_size.max(MIN_PART_SIZE).max(size.div_ceil(MAX_PARTS));

    let mut ranges = Vec::new();
    let mut offset = 0;
    while offset < size {
        let len = part_size.min(size - offset);
        ranges.push(PartRange {
            number: ranges.len() as i32 + 1,
            offset,
            len,
        });
        offset += len;
    }
    ranges
}

impl S3Client {
    /// Upload a file in parts, aborting the upload if any part fails
    pub(super) async fn put_file_multipart(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        size: u64,
        acl: ObjectCannedAcl,
    ) -> UploadResult<()> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .acl(acl)
            .send()
            .await
            .map_err(storage_error)?;

        let upload_id = response
            .upload_id()
            .map(|id| id.to_string())
            .ok_or_else(|| UploadError::Storage("No upload ID returned".to_string()))?;

        tracing::debug!("Started multipart upload {} for s3://{}/{}", upload_id, bucket, key);

        let parts = match self.upload_parts(bucket, key, &upload_id, path, size).await {
            Ok(parts) => parts,
            Err(e) => {
                self.abort_multipart_upload(bucket, key, &upload_id).await;
                return Err(e);
            }
        };

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        if let Err(e) = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(completed)
            .send()
            .await
        {
            self.abort_multipart_upload(bucket, key, &upload_id).await;
            return Err(storage_error(e));
        }

        Ok(())
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        path: &Path,
        size: u64,
    ) -> UploadResult<Vec<CompletedPart>> {
        let io_error = |source: std::io::Error| UploadError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).await.map_err(io_error)?;
        let mut tasks: JoinSet<UploadResult<CompletedPart>> = JoinSet::new();
        let mut completed = Vec::new();

        for range in part_ranges(size, self.part_size) {
            if tasks.len() >= PART_CONCURRENCY {
                if let Some(joined) = tasks.join_next().await {
                    completed.push(joined_part(joined)?);
                }
            }

            file.seek(SeekFrom::Start(range.offset))
                .await
                .map_err(io_error)?;
            let mut buffer = vec![0u8; range.len as usize];
            file.read_exact(&mut buffer).await.map_err(io_error)?;

            let request = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(range.number)
                .body(ByteStream::from(buffer));

            tasks.spawn(async move {
                let response = request.send().await.map_err(storage_error)?;
                tracing::debug!("Uploaded part {} ({} bytes)", range.number, range.len);
                Ok::<_, UploadError>(
                    CompletedPart::builder()
                        .part_number(range.number)
                        .set_e_tag(response.e_tag().map(|t| t.to_string()))
                        .build(),
                )
            });
        }

        while let Some(joined) = tasks.join_next().await {
            completed.push(joined_part(joined)?);
        }

        completed.sort_by_key(|p| p.part_number());
        Ok(completed)
    }

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            tracing::warn!(
                "Failed to abort multipart upload {}: {}",
                upload_id,
                DisplayErrorContext(e)
            );
        }
    }
}

fn joined_part(
    joined: Result<UploadResult<CompletedPart>, JoinError>,
) -> UploadResult<CompletedPart> {
    joined.map_err(|e| UploadError::Storage(format!("part upload task failed: {}", e)))?
}
