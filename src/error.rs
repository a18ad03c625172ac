//! Error types for upload invocations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for upload operations
pub type UploadResult<T> = Result<T, UploadError>;

/// Everything that can abort an upload invocation.
///
/// Configuration variants carry the offending value so the terminal message
/// identifies the parameter that needs fixing.
#[derive(Error, Debug)]
pub enum UploadError {
    /// Source path is missing on disk
    #[error("File/folder doesn't exist: {}", .0.display())]
    SourceMissing(PathBuf),

    /// Source is a socket, device, dangling link...
    #[error("File is neither a regular file nor a directory: {}", .0.display())]
    NotFileOrDirectory(PathBuf),

    /// Target bucket is missing
    #[error("Bucket doesn't exist: {0}")]
    BucketMissing(String),

    /// A required parameter was supplied neither on the command line nor in settings
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// A parameter was supplied but its value is unusable
    #[error("Invalid value for {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Error reported by the storage service (including authentication failures)
    #[error("S3 error: {0}")]
    Storage(String),

    /// Local I/O failure while enumerating or reading the source
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Transfer reached a terminal state other than completed, or was interrupted
    #[error("Unable to upload file to S3.")]
    TransferIncomplete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_offending_value() {
        let err = UploadError::SourceMissing(PathBuf::from("target/missing.jar"));
        assert_eq!(err.to_string(), "File/folder doesn't exist: target/missing.jar");

        let err = UploadError::BucketMissing("releases".to_string());
        assert_eq!(err.to_string(), "Bucket doesn't exist: releases");

        let err = UploadError::MissingParameter("bucket-name");
        assert!(err.to_string().contains("bucket-name"));
    }

    #[test]
    fn test_transfer_incomplete_message() {
        assert_eq!(
            UploadError::TransferIncomplete.to_string(),
            "Unable to upload file to S3."
        );
    }
}
