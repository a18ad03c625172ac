//! S3 Upload Library
//!
//! Uploads a local file or directory tree to an S3 bucket. The binary wraps
//! [`invocation::run`] with a command line; build scripts can call it
//! directly.

pub mod cli;
pub mod error;
pub mod invocation;
pub mod s3;
pub mod settings;
pub mod upload;

#[cfg(test)]
mod testing;

pub use error::{UploadError, UploadResult};
pub use invocation::{run, Report, UploadRequest};
