//! S3 client wrapper module
//!
//! This module provides AWS S3 functionality including:
//! - [`client::ClientResolver`] - Builds a client from credentials, region and endpoint
//! - [`client::S3Client`] - High-level S3 operations wrapper
//! - [`credentials::ProfileStore`] - AWS profile lookup
//! - [`multipart`] - Multipart upload of large files
//! - [`store::ObjectStore`] - Storage operations the upload flow needs
//! - [`types`] - S3 data types (S3Url)

pub mod client;
pub mod credentials;
pub mod multipart;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use client::{ClientResolver, ClientSpec, EndpointSpec, S3Client, DEFAULT_MULTIPART_THRESHOLD};
pub use credentials::{CredentialSpec, ProfileStore};
pub use multipart::MIN_PART_SIZE;
pub use store::ObjectStore;
pub use types::S3Url;
