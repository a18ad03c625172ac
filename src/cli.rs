//! Command-line surface

use crate::error::{UploadError, UploadResult};
use crate::invocation::UploadRequest;
use crate::s3::client::{ClientSpec, EndpointSpec};
use crate::s3::credentials::CredentialSpec;
use crate::settings::Settings;
use crate::upload::executor::DEFAULT_CONCURRENCY;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "s3-upload")]
#[command(version, about = "Upload a file or directory tree to an S3 bucket", long_about = None)]
pub struct Cli {
    /// Access key for S3
    #[arg(long, env = "S3_UPLOAD_ACCESS_KEY", hide_env_values = true)]
    pub access_key: Option<String>,

    /// Secret key for S3
    #[arg(long, env = "S3_UPLOAD_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Run every check but skip the upload itself
    #[arg(long = "do-not-upload", visible_alias = "dry-run", env = "S3_UPLOAD_DO_NOT_UPLOAD")]
    pub do_not_upload: bool,

    /// The file/folder to upload
    #[arg(short = 's', long, value_name = "PATH", env = "S3_UPLOAD_SOURCE")]
    pub source: Option<PathBuf>,

    /// The bucket to upload into
    #[arg(short = 'b', long, env = "S3_UPLOAD_BUCKET_NAME")]
    pub bucket_name: Option<String>,

    /// The key (file) or key prefix (folder) to create in the bucket
    #[arg(short = 'd', long, value_name = "KEY", env = "S3_UPLOAD_DESTINATION")]
    pub destination: Option<String>,

    /// Custom endpoint URL (S3-compatible stores, special regions)
    #[arg(long, value_name = "URL", env = "S3_UPLOAD_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Region of the destination bucket
    #[arg(long, env = "S3_UPLOAD_REGION")]
    pub region: Option<String>,

    /// AWS profile to get credentials from
    #[arg(long, env = "S3_UPLOAD_PROFILE")]
    pub profile: Option<String>,

    /// For a directory upload, include the contents of subdirectories
    #[arg(short = 'R', long, env = "S3_UPLOAD_RECURSIVE")]
    pub recursive: bool,

    /// Show progress while the upload runs [default: true]
    #[arg(long, value_name = "BOOL", env = "S3_UPLOAD_SHOW_PROGRESS")]
    pub show_progress: Option<bool>,

    /// Use path-style bucket addressing (MinIO, LocalStack)
    #[arg(long, env = "S3_UPLOAD_FORCE_PATH_STYLE")]
    pub force_path_style: bool,

    /// Objects uploaded in parallel for a directory upload [default: 8]
    #[arg(long, value_name = "N", env = "S3_UPLOAD_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Settings file with parameter defaults
    #[arg(long, value_name = "PATH", env = "S3_UPLOAD_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Log debug output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    /// Merge command-line values over the settings file and validate the result
    pub fn into_invocation(self, settings: Settings) -> UploadResult<(UploadRequest, ClientSpec)> {
        let source = self
            .source
            .or(settings.source)
            .ok_or(UploadError::MissingParameter("source"))?;
        let bucket_name = self
            .bucket_name
            .or(settings.bucket_name)
            .ok_or(UploadError::MissingParameter("bucket-name"))?;
        let destination = self
            .destination
            .or(settings.destination)
            .ok_or(UploadError::MissingParameter("destination"))?;

        let endpoint_url = self.endpoint.or(settings.endpoint);
        if let Some(ref endpoint) = endpoint_url {
            url::Url::parse(endpoint).map_err(|e| UploadError::InvalidParameter {
                name: "endpoint",
                reason: format!("{}: {}", endpoint, e),
            })?;
        }

        let concurrency = self
            .concurrency
            .or(settings.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(UploadError::InvalidParameter {
                name: "concurrency",
                reason: "must be at least 1".to_string(),
            });
        }

        let access_key = self.access_key.or(settings.access_key);
        let secret_key = self.secret_key.or(settings.secret_key);
        let profile = self.profile.or(settings.profile);

        let request = UploadRequest {
            source,
            bucket_name,
            destination,
            recursive: self.recursive || settings.recursive.unwrap_or(false),
            dry_run: self.do_not_upload || settings.do_not_upload.unwrap_or(false),
            show_progress: self.show_progress.or(settings.show_progress).unwrap_or(true),
            concurrency,
        };

        let spec = ClientSpec {
            credentials: CredentialSpec::from_parts(
                access_key.as_deref(),
                secret_key.as_deref(),
                profile.as_deref(),
            ),
            endpoint: EndpointSpec {
                endpoint_url,
                region: self.region.or(settings.region),
            },
            force_path_style: self.force_path_style || settings.force_path_style.unwrap_or(false),
        };

        Ok((request, spec))
    }
}
