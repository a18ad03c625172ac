//! AWS S3 client resolution and wrapper

use crate::error::{UploadError, UploadResult};
use crate::s3::credentials::{CredentialSpec, ProfileStore};
use crate::s3::multipart::MIN_PART_SIZE;
use crate::s3::store::ObjectStore;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use std::path::Path;

/// Provider name attached to caller-supplied static credentials
pub const EXPLICIT_PROVIDER_NAME: &str = "s3-upload-explicit";

/// Region used when neither the caller nor the ambient chain names one
const FALLBACK_REGION: &str = "us-east-1";

/// Files of at least this size go out as multipart uploads
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 16 * 1024 * 1024;

const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Optional endpoint and region overrides
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSpec {
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
}

/// Everything needed to build a client
#[derive(Debug, Clone)]
pub struct ClientSpec {
    pub credentials: CredentialSpec,
    pub endpoint: EndpointSpec,
    /// Path-style addressing, required by MinIO and LocalStack
    pub force_path_style: bool,
}

impl Default for ClientSpec {
    fn default() -> Self {
        Self {
            credentials: CredentialSpec::Default,
            endpoint: EndpointSpec::default(),
            force_path_style: false,
        }
    }
}

/// Turns a [`ClientSpec`] into a configured [`S3Client`].
///
/// Resolution never fails on its own: bad credentials only show up once the
/// client talks to the service.
#[derive(Default)]
pub struct ClientResolver {
    profiles: Option<ProfileStore>,
}

impl ClientResolver {
    /// Resolver that reads profiles from the ambient AWS files
    pub fn new() -> Self {
        Self { profiles: None }
    }

    /// Resolver that resolves named profiles from the given store's files
    pub fn with_profile_store(profiles: ProfileStore) -> Self {
        Self {
            profiles: Some(profiles),
        }
    }

    pub async fn resolve(&self, spec: &ClientSpec) -> S3Client {
        tracing::debug!(
            "Resolving S3 client: credentials={}, endpoint={:?}, region={:?}",
            spec.credentials.as_str(),
            spec.endpoint.endpoint_url,
            spec.endpoint.region
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        match &spec.credentials {
            CredentialSpec::ExplicitKeys {
                access_key,
                secret_key,
            } => {
                let credentials = Credentials::new(
                    access_key,
                    secret_key,
                    None,
                    None,
                    EXPLICIT_PROVIDER_NAME,
                );
                loader = loader.credentials_provider(credentials);
            }
            CredentialSpec::NamedProfile(name) => {
                loader = loader.credentials_provider(self.profile_provider(name));
            }
            CredentialSpec::Default => {}
        }

        // An explicit region pins the client; otherwise the default chain is
        // consulted now, which also gives a custom endpoint its signing region.
        let region_provider = RegionProviderChain::first_try(spec.endpoint.region.clone().map(Region::new))
            .or_default_provider()
            .or_else(Region::from_static(FALLBACK_REGION));
        loader = loader.region(region_provider);

        let sdk_config = loader.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &spec.endpoint.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }
        if spec.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());
        let current_region = sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| FALLBACK_REGION.to_string());

        tracing::debug!("S3 client resolved for region {}", current_region);

        S3Client {
            client,
            current_region,
            credentials_provider: sdk_config.credentials_provider(),
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            part_size: DEFAULT_PART_SIZE,
        }
    }

    fn profile_provider(&self, name: &str) -> ProfileFileCredentialsProvider {
        let mut builder = ProfileFileCredentialsProvider::builder().profile_name(name);

        match &self.profiles {
            Some(store) => {
                store.check_profile(name);
                if let Some(files) = store.profile_files() {
                    builder = builder.profile_files(files);
                }
            }
            None => match ProfileStore::new() {
                Ok(store) => store.check_profile(name),
                Err(e) => tracing::debug!("Could not read AWS profile files: {:#}", e),
            },
        }

        builder.build()
    }
}

pub(super) fn storage_error<E: std::error::Error>(err: E) -> UploadError {
    UploadError::Storage(DisplayErrorContext(err).to_string())
}

/// A modeled `NotFound` or a bare 404 (HEAD responses carry no error body)
fn is_not_found<E>(err: &SdkError<E, HttpResponse>, modeled: impl Fn(&E) -> bool) -> bool {
    err.as_service_error().map(modeled).unwrap_or(false)
        || err
            .raw_response()
            .map(|r| r.status().as_u16() == 404)
            .unwrap_or(false)
}

/// S3 client wrapper with high-level operations
pub struct S3Client {
    pub(super) client: Client,
    current_region: String,
    credentials_provider: Option<SharedCredentialsProvider>,
    multipart_threshold: u64,
    pub(super) part_size: u64,
}

impl S3Client {
    /// Send files of at least `threshold` bytes as multipart uploads with
    /// parts of `part_size` bytes. Part sizes below the S3 minimum are raised.
    pub fn with_multipart(mut self, threshold: u64, part_size: u64) -> Self {
        self.multipart_threshold = threshold;
        self.part_size = part_size.max(MIN_PART_SIZE);
        self
    }

    /// Get the current region
    pub fn region(&self) -> &str {
        &self.current_region
    }

    /// Resolve the credentials this client signs requests with
    pub async fn credentials(&self) -> UploadResult<Credentials> {
        let provider = self
            .credentials_provider
            .as_ref()
            .ok_or_else(|| UploadError::Storage("No credentials provider configured".to_string()))?;

        provider.provide_credentials().await.map_err(storage_error)
    }

    /// Create a bucket
    pub async fn create_bucket(&self, bucket: &str) -> UploadResult<()> {
        self.client
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(storage_error)?;

        Ok(())
    }

    /// Check whether an object exists; 404 means it does not
    pub async fn object_exists(&self, bucket: &str, key: &str) -> UploadResult<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err) if is_not_found(&err, |e| e.is_not_found()) => Ok(false),
            Err(err) => Err(storage_error(err)),
        }
    }

    /// ETag of an object; multipart objects carry a `-<parts>` suffix
    pub async fn object_etag(&self, bucket: &str, key: &str) -> UploadResult<Option<String>> {
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(storage_error)?;

        Ok(response.e_tag().map(|t| t.trim_matches('"').to_string()))
    }

    /// Download an object to bytes
    pub async fn get_object(&self, bucket: &str, key: &str) -> UploadResult<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(storage_error)?;

        let data = response.body.collect().await.map_err(storage_error)?;
        Ok(data.into_bytes().to_vec())
    }

    /// List every key under a prefix
    pub async fn list_keys(&self, bucket: &str, prefix: &str) -> UploadResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(storage_error)?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(|k| k.to_string())),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn bucket_exists(&self, bucket: &str) -> UploadResult<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) if is_not_found(&err, |e| e.is_not_found()) => Ok(false),
            Err(err) => Err(storage_error(err)),
        }
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        acl: ObjectCannedAcl,
    ) -> UploadResult<u64> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|source| UploadError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        if size > 0 && size >= self.multipart_threshold {
            self.put_file_multipart(bucket, key, path, size, acl).await?;
            tracing::debug!(
                "Uploaded {:?} to s3://{}/{} in parts ({} bytes)",
                path,
                bucket,
                key,
                size
            );
            return Ok(size);
        }

        let body = ByteStream::from_path(path).await.map_err(storage_error)?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .acl(acl)
            .body(body)
            .send()
            .await
            .map_err(storage_error)?;

        tracing::debug!("Uploaded {:?} to s3://{}/{} ({} bytes)", path, bucket, key, size);

        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_explicit_keys_are_applied() {
        let spec = ClientSpec {
            credentials: CredentialSpec::ExplicitKeys {
                access_key: "TEST_ACCESS_KEY_ID".to_string(),
                secret_key: "TEST_SECRET_KEY".to_string(),
            },
            endpoint: EndpointSpec {
                endpoint_url: None,
                region: Some("eu-central-1".to_string()),
            },
            force_path_style: false,
        };

        let client = ClientResolver::new().resolve(&spec).await;
        let creds = client.credentials().await.unwrap();
        assert_eq!(creds.access_key_id(), "TEST_ACCESS_KEY_ID");
        assert_eq!(creds.secret_access_key(), "TEST_SECRET_KEY");
    }

    #[tokio::test]
    async fn test_explicit_keys_override_profile_files() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config");
        let credentials_path = dir.path().join("credentials");
        fs::write(&config_path, "[profile ci]\nregion = us-west-2\n").unwrap();
        fs::write(
            &credentials_path,
            "[ci]\naws_access_key_id = DIFFERENT_ACCESS_KEY_ID\naws_secret_access_key = DIFFERENT_SECRET_KEY\n",
        )
        .unwrap();
        let store = ProfileStore::with_files(&config_path, &credentials_path).unwrap();

        let spec = ClientSpec {
            credentials: CredentialSpec::from_parts(
                Some("TEST_ACCESS_KEY_ID"),
                Some("TEST_SECRET_KEY"),
                Some("ci"),
            ),
            endpoint: EndpointSpec {
                endpoint_url: None,
                region: Some("us-east-1".to_string()),
            },
            force_path_style: false,
        };

        let client = ClientResolver::with_profile_store(store).resolve(&spec).await;
        let creds = client.credentials().await.unwrap();
        assert_eq!(creds.access_key_id(), "TEST_ACCESS_KEY_ID");
    }

    #[tokio::test]
    async fn test_named_profile_credentials() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config");
        let credentials_path = dir.path().join("credentials");
        fs::write(&config_path, "[profile ci]\nregion = us-west-2\n").unwrap();
        fs::write(
            &credentials_path,
            "[ci]\naws_access_key_id = PROFILE_KEY\naws_secret_access_key = PROFILE_SECRET\n",
        )
        .unwrap();
        let store = ProfileStore::with_files(&config_path, &credentials_path).unwrap();

        let spec = ClientSpec {
            credentials: CredentialSpec::NamedProfile("ci".to_string()),
            endpoint: EndpointSpec {
                endpoint_url: None,
                region: Some("us-east-1".to_string()),
            },
            force_path_style: false,
        };

        let client = ClientResolver::with_profile_store(store).resolve(&spec).await;
        let creds = client.credentials().await.unwrap();
        assert_eq!(creds.access_key_id(), "PROFILE_KEY");
        assert_eq!(creds.secret_access_key(), "PROFILE_SECRET");
    }

    /// Serializes tests that change the ambient AWS region
    static AMBIENT_REGION: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

    fn endpoint_spec(region: Option<&str>) -> ClientSpec {
        ClientSpec {
            credentials: CredentialSpec::from_parts(Some("A"), Some("B"), None),
            endpoint: EndpointSpec {
                endpoint_url: Some("http://localhost:9000".to_string()),
                region: region.map(|r| r.to_string()),
            },
            force_path_style: true,
        }
    }

    #[tokio::test]
    async fn test_explicit_region_is_pinned() {
        let _guard = AMBIENT_REGION.lock().await;
        std::env::set_var("AWS_REGION", "eu-west-3");

        let client = ClientResolver::new()
            .resolve(&endpoint_spec(Some("ap-southeast-2")))
            .await;

        std::env::remove_var("AWS_REGION");
        assert_eq!(client.region(), "ap-southeast-2");
    }

    #[tokio::test]
    async fn test_endpoint_without_region_uses_ambient_region() {
        let _guard = AMBIENT_REGION.lock().await;
        std::env::set_var("AWS_REGION", "eu-west-3");

        let client = ClientResolver::new().resolve(&endpoint_spec(None)).await;

        std::env::remove_var("AWS_REGION");
        assert_eq!(client.region(), "eu-west-3");
    }

    #[tokio::test]
    async fn test_multipart_part_size_has_a_floor() {
        let client = ClientResolver::new()
            .resolve(&endpoint_spec(Some("us-east-1")))
            .await
            .with_multipart(1024, 1);

        assert_eq!(client.multipart_threshold, 1024);
        assert_eq!(client.part_size, MIN_PART_SIZE);
    }
}
