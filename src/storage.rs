use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::presigning::PresigningConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// How long a presigned upload URL stays valid.
pub const UPLOAD_URL_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid presigning configuration: {0}")]
    Presigning(String),

    #[error("object storage request failed: {0}")]
    Request(String),
}

/// StorageService
///
/// Object storage for post images. Clients upload directly to the bucket through a
/// presigned URL; posts only keep the resulting object key.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the bucket if it is missing. Only used against local MinIO.
    async fn ensure_bucket_exists(&self) -> Result<(), StorageError>;

    /// A short-lived URL allowing a single PUT of `content_type` to `key`.
    async fn presign_image_upload(&self, key: &str, content_type: &str) -> Result<String, StorageError>;
}

/// S3StorageClient
///
/// AWS SDK client for any S3-compatible endpoint (MinIO locally).
/// Path-style addressing is forced for MinIO compatibility.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) -> Result<(), StorageError> {
        let exists = self
            .client
            .head_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
            .is_ok();
        if exists {
            return Ok(());
        }

        self.client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;
        tracing::info!(bucket = %self.bucket_name, "created media bucket");
        Ok(())
    }

    async fn presign_image_upload(&self, key: &str, content_type: &str) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(UPLOAD_URL_TTL)
            .map_err(|e| StorageError::Presigning(e.to_string()))?;

        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            // The signature covers the content type, so the upload must match it.
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }
}

/// Strips empty, `.` and `..` segments from a caller-influenced key.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// MockStorageService
///
/// Deterministic, offline [`StorageService`] for tests.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all operations fail.
    pub should_fail: bool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn presign_image_upload(&self, key: &str, _content_type: &str) -> Result<String, StorageError> {
        if self.should_fail {
            return Err(StorageError::Request("simulated storage failure".to_string()));
        }

        Ok(format!(
            "http://localhost:9000/mock-bucket/{}?signature=fake",
            sanitize_key(key)
        ))
    }
}

/// StorageState
///
/// The shared handle to object storage held in `AppState`.
pub type StorageState = Arc<dyn StorageService>;
