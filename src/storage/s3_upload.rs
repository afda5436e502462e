// mongobackup/src/storage/s3_upload.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use chrono::{DateTime, Utc};
use s3::config::Region;
use s3::config::http::HttpResponse;
use s3::config::retry::RetryConfig;
use s3::error::{DisplayErrorContext, SdkError};
use s3::primitives::ByteStream;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::retry::{RetryExhausted, RetryPolicy, Sleeper, TokioSleeper, retry_with_backoff};
use super::{
    DEFAULT_CONTENT_TYPE, DeleteResult, Listing, ObjectStore, ObjectVersion, StorageProvider,
    StoredObject, UploadOptions, UploadResult,
};
use crate::config::{AWS_S3_BUCKET_NAME, StorageSettings};
use crate::errors::{AppError, Result, TransportError};

/// Thin wrapper over the AWS S3 client (also works with S3-compatible stores
/// such as DigitalOcean Spaces or MinIO).
#[derive(Debug, Clone)]
pub struct S3Client {
    client: s3::Client,
}

impl S3Client {
    /// Builds a client from the default AWS config chain.
    ///
    /// The SDK's own retry layer is disabled; [`S3StorageProvider`] owns retries.
    pub async fn from_settings(settings: &StorageSettings) -> Self {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));
        if let Some(endpoint) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = s3::config::Builder::from(&sdk_config)
            .retry_config(RetryConfig::disabled())
            .force_path_style(settings.endpoint_url.is_some())
            .build();

        Self {
            client: s3::Client::from_conf(s3_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> std::result::Result<ObjectVersion, TransportError> {
        // Opened per attempt; the handle is released when the body is dropped.
        let body = ByteStream::from_path(path).await.map_err(|e| {
            TransportError::permanent(format!(
                "Failed to create ByteStream from file {}: {}",
                path.display(),
                e
            ))
        })?;

        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(transport_error)?;

        Ok(ObjectVersion {
            e_tag: output.e_tag().map(str::to_string),
            version_id: output.version_id().map(str::to_string),
        })
    }

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> std::result::Result<DeleteResult, TransportError> {
        let output = self
            .client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(transport_error)?;

        Ok(DeleteResult {
            key: key.to_string(),
            delete_marker: output.delete_marker(),
            version_id: output.version_id().map(str::to_string),
        })
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> std::result::Result<Listing, TransportError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_prefix((!prefix.is_empty()).then(|| prefix.to_string()))
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(transport_error)?;

            objects.extend(output.contents().iter().map(|object| StoredObject {
                key: object.key().unwrap_or_default().to_string(),
                size: object.size().unwrap_or(0).max(0) as u64,
                last_modified: object
                    .last_modified()
                    .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())),
            }));

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(Listing {
            prefix: prefix.to_string(),
            objects,
        })
    }
}

/// Converts an SDK error, marking network-level failures, throttling and 5xx
/// responses as transient.
fn transport_error<E>(err: SdkError<E, HttpResponse>) -> TransportError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let retryable = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => true,
        SdkError::ServiceError(context) => is_retryable_status(context.raw().status().as_u16()),
        _ => false,
    };
    TransportError {
        message: DisplayErrorContext(&err).to_string(),
        retryable,
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Storage provider that uploads artifacts to an S3 bucket with bounded
/// retries and exponential backoff.
pub struct S3StorageProvider {
    store: Arc<dyn ObjectStore>,
    bucket_name: Option<String>,
    folder_prefix: Option<String>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl S3StorageProvider {
    /// A missing bucket is accepted here; operations report it when first used.
    pub fn new(store: Arc<dyn ObjectStore>, bucket_name: Option<String>, retry: RetryPolicy) -> Self {
        Self {
            store,
            bucket_name,
            folder_prefix: None,
            retry,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_folder_prefix(mut self, folder_prefix: Option<String>) -> Self {
        self.folder_prefix = folder_prefix;
        self
    }

    #[allow(dead_code)]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn bucket(&self) -> Result<&str> {
        self.bucket_name
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                AppError::Config(format!(
                    "S3 bucket name is not configured ({} is missing)",
                    AWS_S3_BUCKET_NAME
                ))
            })
    }

    fn object_key(&self, path: &Path) -> Result<String> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                AppError::Artifact(format!("Invalid artifact file name: {}", path.display()))
            })?;
        Ok(match &self.folder_prefix {
            Some(prefix) => format!("{}/{}", prefix, file_name),
            None => file_name.to_string(),
        })
    }
}

/// Fails unless `path` is an existing, non-empty file; returns its size.
async fn check_upload_source(path: &Path) -> Result<u64> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::Artifact(format!("File not found: {}", path.display())));
        }
        Err(e) => return Err(e.into()),
    };
    if metadata.len() == 0 {
        return Err(AppError::Artifact(format!("File is empty: {}", path.display())));
    }
    Ok(metadata.len())
}

#[async_trait]
impl StorageProvider for S3StorageProvider {
    fn provider_name(&self) -> &'static str {
        "S3StorageProvider"
    }

    async fn upload_file(&self, path: &Path, options: &UploadOptions) -> Result<UploadResult> {
        let bucket = self.bucket()?;
        let size = check_upload_source(path).await?;
        let key = self.object_key(path)?;
        let content_type = options.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);

        info!(
            "Uploading {} ({} bytes) to s3://{}/{}",
            path.display(),
            size,
            bucket,
            key
        );

        let key_ref = key.as_str();
        let label = format!("upload {}", key);
        let version = retry_with_backoff(&self.retry, self.sleeper.as_ref(), &label, |_| {
            self.store.put_object(bucket, key_ref, path, content_type)
        })
        .await
        .map_err(|exhausted: RetryExhausted| {
            error!(
                "Failed to upload {} after {} attempts",
                key_ref, exhausted.attempts
            );
            AppError::Upload {
                attempts: exhausted.attempts,
                source: exhausted.error,
            }
        })?;

        let location = format!("s3://{}/{}", bucket, key);
        info!("Successfully uploaded to {}", location);
        Ok(UploadResult {
            bucket: bucket.to_string(),
            key,
            location,
            e_tag: version.e_tag,
            version_id: version.version_id,
        })
    }

    async fn delete_file(&self, key: &str) -> Result<DeleteResult> {
        let bucket = self.bucket()?;
        debug!("Deleting s3://{}/{}", bucket, key);
        Ok(self.store.delete_object(bucket, key).await?)
    }

    async fn list_files(&self, prefix: &str) -> Result<Listing> {
        let bucket = self.bucket()?;
        debug!("Listing s3://{}/{}", bucket, prefix);
        Ok(self.store.list_objects(bucket, prefix).await?)
    }
}
