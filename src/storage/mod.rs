pub(crate) mod retry; // Backoff law and retry driver
pub(crate) mod s3_upload; // S3 transport and storage provider

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::errors::{AppError, Result, TransportError};

pub use retry::RetryPolicy;
pub use s3_upload::{S3Client, S3StorageProvider};

pub const DEFAULT_CONTENT_TYPE: &str = "application/gzip";

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Overrides [`DEFAULT_CONTENT_TYPE`].
    pub content_type: Option<String>,
}

/// Acknowledgement of a stored artifact, passed through to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub bucket: String,
    pub key: String,
    pub location: String,
    pub e_tag: Option<String>,
    pub version_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub key: String,
    pub delete_marker: Option<bool>,
    pub version_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub prefix: String,
    pub objects: Vec<StoredObject>,
}

/// Version marker returned by an object store for a write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectVersion {
    pub e_tag: Option<String>,
    pub version_id: Option<String>,
}

/// Durable home for backup artifacts.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn upload_file(&self, _path: &Path, _options: &UploadOptions) -> Result<UploadResult> {
        Err(AppError::NotImplemented("upload_file"))
    }

    async fn delete_file(&self, _key: &str) -> Result<DeleteResult> {
        Err(AppError::NotImplemented("delete_file"))
    }

    /// Lists stored artifacts under `prefix`; an empty prefix lists everything.
    async fn list_files(&self, _prefix: &str) -> Result<Listing> {
        Err(AppError::NotImplemented("list_files"))
    }
}

/// Raw object-store calls, one request each, without retries.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> std::result::Result<ObjectVersion, TransportError>;

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> std::result::Result<DeleteResult, TransportError>;

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> std::result::Result<Listing, TransportError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::retry::Sleeper;
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records requested delays instead of sleeping.
    #[derive(Default)]
    pub struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn delays(&self) -> Vec<Duration> {
            self.delays.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct PutCall {
        pub bucket: String,
        pub key: String,
        pub content_type: String,
        pub body: Vec<u8>,
    }

    /// Object store that replays scripted put outcomes, then succeeds.
    #[derive(Default)]
    pub struct ScriptedStore {
        script: Mutex<VecDeque<std::result::Result<ObjectVersion, TransportError>>>,
        puts: Mutex<Vec<PutCall>>,
        deletes: Mutex<Vec<(String, String)>>,
        listing: Vec<StoredObject>,
    }

    impl ScriptedStore {
        pub fn new(script: Vec<std::result::Result<ObjectVersion, TransportError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }

        pub fn with_listing(mut self, objects: Vec<StoredObject>) -> Self {
            self.listing = objects;
            self
        }

        pub fn put_calls(&self) -> usize {
            self.puts.lock().unwrap().len()
        }

        pub fn puts(&self) -> Vec<PutCall> {
            self.puts.lock().unwrap().clone()
        }

        pub fn deletes(&self) -> Vec<(String, String)> {
            self.deletes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ObjectStore for ScriptedStore {
        async fn put_object(
            &self,
            bucket: &str,
            key: &str,
            path: &Path,
            content_type: &str,
        ) -> std::result::Result<ObjectVersion, TransportError> {
            let body = std::fs::read(path).map_err(|e| TransportError::permanent(e.to_string()))?;
            self.puts.lock().unwrap().push(PutCall {
                bucket: bucket.to_string(),
                key: key.to_string(),
                content_type: content_type.to_string(),
                body,
            });
            self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
                Ok(ObjectVersion {
                    e_tag: Some("\"etag\"".to_string()),
                    version_id: None,
                })
            })
        }

        async fn delete_object(
            &self,
            bucket: &str,
            key: &str,
        ) -> std::result::Result<DeleteResult, TransportError> {
            self.deletes
                .lock()
                .unwrap()
                .push((bucket.to_string(), key.to_string()));
            Ok(DeleteResult {
                key: key.to_string(),
                delete_marker: None,
                version_id: None,
            })
        }

        async fn list_objects(
            &self,
            _bucket: &str,
            prefix: &str,
        ) -> std::result::Result<Listing, TransportError> {
            Ok(Listing {
                prefix: prefix.to_string(),
                objects: self
                    .listing
                    .iter()
                    .filter(|o| o.key.starts_with(prefix))
                    .cloned()
                    .collect(),
            })
        }
    }
}
