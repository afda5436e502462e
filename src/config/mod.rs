// mongobackup/src/config/mod.rs
pub mod decoder;
pub mod provider;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::backup::BackupOptions;
use crate::errors::{AppError, Result};
use crate::storage::RetryPolicy;

pub use provider::{ConfigProvider, EnvironmentConfigProvider};

// Well-known configuration keys
pub const MONGO_URI: &str = "MONGO_URI";
pub const AWS_S3_BUCKET_NAME: &str = "AWS_S3_BUCKET_NAME";
pub const AWS_REGION: &str = "AWS_REGION";
pub const AWS_S3_ENDPOINT_URL: &str = "AWS_S3_ENDPOINT_URL";
pub const AWS_S3_FOLDER_PREFIX: &str = "AWS_S3_FOLDER_PREFIX";
pub const BACKUP_TEMP_DIR: &str = "BACKUP_TEMP_DIR";
pub const BACKUP_TIMEOUT_MS: &str = "BACKUP_TIMEOUT_MS";
pub const BACKUP_EXCLUDE_COLLECTIONS: &str = "BACKUP_EXCLUDE_COLLECTIONS";
pub const BACKUP_PARALLEL_COLLECTIONS: &str = "BACKUP_PARALLEL_COLLECTIONS";
pub const UPLOAD_MAX_RETRIES: &str = "UPLOAD_MAX_RETRIES";
pub const UPLOAD_RETRY_BASE_MS: &str = "UPLOAD_RETRY_BASE_MS";
pub const MONGODUMP_PATH: &str = "MONGODUMP_PATH";

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_DUMP_PROGRAM: &str = "mongodump";

#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Absent bucket is tolerated here and reported by the first upload.
    pub bucket_name: Option<String>,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub folder_prefix: Option<String>,
    pub retry: RetryPolicy,
}

/// Application settings, validated once before any service is built.
#[derive(Debug, Clone)]
pub struct Settings {
    pub storage: StorageSettings,
    pub backup: BackupOptions,
    pub temp_dir: PathBuf,
    pub dump_program: String,
}

impl Settings {
    pub fn from_provider(config: &dyn ConfigProvider) -> Result<Self> {
        let defaults = BackupOptions::default();
        let backup = BackupOptions {
            timeout: parse_optional::<u64>(config, BACKUP_TIMEOUT_MS)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            exclude_collections: config
                .get(BACKUP_EXCLUDE_COLLECTIONS)
                .map(|raw| parse_list(&raw))
                .unwrap_or(defaults.exclude_collections),
            parallel_collections: parse_optional::<u32>(config, BACKUP_PARALLEL_COLLECTIONS)?
                .unwrap_or(defaults.parallel_collections),
        };
        if backup.timeout.is_zero() {
            return Err(AppError::Config(format!(
                "{} must be greater than 0",
                BACKUP_TIMEOUT_MS
            )));
        }
        if backup.parallel_collections == 0 {
            return Err(AppError::Config(format!(
                "{} must be at least 1",
                BACKUP_PARALLEL_COLLECTIONS
            )));
        }

        let retry_defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: parse_optional::<u32>(config, UPLOAD_MAX_RETRIES)?
                .unwrap_or(retry_defaults.max_retries),
            base_delay: parse_optional::<u64>(config, UPLOAD_RETRY_BASE_MS)?
                .map(Duration::from_millis)
                .unwrap_or(retry_defaults.base_delay),
        };

        let bucket_name = config.get(AWS_S3_BUCKET_NAME);
        if bucket_name.is_none() {
            warn!(
                "{} is not set; uploads will fail until it is configured",
                AWS_S3_BUCKET_NAME
            );
        }

        let storage = StorageSettings {
            bucket_name,
            region: config
                .get(AWS_REGION)
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint_url: config.get(AWS_S3_ENDPOINT_URL),
            folder_prefix: config
                .get(AWS_S3_FOLDER_PREFIX)
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
            retry,
        };

        Ok(Settings {
            storage,
            backup,
            temp_dir: config
                .get(BACKUP_TEMP_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            dump_program: config
                .get(MONGODUMP_PATH)
                .unwrap_or_else(|| DEFAULT_DUMP_PROGRAM.to_string()),
        })
    }
}

fn parse_optional<T>(config: &dyn ConfigProvider, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match config.get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::Config(format!("{} has invalid value '{}': {}", key, raw, e))),
        None => Ok(None),
    }
}

/// Parses a comma separated list, keeping order and duplicates.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
