pub(crate) mod command; // Archive naming and dump command line
pub(crate) mod db_dump; // mongodump-backed provider
mod logic; // Orchestration

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::errors::{AppError, Result};

pub use db_dump::MongoDumpProvider;
pub use logic::BackupService;

/// Opaque connection string for the source data store.
///
/// `Debug` and `Display` only ever show the redacted form.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor(String);

impl ConnectionDescriptor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// The descriptor with any password masked, or `<redacted>` when it cannot
    /// be parsed as a URL.
    pub fn redacted(&self) -> String {
        match Url::parse(&self.0) {
            Ok(mut url) => {
                if url.password().is_some() && url.set_password(Some("****")).is_err() {
                    return "<redacted>".to_string();
                }
                url.set_query(None);
                url.to_string()
            }
            Err(_) => "<redacted>".to_string(),
        }
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionDescriptor")
            .field(&self.redacted())
            .finish()
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Options for a single dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOptions {
    pub timeout: Duration,
    /// Collections to omit, in order; duplicates are passed through.
    pub exclude_collections: Vec<String>,
    pub parallel_collections: u32,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(600_000),
            exclude_collections: Vec::new(),
            parallel_collections: 2,
        }
    }
}

/// Produces a local archive of a remote data store.
#[async_trait]
pub trait BackupProvider: Send + Sync {
    /// Name used in logs and diagnostics.
    fn provider_name(&self) -> &'static str;

    /// Dumps the store behind `connection` and returns the path of a
    /// non-empty local archive.
    async fn create_backup(&self, _connection: &ConnectionDescriptor) -> Result<PathBuf> {
        Err(AppError::NotImplemented("create_backup"))
    }
}
