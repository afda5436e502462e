// mongobackup/src/handler.rs
//! Invocation entry point: runs one backup, shapes the result and removes the
//! local artifact afterwards.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::backup::BackupService;
use crate::config::{ConfigProvider, Settings};
use crate::errors::AppError;

pub const SUCCESS_MESSAGE: &str = "Backup completed successfully";
pub const FAILURE_MESSAGE: &str = "Backup operation failed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub status_code: u16,
    pub body: InvocationBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum InvocationBody {
    #[serde(rename_all = "camelCase")]
    Success { message: String, backup_file: PathBuf },
    Failure { message: String, error: String },
}

impl InvocationResult {
    pub fn success(backup_file: PathBuf) -> Self {
        Self {
            status_code: 200,
            body: InvocationBody::Success {
                message: SUCCESS_MESSAGE.to_string(),
                backup_file,
            },
        }
    }

    /// Carries only the error's display text; connection strings never reach
    /// error messages unredacted.
    pub fn failure(err: &AppError) -> Self {
        Self {
            status_code: 500,
            body: InvocationBody::Failure {
                message: FAILURE_MESSAGE.to_string(),
                error: err.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Validates settings for a run. Invalid configuration is reported as the
/// failure payload instead of aborting the invocation.
pub fn settings_for_invocation(config: &dyn ConfigProvider) -> Result<Settings, InvocationResult> {
    Settings::from_provider(config).map_err(|e| {
        error!("Invalid configuration: {}", e);
        InvocationResult::failure(&e)
    })
}

/// Runs one backup and always attempts to remove the local artifact.
pub async fn run_invocation(service: &BackupService) -> InvocationResult {
    info!("Starting backup process");
    let run = service.run().await;

    let result = match &run.outcome {
        Ok(path) => {
            info!("{}", SUCCESS_MESSAGE);
            InvocationResult::success(path.clone())
        }
        Err(e) => {
            error!("Backup failed: {}", e);
            InvocationResult::failure(e)
        }
    };

    if let Some(artifact) = &run.artifact {
        if let Err(e) = cleanup_artifact(artifact).await {
            warn!("{}", e);
        }
    }
    result
}

/// Removes `path` if it still exists.
pub async fn cleanup_artifact(path: &Path) -> Result<bool, AppError> {
    match tokio::fs::try_exists(path).await {
        Ok(true) => {}
        Ok(false) => return Ok(false),
        Err(e) => {
            return Err(AppError::Cleanup(format!(
                "Could not check {}: {}",
                path.display(),
                e
            )));
        }
    }
    tokio::fs::remove_file(path).await.map_err(|e| {
        AppError::Cleanup(format!("Could not remove {}: {}", path.display(), e))
    })?;
    info!("Temporary file removed: {}", path.display());
    Ok(true)
}
