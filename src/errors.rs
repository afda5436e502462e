use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Backup artifact error: {0}")]
    Artifact(String),

    #[error("Upload failed after {attempts} attempts: {source}")]
    Upload {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("Storage operation failed: {0}")]
    Storage(#[from] TransportError),

    #[error("Cleanup failed: {0}")]
    Cleanup(String),

    #[error("{0} is not implemented by this provider")]
    NotImplemented(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of an external process run through the command executor.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Command execution error: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Command failed: {message}")]
    Failed { code: Option<i32>, message: String },

    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Command output exceeded {limit} bytes")]
    OutputLimit { limit: usize },

    #[error("Failed to wait for command: {0}")]
    Wait(#[source] std::io::Error),
}

impl ProcessError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessError::Timeout(_))
    }
}

/// Error reported by an object-store transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub retryable: bool,
}

impl TransportError {
    #[allow(dead_code)]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
