// mongobackup/src/backup/db_dump.rs
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::command::{archive_name, build_dump_command};
use super::{BackupOptions, BackupProvider, ConnectionDescriptor};
use crate::errors::{AppError, Result};
use crate::utils::{CommandExecutor, ExecOptions};

/// Backup provider that shells out to `mongodump` and writes a gzipped archive.
pub struct MongoDumpProvider {
    executor: Arc<dyn CommandExecutor>,
    options: BackupOptions,
    output_dir: PathBuf,
    program: String,
}

impl MongoDumpProvider {
    pub fn new(executor: Arc<dyn CommandExecutor>, options: BackupOptions) -> Self {
        Self {
            executor,
            options,
            output_dir: std::env::temp_dir(),
            program: "mongodump".to_string(),
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl BackupProvider for MongoDumpProvider {
    fn provider_name(&self) -> &'static str {
        "MongoDumpProvider"
    }

    async fn create_backup(&self, connection: &ConnectionDescriptor) -> Result<PathBuf> {
        let archive_path = self.output_dir.join(archive_name(Utc::now()));
        let command = build_dump_command(&self.program, connection, &archive_path, &self.options);

        if !self.executor.command_exists(&self.program).await {
            warn!("{} was not found in PATH; the dump will likely fail", self.program);
        }

        info!("Starting mongodump of {} to {}", connection, archive_path.display());
        if !self.options.exclude_collections.is_empty() {
            info!("Excluding collections: {:?}", self.options.exclude_collections);
        }

        if let Err(e) = self
            .executor
            .execute(&command, self.options.timeout, ExecOptions::default())
            .await
        {
            if e.is_timeout() {
                warn!("mongodump exceeded its {:?} budget and was killed", self.options.timeout);
            }
            remove_partial_archive(&archive_path).await;
            return Err(e.into());
        }

        match verify_archive(&archive_path).await {
            Ok(size) => {
                info!("Archive created at {} ({} bytes)", archive_path.display(), size);
                Ok(archive_path)
            }
            Err(e) => {
                remove_partial_archive(&archive_path).await;
                Err(e)
            }
        }
    }
}

/// Checks that the dump left a non-empty file behind; returns its size.
async fn verify_archive(path: &Path) -> Result<u64> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| {
        AppError::Artifact(format!(
            "mongodump produced no archive at {}: {}",
            path.display(),
            e
        ))
    })?;
    if !metadata.is_file() {
        return Err(AppError::Artifact(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    if metadata.len() == 0 {
        return Err(AppError::Artifact(format!(
            "mongodump created an empty file at {}",
            path.display()
        )));
    }
    Ok(metadata.len())
}

async fn remove_partial_archive(path: &Path) {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return;
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial archive {}", path.display()),
        Err(e) => warn!("Failed to remove partial archive {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProcessError;
    use crate::utils::executor::mock::MockExecutor;
    use crate::utils::CommandSpec;
    use crate::utils::executor::CommandOutput;
    use std::time::Duration;

    fn archive_arg(cmd: &CommandSpec) -> PathBuf {
        cmd.args
            .iter()
            .find_map(|a| a.strip_prefix("--archive="))
            .map(PathBuf::from)
            .expect("archive flag present")
    }

    fn ok_output() -> std::result::Result<CommandOutput, ProcessError> {
        Ok(CommandOutput {
            code: Some(0),
            ..Default::default()
        })
    }

    fn provider(executor: Arc<MockExecutor>, dir: &Path, excludes: &[&str]) -> MongoDumpProvider {
        let options = BackupOptions {
            exclude_collections: excludes.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_secs(30),
            ..Default::default()
        };
        MongoDumpProvider::new(executor, options).with_output_dir(dir)
    }

    #[tokio::test]
    async fn test_create_backup_returns_timestamped_archive() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let executor = Arc::new(MockExecutor::new(|cmd| {
            std::fs::write(archive_arg(cmd), b"archive-bytes").unwrap();
            ok_output()
        }));
        let provider = provider(executor.clone(), dir.path(), &["zipcodes"]);

        let path = provider
            .create_backup(&ConnectionDescriptor::new("mongodb://test"))
            .await?;

        assert_eq!(path.parent(), Some(dir.path()));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("mongodb-backup-"));
        assert!(name.ends_with("Z.gz"));
        assert!(!name.contains(':'));

        let calls = executor.get_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "mongodump");
        assert!(calls[0].args.contains(&"--uri=mongodb://test".to_string()));
        assert!(calls[0].args.contains(&"--excludeCollection=zipcodes".to_string()));
        assert_eq!(archive_arg(&calls[0]), path);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_archive_is_artifact_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let executor = Arc::new(MockExecutor::new(|cmd| {
            std::fs::write(archive_arg(cmd), b"").unwrap();
            ok_output()
        }));
        let provider = provider(executor.clone(), dir.path(), &[]);

        let err = provider
            .create_backup(&ConnectionDescriptor::new("mongodb://test"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Artifact(_)));
        assert!(err.to_string().contains("empty file"));
        let archive = archive_arg(&executor.get_calls()[0]);
        assert!(!archive.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_archive_is_artifact_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let executor = Arc::new(MockExecutor::succeeding());
        let provider = provider(executor, dir.path(), &[]);

        let err = provider
            .create_backup(&ConnectionDescriptor::new("mongodb://test"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Artifact(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_process_failure_propagates_and_removes_partial_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let executor = Arc::new(MockExecutor::new(|cmd| {
            std::fs::write(archive_arg(cmd), b"partial").unwrap();
            Err(ProcessError::Failed {
                code: Some(1),
                message: "auth failed".to_string(),
            })
        }));
        let provider = provider(executor.clone(), dir.path(), &[]);

        let err = provider
            .create_backup(&ConnectionDescriptor::new("mongodb://test"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Process(ProcessError::Failed { .. })));
        assert!(err.to_string().contains("auth failed"));
        assert!(!archive_arg(&executor.get_calls()[0]).exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_timeout_keeps_its_kind() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let executor = Arc::new(MockExecutor::new(|_| {
            Err(ProcessError::Timeout(Duration::from_secs(30)))
        }));
        let provider = provider(executor, dir.path(), &[]);

        let err = provider
            .create_backup(&ConnectionDescriptor::new("mongodb://test"))
            .await
            .unwrap_err();
        match err {
            AppError::Process(e) => assert!(e.is_timeout()),
            other => panic!("unexpected error: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_binary_still_attempts_dump() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let executor = Arc::new(
            MockExecutor::new(|_| {
                Err(ProcessError::Spawn(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "No such file or directory",
                )))
            })
            .without_binaries(),
        );
        let provider = provider(executor.clone(), dir.path(), &[]).with_program("mongodump-x");

        let err = provider
            .create_backup(&ConnectionDescriptor::new("mongodb://test"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Process(ProcessError::Spawn(_))));
        assert_eq!(executor.get_calls()[0].program, "mongodump-x");
        Ok(())
    }
}
