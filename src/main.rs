//! MongoDB Backup Tool
//!
//! Dumps a MongoDB deployment with `mongodump` and ships the archive to S3.

// mongobackup/src/main.rs
mod backup;
mod config;
mod errors;
mod handler;
mod logging;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;

use backup::{BackupService, MongoDumpProvider};
use config::{ConfigProvider, EnvironmentConfigProvider, Settings};
use storage::{S3Client, S3StorageProvider, StorageProvider};
use utils::{CommandExecutor, TokioExecutor};

#[derive(Parser)]
#[command(name = "mongobackup")]
#[command(about = "Back up MongoDB to S3 with mongodump", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump the database, upload the archive and remove the local copy (default)
    Run,
    /// List stored backups
    List {
        /// Only list keys starting with this prefix
        #[arg(long, default_value = "")]
        prefix: String,
    },
    /// Delete a stored backup by key
    Delete { key: String },
    /// Check that the dump tool is available
    Check,
}

struct App {
    settings: Settings,
    config: Arc<dyn ConfigProvider>,
    executor: Arc<dyn CommandExecutor>,
    storage: Arc<dyn StorageProvider>,
}

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    logging::init_logging();
    let cli = Cli::parse();

    match run_app(cli.command.unwrap_or(Commands::Run)).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(command: Commands) -> Result<bool> {
    let config = Arc::new(EnvironmentConfigProvider::load());
    let settings = if matches!(command, Commands::Run) {
        match handler::settings_for_invocation(config.as_ref()) {
            Ok(settings) => settings,
            Err(failure) => {
                print_json(&failure)?;
                return Ok(false);
            }
        }
    } else {
        Settings::from_provider(config.as_ref()).context("Failed to load configuration")?
    };
    let app = build_app(config, settings).await;

    match command {
        Commands::Run => {
            let backup_provider = MongoDumpProvider::new(app.executor.clone(), app.settings.backup.clone())
                .with_output_dir(&app.settings.temp_dir)
                .with_program(&app.settings.dump_program);
            let service = BackupService::new(Arc::new(backup_provider), app.storage, app.config);

            let result = handler::run_invocation(&service).await;
            print_json(&result)?;
            Ok(result.is_success())
        }
        Commands::List { prefix } => {
            let listing = app
                .storage
                .list_files(&prefix)
                .await
                .context("Failed to list backups")?;
            print_json(&listing)?;
            Ok(true)
        }
        Commands::Delete { key } => {
            let deleted = app
                .storage
                .delete_file(&key)
                .await
                .with_context(|| format!("Failed to delete {}", key))?;
            print_json(&deleted)?;
            Ok(true)
        }
        Commands::Check => {
            let program = &app.settings.dump_program;
            let found = app.executor.command_exists(program).await;
            if found {
                println!("{} is available", program);
            } else {
                println!("{} was not found on PATH", program);
            }
            Ok(found)
        }
    }
}

async fn build_app(config: Arc<dyn ConfigProvider>, settings: Settings) -> App {
    let client = S3Client::from_settings(&settings.storage).await;
    let storage = S3StorageProvider::new(
        Arc::new(client),
        settings.storage.bucket_name.clone(),
        settings.storage.retry,
    )
    .with_folder_prefix(settings.storage.folder_prefix.clone());

    App {
        settings,
        config,
        executor: Arc::new(TokioExecutor::new()),
        storage: Arc::new(storage),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}
