// mongobackup/src/backup/command.rs
use chrono::{DateTime, Utc};
use std::path::Path;

use super::{BackupOptions, ConnectionDescriptor};
use crate::utils::CommandSpec;

pub const ARCHIVE_PREFIX: &str = "mongodb-backup-";
pub const ARCHIVE_EXTENSION: &str = ".gz";

/// Builds a filesystem-safe archive name from `at`.
///
/// The ISO-8601 timestamp has `:` and `.` replaced with `-`, so names sort in
/// creation order, e.g. `mongodb-backup-2024-03-01T02-00-00-123Z.gz`.
pub fn archive_name(at: DateTime<Utc>) -> String {
    let timestamp = at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
    format!(
        "{}{}{}",
        ARCHIVE_PREFIX,
        timestamp.replace([':', '.'], "-"),
        ARCHIVE_EXTENSION
    )
}

/// Builds the mongodump invocation for one archive.
///
/// One `--excludeCollection` flag is emitted per configured entry, in order.
pub fn build_dump_command(
    program: &str,
    connection: &ConnectionDescriptor,
    archive_path: &Path,
    options: &BackupOptions,
) -> CommandSpec {
    let mut tail = vec![
        format!("--archive={}", archive_path.display()),
        "--gzip".to_string(),
        format!("--numParallelCollections={}", options.parallel_collections),
        "--readPreference=secondary".to_string(),
    ];
    tail.extend(
        options
            .exclude_collections
            .iter()
            .map(|collection| format!("--excludeCollection={}", collection)),
    );

    let shown = format!(
        "{} --uri=\"{}\" {}",
        program,
        connection.redacted(),
        tail.join(" ")
    );

    // No shell is involved, so the URI is passed without quoting.
    CommandSpec::new(program)
        .arg(format!("--uri={}", connection.expose()))
        .args(tail)
        .with_redacted(shown)
}
