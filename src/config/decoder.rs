// mongobackup/src/config/decoder.rs
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, warn};

/// Keys whose values are stored as plain text rather than base64.
pub const PLAIN_TEXT_VARIABLES: &[&str] = &[
    "AWS_REGION",
    "AWS_S3_ENDPOINT_URL",
    "AWS_S3_FOLDER_PREFIX",
    "BACKUP_TEMP_DIR",
    "BACKUP_TIMEOUT_MS",
    "BACKUP_EXCLUDE_COLLECTIONS",
    "BACKUP_PARALLEL_COLLECTIONS",
    "UPLOAD_MAX_RETRIES",
    "UPLOAD_RETRY_BASE_MS",
    "MONGODUMP_PATH",
];

pub fn is_plain_text(name: &str) -> bool {
    PLAIN_TEXT_VARIABLES.contains(&name)
}

/// Decodes a raw environment value.
///
/// Empty values are treated as unset. A value that is not valid base64 (or
/// does not decode to UTF-8) is returned unchanged.
pub fn decode_environment_variable(name: &str, value: Option<&str>, decode: bool) -> Option<String> {
    let value = value.filter(|v| !v.is_empty())?;

    if !decode || is_plain_text(name) {
        return Some(value.to_string());
    }

    let decoded = STANDARD
        .decode(value.trim())
        .map_err(|e| e.to_string())
        .and_then(|bytes| String::from_utf8(bytes).map_err(|e| e.to_string()));

    match decoded {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Failed to decode {}, returning raw value", name);
            debug!("Error decoding {}: {}", name, e);
            Some(value.to_string())
        }
    }
}
