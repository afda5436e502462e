pub mod executor;

use anyhow::{Context, Result};
use std::path::PathBuf;
use which::which;

pub use executor::{CommandExecutor, CommandSpec, ExecOptions, TokioExecutor};

/// Finds an executable in the system PATH.
pub fn find_executable(name: &str) -> Result<PathBuf> {
    which(name).with_context(|| format!("{} executable not found in PATH", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_find_executable_locates_shell() {
        assert!(find_executable("sh").is_ok());
    }

    #[test]
    fn test_find_executable_reports_missing_binary() {
        let err = find_executable("definitely-not-a-real-binary-4711").unwrap_err();
        assert!(err.to_string().contains("not found in PATH"));
    }
}
