// mongobackup/src/logging.rs
use tracing_subscriber::EnvFilter;

/// Set `LOG_FORMAT=json` for one JSON object per line.
pub const LOG_FORMAT: &str = "LOG_FORMAT";

/// Initializes stderr logging. `RUST_LOG` overrides the default `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json_requested(std::env::var(LOG_FORMAT).ok().as_deref()) {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn json_requested(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("json"))
}
