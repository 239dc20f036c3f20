//! Structured logging setup
//!
//! Logs are JSON lines on stderr so that stdout stays free for the stdio
//! MCP transport. `RUST_LOG` wins when set, otherwise `LOG_LEVEL` picks
//! the level (default `info`).

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable selecting the log level
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

const DEFAULT_LEVEL: &str = "info";

/// Map a `LOG_LEVEL` value to a filter directive
///
/// Unknown or empty values fall back to `info`.
pub fn level_directive(level: Option<&str>) -> &'static str {
    match level.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
        Some("debug") => "debug",
        Some("info") => "info",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        Some("trace") => "trace",
        _ => DEFAULT_LEVEL,
    }
}

/// Initialize the global tracing subscriber
///
/// `verbose` forces the `debug` level unless `RUST_LOG` is set.
///
/// # Errors
///
/// Returns an error if a subscriber was already installed
pub fn init_logging(verbose: bool) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = if verbose {
                "debug"
            } else {
                level_directive(std::env::var(LOG_LEVEL_ENV).ok().as_deref())
            };
            EnvFilter::try_new(level)?
        }
    };

    let stderr_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init()?;

    Ok(())
}
