//! Log setup shared by the Crosscast binaries.
//!
//! All log output goes to stderr so command output stays pipeable. The
//! format comes from `CROSSCAST_LOG_FORMAT` (text, json, or pretty); the
//! level from `CROSSCAST_LOG_LEVEL` or `RUST_LOG`, with a per-binary
//! fallback.

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain text, no colors. The default.
    Text,
    /// One JSON object per line, for log shippers.
    Json,
    /// Multi-line colored output for development.
    Pretty,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Pretty => "pretty",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(format!(
                "unknown log format '{}' (expected text, json, or pretty)",
                other
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Install the global subscriber. Call once, before any log line.
///
/// `fallback_level` applies only when neither `RUST_LOG` nor
/// `CROSSCAST_LOG_LEVEL` is set.
///
/// # Panics
///
/// Panics if a subscriber is already installed.
pub fn init(format: LogFormat, fallback_level: &str) {
    let level = std::env::var("CROSSCAST_LOG_LEVEL").unwrap_or_else(|_| fallback_level.to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .init(),
        LogFormat::Pretty => builder.pretty().with_file(true).with_line_number(true).init(),
        LogFormat::Text => builder.with_target(false).init(),
    }
}

/// Setup for the short-lived CLIs: errors only unless `--verbose`.
pub fn init_cli(verbose: bool) {
    init(format_from_env(), if verbose { "debug" } else { "error" });
}

/// Setup for the daemon: info by default so the poll loop is visible.
pub fn init_daemon(verbose: bool) {
    init(format_from_env(), if verbose { "debug" } else { "info" });
}

fn format_from_env() -> LogFormat {
    std::env::var("CROSSCAST_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LogFormat::Text)
}
