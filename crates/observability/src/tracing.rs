//! Tracing/logging initialization.
//!
//! Engine spans and events are emitted through `tracing`; this module only
//! installs the subscriber. Audit entries and alert notifications use their own
//! targets (`audit`, `notifications`) so they can be filtered separately.

use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line (production).
    #[default]
    Json,
    /// Human-readable, colored output (local runs).
    Pretty,
}

#[derive(Debug, Error)]
#[error("unknown log format '{0}' (expected json or pretty)")]
pub struct UnknownLogFormat(String);

impl core::str::FromStr for LogFormat {
    type Err = UnknownLogFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(UnknownLogFormat(other.to_string())),
        }
    }
}

/// Initialize tracing/logging for the process with JSON output.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    init_with(LogFormat::Json, "info");
}

/// Initialize with an explicit format and fallback filter.
///
/// `RUST_LOG` wins over `default_filter` when set.
pub fn init_with(format: LogFormat, default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    // try_init fails when a global subscriber already exists; ignore.
    let _ = match format {
        LogFormat::Json => builder.json().with_target(true).try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}
