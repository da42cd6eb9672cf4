//! Tracing subscriber setup.

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

use crate::DocsyncError;

/// Output format of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = DocsyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(DocsyncError::config(format!(
                "unknown LOG_FORMAT '{}', expected 'text' or 'json'",
                other
            ))),
        }
    }
}

/// Format selected by `LOG_FORMAT`, text when unset.
pub fn format_from_env() -> Result<LogFormat, DocsyncError> {
    std::env::var("LOG_FORMAT")
        .map(|value| value.parse())
        .unwrap_or(Ok(LogFormat::Text))
}

/// Install the global subscriber. Levels come from `RUST_LOG`, `default_level`
/// when unset. Logs go to stderr so command output stays clean.
pub fn init_logging(format: LogFormat, default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .init(),
    }
}
