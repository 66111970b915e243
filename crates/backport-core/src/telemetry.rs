//! Centralised tracing initialisation for the backport binary.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! because the global subscriber can only be set once per process.

use std::fmt;
use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter};

use crate::error::BackportError;

/// Log line encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    /// Newline-delimited JSON.
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        })
    }
}

impl FromStr for LogFormat {
    type Err = BackportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(BackportError::InvalidConfiguration(format!(
                "log format must be 'text' or 'json', got {other:?}"
            ))),
        }
    }
}

/// Parse `debug|info|warn|error` (`warning` accepted).
pub fn parse_level(level: &str) -> Result<Level, BackportError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "debug" => Ok(Level::DEBUG),
        "" | "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(BackportError::InvalidConfiguration(format!(
            "log level must be one of debug, info, warn, error; got {other:?}"
        ))),
    }
}

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_tracing(format: LogFormat, level: Level) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_fmt::layer().with_target(false).json())
                .try_init()
                .ok();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_fmt::layer().with_target(false))
                .try_init()
                .ok();
        }
    }
}
