//! Structured logging.

use crate::config::LoggingSettings;
use crate::{Error, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
pub const LOG_FILTER_ENV: &str = "CSVGATE_LOG";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for anything but `pretty` or `json`.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(Error::InvalidInput(format!(
                "unknown log format '{other}' (expected pretty or json)"
            ))),
        }
    }
}

/// Logging configuration resolved for subscriber installation.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Event filter.
    pub filter: EnvFilter,
    /// Optional log file.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds the config from settings.
    ///
    /// Filter precedence: `CSVGATE_LOG`, then the configured directive, then
    /// `debug` when verbose, otherwise `info`.
    #[must_use]
    pub fn from_settings(settings: &LoggingSettings, verbose: bool) -> Self {
        let env_directive = std::env::var(LOG_FILTER_ENV).ok();
        Self {
            format: settings.format,
            filter: resolve_filter(env_directive.as_deref(), settings.filter.as_deref(), verbose),
            file: settings.file.clone(),
        }
    }
}

fn resolve_filter(env: Option<&str>, configured: Option<&str>, verbose: bool) -> EnvFilter {
    let fallback = if verbose { "csvgate=debug" } else { "info" };
    [env, configured]
        .into_iter()
        .flatten()
        .filter(|d| !d.trim().is_empty())
        .find_map(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(fallback))
}
