//! Logging Setup
//!
//! Structured logging via `tracing`. Logs always go to stderr so the usage
//! report on stdout stays machine readable. `RUST_LOG` takes precedence over
//! the configured level.

use crate::config::LoggingConfig;
use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                other
            )),
        }
    }
}

/// Level to log at; `--verbose` raises anything quieter than debug
pub fn effective_level(config: &LoggingConfig, verbose: bool) -> Result<Level> {
    let level: Level = config
        .level
        .to_lowercase()
        .parse()
        .map_err(|e| anyhow!("Failed to parse log level: {}", e))?;

    if verbose && level < Level::DEBUG {
        Ok(Level::DEBUG)
    } else {
        Ok(level)
    }
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Install the global subscriber
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = effective_level(config, verbose)?;
    let format = LogFormat::parse(&config.format)?;
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter(level));

    let result = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}
