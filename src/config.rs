// Configuration File Support
//
// Configuration for a usage run: GitLab endpoint, allow-lists, logging and
// report output. Supports TOML format with environment variable overrides.
// Configuration files are loaded from the XDG config directory:
// ~/.config/registry-usage/config.toml

use crate::gitlab::Endpoint;
use crate::report::OutputFormat;
use crate::usage::Filters;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default request rate against the GitLab API (requests per second)
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 10.0;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// GitLab API configuration
    pub gitlab: GitlabConfig,

    /// Group and registry allow-lists
    pub filters: Filters,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Report configuration
    pub output: OutputConfig,
}

/// GitLab API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GitlabConfig {
    /// GitLab base URL, with or without the /api/v4 suffix
    pub url: String,

    /// API token (never written back out)
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// Request rate ceiling; values above 100 are reduced to 100
    pub requests_per_second: f64,

    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Deadline for the whole run in seconds
    pub deadline_secs: Option<u64>,
}

impl Default for GitlabConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: None,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            timeout_secs: None,
            deadline_secs: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Report configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Report format (text, json)
    pub format: OutputFormat,
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// Environment overrides are applied; validation is left to the caller
    /// because the URL is usually supplied on the command line.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default().apply_env_overrides());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file from {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file from {:?}", path))?;

        tracing::debug!("Loaded configuration from {:?}", path);
        Ok(config.apply_env_overrides())
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/registry-usage/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) =
            directories::ProjectDirs::from("com", "registry-usage", "registry-usage")
        {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("registry-usage")
                .join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// - GITLAB_API_TOKEN
    /// - REGISTRY_USAGE_URL
    /// - REGISTRY_USAGE_FREQ
    /// - REGISTRY_USAGE_LOG_LEVEL
    /// - REGISTRY_USAGE_LOG_FORMAT
    /// - REGISTRY_USAGE_OUTPUT
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("GITLAB_API_TOKEN") {
            self.gitlab.token = Some(token);
        }
        if let Some(url) = lookup("REGISTRY_USAGE_URL") {
            self.gitlab.url = url;
        }
        if let Some(freq) = lookup("REGISTRY_USAGE_FREQ") {
            if let Ok(freq) = freq.parse::<f64>() {
                if freq.is_finite() && freq > 0.0 {
                    self.gitlab.requests_per_second = freq;
                }
            }
        }

        if let Some(level) = lookup("REGISTRY_USAGE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("REGISTRY_USAGE_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Some(format) = lookup("REGISTRY_USAGE_OUTPUT") {
            match format.parse() {
                Ok(format) => self.output.format = format,
                Err(e) => tracing::warn!("Ignoring REGISTRY_USAGE_OUTPUT: {}", e),
            }
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.gitlab.url.trim().is_empty() {
            anyhow::bail!("GitLab URL is required (--url or REGISTRY_USAGE_URL)");
        }
        let rate = self.gitlab.requests_per_second;
        if !rate.is_finite() || rate <= 0.0 {
            anyhow::bail!("Requests per second must be > 0, got {}", rate);
        }
        if self.gitlab.timeout_secs == Some(0) {
            anyhow::bail!("Request timeout must be > 0 seconds");
        }
        if self.gitlab.deadline_secs == Some(0) {
            anyhow::bail!("Run deadline must be > 0 seconds");
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        if self.filters.groups.iter().any(|g| g.is_empty()) {
            anyhow::bail!("Group filter entries must not be empty");
        }
        if self.filters.registries.iter().any(|r| r.is_empty()) {
            anyhow::bail!("Registry filter entries must not be empty");
        }

        Ok(())
    }

    /// Build the GitLab endpoint described by this configuration
    pub fn endpoint(&self) -> Result<Endpoint> {
        let mut endpoint = Endpoint::new(
            &self.gitlab.url,
            self.gitlab.token.clone(),
            self.gitlab.requests_per_second,
        )
        .context("Failed to create GitLab endpoint")?;

        if let Some(secs) = self.gitlab.timeout_secs {
            endpoint = endpoint
                .with_timeout(Duration::from_secs(secs))
                .context("Failed to apply request timeout")?;
        }

        Ok(endpoint)
    }

    /// Whole-run deadline, if configured
    pub fn deadline(&self) -> Option<Duration> {
        self.gitlab.deadline_secs.map(Duration::from_secs)
    }
}
