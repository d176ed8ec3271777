// registry-usage - Main Entry Point
//
// Reports the disk usage of every GitLab container registry visible to a
// token, per registry and per group:
// - CLI interface
// - Configuration file and environment overrides
// - Ctrl-C and deadline cancellation

use anyhow::{Context, Result};
use clap::Parser;
use registry_usage::cancel::{self, CancelHandle};
use registry_usage::config::Config;
use registry_usage::logging;
use registry_usage::report::{OutputFormat, Reporter};
use registry_usage::usage::UsageAggregator;
use std::path::PathBuf;
use tracing::{info, warn};

/// registry-usage: GitLab container registry disk usage
#[derive(Parser, Debug)]
#[command(name = "registry-usage")]
#[command(author = "registry-usage Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Report GitLab container registry disk usage per registry and per group", long_about = None)]
struct Args {
    /// GitLab base URL (with or without /api/v4)
    #[arg(long)]
    url: Option<String>,

    /// GitLab API token
    #[arg(long, env = "GITLAB_API_TOKEN", hide_env_values = true)]
    gitlab_token: Option<String>,

    /// Maximum GitLab API requests per second (capped at 100)
    #[arg(long)]
    freq: Option<f64>,

    /// Only report this group path (repeatable)
    #[arg(long = "group", value_name = "PATH")]
    groups: Vec<String>,

    /// Only report this registry path (repeatable)
    #[arg(long = "registry", value_name = "PATH")]
    registries: Vec<String>,

    /// Configuration file (defaults to the XDG config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Abort the whole run after this many seconds
    #[arg(long, value_name = "SECS")]
    deadline: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Command line flags win over the config file and the environment
    fn apply(self, mut config: Config) -> Config {
        if let Some(url) = self.url {
            config.gitlab.url = url;
        }
        if let Some(token) = self.gitlab_token {
            config.gitlab.token = Some(token);
        }
        if let Some(freq) = self.freq {
            config.gitlab.requests_per_second = freq;
        }
        if !self.groups.is_empty() {
            config.filters.groups = self.groups;
        }
        if !self.registries.is_empty() {
            config.filters.registries = self.registries;
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if let Some(timeout) = self.timeout {
            config.gitlab.timeout_secs = Some(timeout);
        }
        if let Some(deadline) = self.deadline {
            config.gitlab.deadline_secs = Some(deadline);
        }
        config
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let verbose = args.verbose;

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let config = args.apply(config);
    config.validate().context("Invalid configuration")?;

    logging::init(&config.logging, verbose)?;

    info!("registry-usage v0.1.0 starting...");
    if config.gitlab.token.as_deref().filter(|t| !t.is_empty()).is_none() {
        warn!("No GitLab token configured, only public groups will be visible");
    }

    let endpoint = config.endpoint()?;
    info!(
        "Using {} at {:.1} requests/s ({:?} between requests)",
        endpoint.base_url(),
        endpoint.limiter().rate(),
        endpoint.limiter().interval()
    );
    if let Some(timeout) = endpoint.timeout() {
        info!("Request timeout: {:?}", timeout);
    }

    let (handle, token) = cancel::channel();
    let interrupt = tokio::spawn(cancel_on_ctrl_c(handle.clone()));
    let deadline = config.deadline().map(|d| handle.cancel_after(d));

    let aggregator = UsageAggregator::new(endpoint, config.filters.clone());
    let stdout = std::io::stdout();
    let mut reporter = Reporter::new(stdout.lock(), config.output.format);

    let result = aggregator.run(&token, &mut reporter).await;
    interrupt.abort();
    if let Some(deadline) = deadline {
        deadline.abort();
    }

    let summary = result.context("Failed to collect registry usage")?;
    reporter
        .finish(&summary)
        .context("Failed to write usage report")?;

    info!(
        "Done: {} groups, {} registries, {} tags ({} failed)",
        summary.groups, summary.registries, summary.tags, summary.failed_tags
    );
    Ok(())
}

/// Fire the cancellation signal on Ctrl-C
async fn cancel_on_ctrl_c(handle: CancelHandle) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("Interrupted, canceling outstanding requests");
            handle.cancel();
        }
        Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
    }
}
