//! Site-Crawl main entry point
//!
//! This is the command-line interface for the crawler.

use anyhow::Context;
use clap::Parser;
use site_crawl::config::{load_config, validate, Config};
use site_crawl::crawler::{Crawler, LogErrors};
use site_crawl::sink::DiscardSink;
use site_crawl::url::validate_base_url;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Site-Crawl: a recursive, prefix-scoped web crawler
///
/// Fetches every page reachable from URL whose address starts with URL.
/// If URL does not end with a slash, usually only that single page is fetched.
#[derive(Parser, Debug)]
#[command(name = "site-crawl")]
#[command(version)]
#[command(about = "A recursive, prefix-scoped web crawler", long_about = None)]
struct Cli {
    /// Fully-specified base URL for crawling (scheme and host required)
    #[arg(value_name = "URL", value_parser = parse_base_url)]
    url: String,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Request timeout in seconds (overrides the configuration file)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

/// Clap value parser checking the base URL up front
fn parse_base_url(raw: &str) -> Result<String, String> {
    validate_base_url(raw)
        .map(|_| raw.to_string())
        .map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = load_effective_config(&cli)?;
    tracing::debug!("Using configuration: {:?}", config);

    let crawler = Crawler::new(
        &config,
        &cli.url,
        Some(Arc::new(DiscardSink)),
        Arc::new(LogErrors),
    )
    .context("failed to set up crawl")?;

    let ctx = CancellationToken::new();
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, waiting for in-flight fetches to finish");
            interrupt.cancel();
        }
    });

    let summary = crawler.run(ctx).await;

    tracing::info!(
        "Crawl of {} done: {} fetched, {} failed, {} URLs seen",
        crawler.base_url(),
        summary.fetched,
        summary.failed,
        crawler.visited()
    );

    Ok(())
}

/// Loads the configuration file (if any) and applies CLI overrides
fn load_effective_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            load_config(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?
        }
        None => Config::default(),
    };

    if let Some(timeout) = cli.timeout {
        config.crawler.request_timeout = timeout;
        config.crawler.connect_timeout = config.crawler.connect_timeout.min(timeout);
    }

    validate(&config).context("invalid configuration")?;

    Ok(config)
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("site_crawl=info,warn"),
            1 => EnvFilter::new("site_crawl=debug,info"),
            2 => EnvFilter::new("site_crawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}
