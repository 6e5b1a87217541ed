//! Silt main entry point
//!
//! Command-line interface for the silt ingestion core.

use anyhow::Context;
use clap::Parser;
use silt::config::load_config_with_hash;
use silt::dispatch::{AcquireOptions, Dispatcher};
use silt::ledger::UrlStatus;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Silt: a URL ingestion and deduplication core
///
/// Silt routes URLs to configured retrieval backends, spaces requests per
/// domain, retries transient failures, and records every URL's outcome in a
/// deduplicating ledger.
#[derive(Parser, Debug)]
#[command(name = "silt")]
#[command(version)]
#[command(about = "URL ingestion with dedup, rate limiting, and retries", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// URLs to ingest
    #[arg(value_name = "URLS")]
    urls: Vec<String>,

    /// Read additional URLs from a file, one per line
    #[arg(long, value_name = "FILE")]
    urls_file: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Re-fetch URLs even when the ledger already marks them completed
    #[arg(long)]
    force: bool,

    /// Validate config and show the routing table without ingesting
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show ledger statistics and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Print the collected issue digest after an ingest run
    #[arg(long)]
    show_issues: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) =
        load_config_with_hash(&cli.config).context("Failed to load configuration")?;
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    if cli.stats {
        return handle_stats(&config);
    }

    let urls = collect_urls(&cli)?;
    if urls.is_empty() {
        anyhow::bail!("No URLs given; pass them as arguments or via --urls-file");
    }

    handle_ingest(&config, urls, cli.force, cli.show_issues).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("silt=info,warn"),
            1 => EnvFilter::new("silt=debug,info"),
            2 => EnvFilter::new("silt=trace,debug"),
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

/// Gathers URLs from the command line and the optional URL file
fn collect_urls(cli: &Cli) -> anyhow::Result<Vec<String>> {
    let mut urls = cli.urls.clone();

    if let Some(path) = &cli.urls_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        urls.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from),
        );
    }

    Ok(urls)
}

/// Handles --dry-run: validates config and shows the routing surface
fn handle_dry_run(config: &silt::config::Config) {
    println!("=== Silt Dry Run ===\n");

    println!("Ingest:");
    println!("  Max concurrent: {}", config.ingest.max_concurrent);
    println!("  Default timeout: {}ms", config.ingest.default_timeout_ms);

    println!("\nRate limit:");
    println!("  Enabled: {}", config.rate_limit.enabled);
    println!(
        "  Default interval: {}ms",
        config.rate_limit.default_interval_ms
    );
    for (domain, interval) in &config.rate_limit.domains {
        println!("  {} -> {}ms", domain, interval);
    }

    println!("\nRetry:");
    println!("  Max retries: {}", config.retry.max_retries);
    println!("  Base delay: {}ms", config.retry.retry_delay_ms);
    println!("  Backoff factor: {}", config.retry.backoff_factor);

    println!("\nCapabilities ({}):", config.capability.len());
    for entry in &config.capability {
        let default_marker = if entry.default { " (default)" } else { "" };
        println!("  - {} [{}]{}", entry.name, entry.params.kind(), default_marker);
    }

    println!("\nRules ({}):", config.rule.len());
    for rule in &config.rule {
        println!(
            "  {} -> {} (priority {})",
            rule.pattern, rule.capability, rule.priority
        );
    }

    if !config.fallback_domains.is_empty() {
        println!("\nFallback domains ({}):", config.fallback_domains.len());
        for (domain, capability) in &config.fallback_domains {
            println!("  {} -> {}", domain, capability);
        }
    }

    println!("\nLedger: {}", config.output.database_path);
    println!("\n✓ Configuration is valid");
}

/// Handles --stats: prints ledger counts
fn handle_stats(config: &silt::config::Config) -> anyhow::Result<()> {
    let dispatcher = Dispatcher::from_config(config).context("Failed to initialize")?;
    let (counts, total) = dispatcher.status_counts()?;

    println!("Ledger: {}\n", config.output.database_path);
    println!("URLs by status:");
    for (status, count) in counts {
        println!("  {:<12} {}", status.to_string(), count);
    }
    println!("  {:<12} {}", "total", total);

    Ok(())
}

/// Handles the main ingest operation
async fn handle_ingest(
    config: &silt::config::Config,
    urls: Vec<String>,
    force: bool,
    show_issues: bool,
) -> anyhow::Result<()> {
    tracing::info!("Ingesting {} URLs", urls.len());

    let dispatcher =
        Arc::new(Dispatcher::from_config(config).context("Failed to initialize")?);

    let options = AcquireOptions {
        force,
        ..AcquireOptions::default()
    };
    let report = dispatcher.acquire_all(&urls, &options).await;

    println!(
        "Ingest finished: {} succeeded, {} failed",
        report.successful.len(),
        report.failed.len()
    );
    for outcome in &report.successful {
        println!("  ✓ {} ({:?})", outcome.url, outcome.status);
    }
    for failure in &report.failed {
        println!("  ✗ {}: {}", failure.url, failure.error);
    }

    let (counts, total) = dispatcher.status_counts()?;
    let completed = counts
        .iter()
        .find(|(status, _)| *status == UrlStatus::Completed)
        .map(|(_, count)| *count)
        .unwrap_or(0);
    tracing::info!("Ledger now holds {} URLs ({} completed)", total, completed);

    if show_issues {
        println!("\n{}", dispatcher.collector().formatted_summary());
    }

    Ok(())
}
