//! hn-mirror main entry point
//!
//! This is the command-line interface for the hn-mirror poller.

use anyhow::Context;
use clap::Parser;
use hn_mirror::config::{resolve_config, Config, ConfigOverrides};
use hn_mirror::crawler::{poll, Poller};
use hn_mirror::output::{load_statistics, print_statistics};
use hn_mirror::storage::CsvLedger;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// hn-mirror: keeps a local mirror of a ranked link index
///
/// Polls the index page on an interval, downloads the external page and
/// discussion thread for each new item, and keeps a CSV ledger of what has
/// been downloaded in the order the index currently ranks it.
#[derive(Parser, Debug)]
#[command(name = "hn-mirror")]
#[command(version)]
#[command(about = "A polling mirror for a ranked link index", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (built-in defaults when omitted)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Directory holding per-item folders
    #[arg(long, env = "HN_MIRROR_SAVE_ROOT")]
    save_root: Option<PathBuf>,

    /// Ledger CSV path (defaults to downloaded_items.csv under the save root)
    #[arg(long, env = "HN_MIRROR_LEDGER_PATH")]
    ledger_path: Option<PathBuf>,

    /// Seconds between polls
    #[arg(long, value_name = "SECS", env = "HN_MIRROR_POLL_INTERVAL")]
    poll_interval: Option<u64>,

    /// Run a single poll, wait for its comment crawl, and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    once: bool,

    /// Validate config and print it without polling
    #[arg(long, conflicts_with_all = ["once", "stats"])]
    dry_run: bool,

    /// Show statistics from the ledger and exit
    #[arg(long, conflicts_with_all = ["once", "dry_run"])]
    stats: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            save_root: self.save_root.clone(),
            ledger_path: self.ledger_path.clone(),
            poll_interval_secs: self.poll_interval,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    if let Some(path) = &cli.config {
        tracing::info!("Loading configuration from: {}", path.display());
    }
    let (config, config_hash) = resolve_config(cli.config.as_deref(), &cli.overrides())
        .context("Failed to load configuration")?;
    match config_hash {
        Some(hash) => tracing::info!("Configuration loaded successfully (hash: {})", hash),
        None => tracing::info!("Using built-in configuration defaults"),
    }

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config).await?;
    } else if cli.once {
        handle_once(config).await?;
    } else {
        handle_poll(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("hn_mirror=info,warn"),
            1 => EnvFilter::new("hn_mirror=debug,info"),
            2 => EnvFilter::new("hn_mirror=trace,debug"),
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

/// Handles the --dry-run mode: prints the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== hn-mirror Dry Run ===\n");

    println!("Poller:");
    println!("  Index URL: {}", config.poller.index_url);
    println!("  Thread URL: {}", config.poller.thread_url_template);
    println!("  Poll interval: {}s", config.poller.poll_interval_secs);
    println!("  Top items: {}", config.poller.top_n);

    println!("\nFetcher:");
    println!(
        "  Max concurrent requests: {}",
        config.fetcher.max_concurrent_requests
    );
    println!("  Request delay: {}ms", config.fetcher.request_delay_ms);
    println!("  Max content size: {} bytes", config.fetcher.max_content_size);
    println!("  Index timeout: {}ms", config.fetcher.main_page_timeout_ms);
    println!("  External timeout: {}ms", config.fetcher.external_timeout_ms);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Save root: {}", config.output.save_root.display());
    println!("  Ledger: {}", config.output.ledger_path().display());

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the ledger
async fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let ledger_path = config.output.ledger_path();
    println!("Ledger: {}\n", ledger_path.display());

    let ledger = CsvLedger::new(ledger_path);
    let stats = load_statistics(&ledger, &config.output.save_root)
        .await
        .context("Failed to read the ledger")?;

    print_statistics(&stats);
    Ok(())
}

/// Handles the --once mode: one poll, then wait for its comment crawl
async fn handle_once(config: Config) -> anyhow::Result<()> {
    let mut poller = Poller::new(config)
        .await
        .context("Failed to start the poller")?;

    let report = poller.poll_once().await.context("Poll failed")?;
    if !report.statistics.index_available {
        tracing::warn!("Index was unavailable, nothing was downloaded");
    }

    if report.comments_queued > 0 {
        tracing::info!("Waiting for the comment crawl to finish");
        if poller.finish_comment_crawl().await.is_none() {
            anyhow::bail!("Comment crawl task failed");
        }
    }

    Ok(())
}

/// Handles the main poll loop, stopping on Ctrl-C
async fn handle_poll(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        "Mirroring {} into {}",
        config.poller.index_url,
        config.output.save_root.display()
    );

    tokio::select! {
        result = poll(config) => {
            result.context("Poller stopped")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Interrupted, shutting down");
        }
    }

    Ok(())
}
