//! Harvest-Robot main entry point
//!
//! This is the command-line interface for the Harvest-Robot article harvester.

use anyhow::Context;
use clap::{Parser, Subcommand};
use harvest_robot::config::{load_config_with_hash, Config};
use harvest_robot::crawler::{build_http_client, AdmissionGate, FetchWorker, Frontier};
use harvest_robot::extract::ExtractorRegistry;
use harvest_robot::output::{export_corpus, load_statistics, print_statistics};
use harvest_robot::state::CrawlState;
use harvest_robot::storage::{open_shared, open_storage};
use harvest_robot::Normalizer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Harvest-Robot: an incremental article harvester
///
/// Harvest-Robot walks the paginated article listings of the configured
/// sites, queues each article at most once per recrawl interval, and fetches
/// queued articles into a SQLite store, rewriting an article only when its
/// text has changed.
#[derive(Parser, Debug)]
#[command(name = "harvest-robot")]
#[command(version = "1.0.0")]
#[command(about = "An incremental article harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk the listing pages and queue discovered articles
    Harvest {
        /// Stop after this many passes instead of running until Ctrl-C
        #[arg(long, value_name = "N")]
        passes: Option<u64>,
    },

    /// Fetch queued articles into the document store
    Crawl {
        /// Keep running, draining the queue again every SECS seconds
        #[arg(long, value_name = "SECS")]
        follow: Option<u64>,
    },

    /// Show statistics from the database and exit
    Stats,

    /// Write the clean text of every article to numbered .txt files
    Export {
        /// Output directory (defaults to storage.corpus-dir)
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = match load_config_with_hash(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e).context(format!("invalid configuration {}", cli.config.display()));
        }
    };
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    let config = Arc::new(config);
    match cli.command {
        Command::Harvest { passes } => handle_harvest(config, passes).await,
        Command::Crawl { follow } => handle_crawl(config, follow).await,
        Command::Stats => handle_stats(&config),
        Command::Export { out } => handle_export(&config, out),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("harvest_robot=info,warn"),
            1 => EnvFilter::new("harvest_robot=debug,info"),
            2 => EnvFilter::new("harvest_robot=trace,debug"),
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

/// Flips the returned channel to `true` on Ctrl-C
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, finishing the current step");
            let _ = tx.send(true);
        }
    });
    rx
}

fn http_client(config: &Config) -> anyhow::Result<reqwest::Client> {
    build_http_client(
        &config.http,
        Duration::from_secs(config.crawler.request_timeout),
    )
    .context("failed to build HTTP client")
}

/// Handles the `harvest` command: runs discovery
async fn handle_harvest(config: Arc<Config>, passes: Option<u64>) -> anyhow::Result<()> {
    let storage = open_shared(Path::new(&config.storage.database_path))
        .with_context(|| format!("failed to open {}", config.storage.database_path))?;
    let state = CrawlState::load(Path::new(&config.storage.cursor_path))?;

    let gate = AdmissionGate::new(
        storage,
        Normalizer::new(config.crawler.upgrade_http),
        Duration::from_secs(config.crawler.recrawl_interval),
    );
    let mut frontier = Frontier::new(Arc::clone(&config), http_client(&config)?, gate, state)?;

    tracing::info!(
        "Harvesting {} sources (recrawl interval {}s)",
        config.sources.len(),
        config.crawler.recrawl_interval
    );

    let report = frontier.run(shutdown_signal(), passes).await?;
    tracing::info!(
        "Discovery finished: {} queued, {} recent, {} errors",
        report.queued,
        report.recent,
        report.errors
    );

    Ok(())
}

/// Handles the `crawl` command: drains the queue
async fn handle_crawl(config: Arc<Config>, follow: Option<u64>) -> anyhow::Result<()> {
    let storage = open_shared(Path::new(&config.storage.database_path))
        .with_context(|| format!("failed to open {}", config.storage.database_path))?;
    let extractors = ExtractorRegistry::from_config(&config)?;
    let client = http_client(&config)?;

    let mut worker = FetchWorker::new(Arc::clone(&config), storage, client, extractors);
    let mut shutdown = shutdown_signal();

    let report = match follow {
        Some(secs) => worker.run(shutdown, Duration::from_secs(secs)).await,
        None => worker.drain(&mut shutdown).await,
    };

    match report {
        Ok(report) => {
            tracing::info!("Crawl finished: {} articles processed", report.processed());
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

/// Handles the `stats` command: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let storage = open_storage(Path::new(&config.storage.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the `export` command: writes the plain-text corpus
fn handle_export(config: &Config, out: Option<PathBuf>) -> anyhow::Result<()> {
    let dir = out.unwrap_or_else(|| PathBuf::from(&config.storage.corpus_dir));
    let storage = open_storage(Path::new(&config.storage.database_path))?;

    let count = export_corpus(&storage, &dir)
        .with_context(|| format!("failed to export corpus to {}", dir.display()))?;
    println!("Exported {} articles to {}", count, dir.display());

    Ok(())
}
