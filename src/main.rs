//! # Model Watch
//!
//! Watches model-hosting listing pages and reports models that were not seen
//! on any previous check.
//!
//! ## Features
//!
//! - Reads organization listings through a WebDriver browser session, or
//!   RSS/Atom feeds for subscriptions that publish one
//! - Fetches detail pages only for newly discovered models
//! - Keeps a JSON snapshot of every model ever seen, per subscription
//! - Reports new models through logs, a Slack webhook, or email over SMTP
//! - Runs once, or daily at a fixed local time
//!
//! ## Usage
//!
//! ```sh
//! model_watch add qwen https://huggingface.co/Qwen
//! model_watch run
//! model_watch watch --at 00:00
//! ```
//!
//! ## Architecture
//!
//! Each pass follows the same pipeline:
//! 1. **Load**: Read the snapshot file (missing means empty)
//! 2. **Scan**: Collect title and link for every model on each listing, with retries
//! 3. **Reconcile**: Reuse stored records for known titles, fetch detail for new ones
//! 4. **Persist**: Save the merged snapshot once, atomically
//! 5. **Notify**: Hand the new models to the configured notifier

use chrono::NaiveTime;
use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod config;
mod errors;
mod models;
mod notify;
mod reconcile;
mod report;
mod retry;
mod schedule;
mod scrapers;
mod store;
mod utils;

use cli::{Cli, Command};
use config::Config;
use notify::Gateway;
use reconcile::{ReconcileSettings, Reconciler, run_pass};
use retry::RetryScan;
use scrapers::{BrowserScanner, FeedScanner, HttpDetailExtractor, SiteScanner, http_client};
use store::SnapshotStore;

type Watcher = Reconciler<RetryScan<SiteScanner>, HttpDetailExtractor>;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(config = %args.config.display(), snapshot = %args.snapshot.display(), "Parsed CLI arguments");

    match args.command.unwrap_or(Command::Run) {
        Command::Add { name, url, kind } => {
            let mut config = Config::load_or_default(&args.config).await?;
            let added = config.add_subscription(&name, &url, kind.into())?.clone();
            config.save(&args.config).await?;
            info!(name = %added.name, url = %added.source_url, kind = %added.kind, "Subscription added");
            println!("Added subscription '{}' ({})", added.name, added.source_url);
        }
        Command::Remove { name } => {
            let mut config = Config::load(&args.config).await?;
            let removed = config.remove_subscription(&name)?;
            config.save(&args.config).await?;
            info!(name = %removed.name, "Subscription removed; stored records are kept");
            println!("Removed subscription '{}'", removed.name);
        }
        Command::List => {
            let config = Config::load(&args.config).await?;
            if config.subscriptions.is_empty() {
                println!("No subscriptions configured.");
            }
            for sub in &config.subscriptions {
                println!("{}\t{}\t{}", sub.name, sub.kind, sub.source_url);
            }
        }
        Command::Run => {
            let config = Config::load(&args.config).await?;
            let (watcher, gateway) = build_watcher(&config)?;
            let store = SnapshotStore::new(&args.snapshot);
            let outcome = run_pass(&watcher, &store, &config.subscriptions, &gateway).await?;
            print!("{}", report::render_summary(&outcome.delta));
            if !outcome.skipped.is_empty() {
                warn!(skipped = ?outcome.skipped, "Some subscriptions were skipped this pass");
            }
        }
        Command::Watch { at } => {
            let at = schedule::parse_time_of_day(&at)?;
            watch(&args.config, &args.snapshot, at).await?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

/// Assemble the production scanner, extractor and notifier from configuration.
fn build_watcher(config: &Config) -> Result<(Watcher, Gateway), Box<dyn Error>> {
    let http = http_client()?;
    let scanner = SiteScanner {
        browser: BrowserScanner::new(config.browser.clone().unwrap_or_default()),
        feed: FeedScanner::new(http.clone()),
    };
    let watcher = Reconciler::new(
        RetryScan::with_defaults(scanner),
        HttpDetailExtractor::new(http.clone()),
        ReconcileSettings::default(),
    );
    let gateway = Gateway::from_settings(config.notifications.as_ref(), http);
    Ok((watcher, gateway))
}

/// Daily loop. The configuration is loaded once at start.
async fn watch(config_path: &Path, snapshot_path: &Path, at: NaiveTime) -> Result<(), Box<dyn Error>> {
    let config = Config::load(config_path).await?;
    let (watcher, gateway) = build_watcher(&config)?;
    let store = SnapshotStore::new(snapshot_path);
    info!(at = %at, subscriptions = config.subscriptions.len(), "Starting daily watch");

    schedule::run_daily(at, || run_pass(&watcher, &store, &config.subscriptions, &gateway)).await;
    Ok(())
}
