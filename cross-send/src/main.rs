//! cross-send - Background daemon for scheduled publishing
//!
//! Polls the job queue and drives due publish jobs through the bounded
//! worker pool.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::stream::StreamExt;
use libcrosscast::config::Config;
use libcrosscast::db::Database;
use libcrosscast::events::EventBus;
use libcrosscast::logging;
use libcrosscast::notify::Notifier;
use libcrosscast::platforms::PublisherRegistry;
use libcrosscast::scheduler::{RetryPolicy, Scheduler};
use libcrosscast::worker::PublishWorker;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "cross-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled publishing")]
#[command(long_about = "\
cross-send - Background daemon for scheduled publishing

DESCRIPTION:
    cross-send watches the Crosscast job queue and publishes posts when
    their scheduled time arrives.

    Each poll picks up the jobs that have come due and hands them to a
    bounded worker pool. A job fans its post out to every connected platform
    account, records the per-platform outcome, fires webhook notifications,
    and lines up the next occurrence of repeating posts. Failed jobs retry
    with exponential backoff up to the configured attempt ceiling.

USAGE:
    # Run in the foreground, logging to stderr
    cross-send

    # Poll more aggressively than the config says
    cross-send --poll-interval 10

    # Debug logging
    cross-send --verbose

SIGNALS:
    SIGTERM, SIGINT - graceful shutdown; in-flight jobs finish first

CONFIGURATION:
    Configuration file: ~/.config/crosscast/config.toml
    Database location: ~/.local/share/crosscast/crosscast.db

    [scheduler]
    poll_interval = 30     # seconds between queue polls
    worker_pool_size = 4   # concurrent publish jobs
    max_attempts = 3       # job retry ceiling
    retry_delay = 60       # base backoff in seconds
    publish_timeout = 30   # per-target timeout in seconds

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error

For more information, visit: https://github.com/crosscast/crosscast
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to check for due jobs (default: from config)")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Run once and exit (for testing)
    #[arg(long, hide = true)]
    #[arg(help = "Dispatch due jobs once and exit (for testing)")]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_daemon(cli.verbose);

    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    info!("cross-send daemon starting");

    let registry = Arc::new(PublisherRegistry::from_config(&config));
    if registry.is_empty() {
        warn!("No publishers registered; due jobs will fail their targets");
    } else {
        info!("Registered publishers: {}", registry.names().join(", "));
    }

    let scheduler = Scheduler::new(db.clone(), RetryPolicy::from_config(&config.scheduler));
    let notifier = Notifier::new(Duration::from_secs(config.notifications.request_timeout))?;
    let worker = PublishWorker::new(
        db,
        registry,
        scheduler.clone(),
        notifier,
        EventBus::new(100),
        Duration::from_secs(config.scheduler.publish_timeout),
    );

    let poll_interval = cli.poll_interval.unwrap_or(config.scheduler.poll_interval);
    let pool_size = config.scheduler.worker_pool_size;
    info!("Poll interval: {}s, worker pool: {}", poll_interval, pool_size);

    if cli.once {
        let dispatched = scheduler
            .tick(&worker, pool_size, chrono::Utc::now().timestamp())
            .await?;
        info!("cross-send: dispatched {} job(s) once, exiting", dispatched);
        return Ok(());
    }

    let signals = Signals::new([SIGINT, SIGTERM])?;
    let signals_handle = signals.handle();
    let (stop_tx, stop_rx) = watch::channel(false);
    let signal_task = tokio::spawn(forward_shutdown_signal(signals, stop_tx));

    poll_loop(&scheduler, &worker, pool_size, poll_interval, stop_rx).await;

    signals_handle.close();
    let _ = signal_task.await;
    info!("cross-send daemon stopped");
    Ok(())
}

/// Flip the shutdown flag on the first SIGINT/SIGTERM.
async fn forward_shutdown_signal(mut signals: Signals, stop: watch::Sender<bool>) {
    if let Some(signal) = signals.next().await {
        info!("Received signal {}, shutting down gracefully", signal);
        let _ = stop.send(true);
    }
}

/// Poll until shutdown. Each tick dispatches every due job and waits for the
/// pool to drain, so a shutdown request between ticks never abandons work.
async fn poll_loop(
    scheduler: &Scheduler,
    worker: &PublishWorker,
    pool_size: usize,
    poll_interval: u64,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(poll_interval.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = chrono::Utc::now().timestamp();
                match scheduler.tick(worker, pool_size, now).await {
                    Ok(0) => {}
                    Ok(n) => info!("Dispatched {} job(s)", n),
                    Err(e) => error!("Error dispatching jobs: {}", e),
                }
            }
            _ = stop.changed() => {
                info!("Shutdown requested, stopping poll loop");
                break;
            }
        }
    }
}
