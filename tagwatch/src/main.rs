use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use kv_store::{KvStore, MemoryStore, SqliteStore};
use tracing::{info, warn};

use tagwatch::dispatch::handlers::{LogHandler, WebhookHandler};
use tagwatch::{Dispatcher, Monitor, MonitorConfig, logging};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "TAGWATCH_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Keep seen items in memory instead of the configured database
    #[arg(long)]
    memory: bool,

    /// Stop automatically after this many seconds
    #[arg(long, value_name = "SECS")]
    run_for: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = MonitorConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let _guard = logging::init_logging(&config.logging, args.verbose)
        .context("Failed to initialize logging")?;

    let store: Arc<dyn KvStore> = if args.memory {
        info!("Using in-memory store, seen items are not persisted");
        Arc::new(MemoryStore::new())
    } else {
        let store = SqliteStore::connect(&config.database)
            .await
            .with_context(|| format!("Failed to open store {}", config.database))?;
        Arc::new(store)
    };

    let mut dispatcher = Dispatcher::new();
    dispatcher.register(Arc::new(LogHandler::new()))?;
    for webhook in &config.webhooks {
        let handler = WebhookHandler::new(webhook)
            .with_context(|| format!("Invalid webhook {}", webhook.url))?;
        dispatcher.register(Arc::new(handler))?;
    }

    let monitor = Monitor::builder(config)
        .store(store)
        .dispatcher(dispatcher)
        .build()
        .context("Failed to build monitor")?;

    let handle = monitor.start()?;

    let shutdown = async {
        match args.run_for {
            Some(secs) => {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                info!(secs, "Run duration elapsed");
            }
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Failed to listen for Ctrl-C, stopping");
                } else {
                    info!("Received Ctrl-C");
                }
            }
        }
    };

    tokio::select! {
        _ = shutdown => {}
        _ = monitor.exit_requested() => {}
    }

    monitor.stop();
    handle.await.context("Monitor loop panicked")?;

    info!(polls = monitor.polls_started(), "Shut down");

    // Return instead of exiting so the log guard flushes the file writer.
    if monitor.is_exit_requested() {
        anyhow::bail!("stopped after a pipeline error (exit_on_error is set)");
    }
    Ok(())
}
