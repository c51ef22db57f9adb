//! SignalBridge binary.
//!
//! Wires the components together: configuration, mandatory-resource cache,
//! mapping table, subscription manager and dispatch engine, with stdout as
//! the downstream command sink.

use anyhow::Context;
use clap::Parser;
use signalbridge::helper::all_helper_input_paths;
use signalbridge::{
    CommandSink, DispatchEngine, LineSink, MandatoryResourceCache, MappingTable,
    SubscriptionManager,
};
use signalbridge_common::{BridgeConfig, BridgeMetrics, Command};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "signalbridge")]
#[command(about = "Telemetry stream to device-management command bridge")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "signalbridge.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    info!("Starting SignalBridge");

    // Startup errors are fatal before any subscription begins
    let config = BridgeConfig::load(&args.config).context("failed to load configuration")?;
    info!("Configuration loaded from {:?}", args.config);

    let mapping = Arc::new(
        MappingTable::from_file(Path::new(&config.mapping.file))
            .context("failed to load mapping table")?,
    );
    let cache = Arc::new(
        MandatoryResourceCache::load_or_generate(
            Path::new(&config.cache.file),
            Path::new(&config.cache.schema_dir),
        )
        .context("failed to build mandatory resource cache")?,
    );
    let metrics = Arc::new(BridgeMetrics::new());

    let helper_paths = all_helper_input_paths();
    let subscriptions = mapping.subscriptions(&config.subscription, &helper_paths);
    info!("Subscribing to {} distinct paths", subscriptions.len());

    let (delta_tx, delta_rx) = mpsc::channel(256);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let manager = SubscriptionManager::new(
        config.upstream.clone(),
        "signalbridge".to_string(),
        subscriptions,
        Arc::clone(&metrics),
    );
    let mut subscription_task = tokio::spawn(manager.run(delta_tx, shutdown_rx));

    let engine = DispatchEngine::new(
        Arc::clone(&mapping),
        Arc::clone(&cache),
        Arc::clone(&metrics),
        config.validation.strict_single_resource,
    );
    let dispatch_task = tokio::spawn(async move {
        let mut sink = LineSink::new(tokio::io::stdout());
        let result = engine.run(delta_rx, &mut sink).await;
        // Tell the external command process to terminate
        if let Err(e) = sink.send(Command::Quit).await {
            warn!("Failed to send quit downstream: {}", e);
        }
        result
    });

    let mut bridge_result: anyhow::Result<()> = Ok(());
    let mut subscription_done = false;

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            info!("Received shutdown signal");
        }
        joined = &mut subscription_task => {
            subscription_done = true;
            match joined {
                Ok(Ok(())) => info!("Subscription manager stopped"),
                Ok(Err(e)) => {
                    error!("Upstream subscription failed: {}", e);
                    bridge_result = Err(anyhow::Error::new(e).context("upstream subscription failed"));
                }
                Err(e) => {
                    bridge_result = Err(anyhow::Error::new(e).context("subscription task panicked"));
                }
            }
        }
    }

    let _ = shutdown_tx.send(true);

    if !subscription_done {
        match subscription_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Subscription manager exited with error on shutdown: {}", e),
            Err(e) => warn!("Subscription task panicked: {}", e),
        }
    }

    // The subscription side is gone, so the delta channel is closed and the
    // dispatch engine drains before quitting the sink
    match dispatch_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Dispatch engine error: {}", e),
        Err(e) => warn!("Dispatch task panicked: {}", e),
    }

    info!("SignalBridge stopped");
    bridge_result
}
