use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use maxcubed::api;
use maxcubed::config::Config;
use maxcubed::coordinator::Coordinator;
use maxcubed::gpio::GpioClient;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(version, about = "Bridge eQ-3 MAX! Cubes to a local HTTP API")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(default_value = "maxcubed.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.targets(config.cube_debug()))
        .init();

    tracing::info!("maxcubed starting");
    tracing::info!("Loaded config from: {}", args.config.display());

    let mut cubes = BTreeMap::new();
    for (name, options) in &config.cubes {
        tracing::info!(
            "[{}] Connecting to MAX! Cube at {}:{}",
            name,
            options.address,
            options.port
        );
        let coordinator = Arc::new(Coordinator::from_config(name.clone(), options.clone()));

        // An unreachable cube is retried by the poll loop.
        if let Err(e) = coordinator.refresh().await {
            tracing::warn!("[{}] Initial update failed: {}", name, e);
        }
        cubes.insert(name.clone(), coordinator);
    }

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let pollers: Vec<_> = cubes
        .values()
        .map(|coordinator| tokio::spawn(coordinator.clone().run(stop_rx.clone())))
        .collect();

    let gpio = GpioClient::new(&config.gpio).context("building GPIO client")?;
    let state = Arc::new(api::AppState::new(cubes, gpio));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let server = tokio::spawn(api::serve(
        config.api.listen.clone(),
        config.api.port,
        state,
        shutdown_rx,
    ));

    tracing::info!("Press Ctrl+C to exit");
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }

    let _ = stop_tx.send(true);
    let _ = shutdown_tx.send(());

    for poller in pollers {
        if let Err(e) = poller.await {
            tracing::error!("Poll task failed: {}", e);
        }
    }
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("HTTP API server error: {}", e),
        Err(e) => tracing::error!("HTTP API task failed: {}", e),
    }

    tracing::info!("maxcubed shutdown complete");

    Ok(())
}
