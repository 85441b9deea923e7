use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use irbridged::Config;
use irbridged::Engine;
use irbridged::api;

#[derive(Parser)]
#[command(name = "irbridged", version, about = "Tasmota IR blaster bridge daemon")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "irbridged.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from(config.logging.level))
        .init();

    tracing::info!("irbridged starting");
    tracing::info!("Loaded config from: {}", args.config.display());

    let mut engine = Engine::new();
    let registered = engine.register_integrations_from_config(&config)?;
    if registered == 0 {
        anyhow::bail!(
            "no integrations configured: an [integrations.mqtt] section is required to reach any devices"
        );
    }
    tracing::info!("Registered {} integration(s)", registered);

    let engine = Arc::new(engine);

    // Engine event loop
    let engine_task = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine.run().await;
        })
    };

    // Optional HTTP API
    let mut api_shutdown = None;
    let mut api_task = None;
    if let Some(api_config) = &config.api {
        if api_config.enabled {
            let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
            api_shutdown = Some(shutdown_tx);

            let listen = api_config.listen.clone();
            let port = api_config.port;
            let engine = engine.clone();
            api_task = Some(tokio::spawn(async move {
                if let Err(e) = api::serve(listen, port, engine, shutdown_rx).await {
                    tracing::error!("HTTP API server error: {}", e);
                }
            }));
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }

    if let Some(shutdown_tx) = api_shutdown {
        let _ = shutdown_tx.send(());
    }
    if let Some(task) = api_task {
        let _ = task.await;
    }
    engine_task.abort();

    tracing::info!("irbridged shutdown complete");
    Ok(())
}
