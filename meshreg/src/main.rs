mod bootstrap;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use meshreg_core::{logging, metrics, Config, MeshWatcher};
use meshreg_registry::Controller;

#[derive(Debug, Parser)]
#[command(name = "meshreg", about = "Multi-registry service discovery aggregator")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "MESHREG_CONFIG_PATH", default_value = "config.yaml")]
    config: String,
}

/// Periodically log the aggregated view until `stop` is cancelled
async fn report_loop(controller: Arc<Controller>, interval_secs: u64, stop: CancellationToken) {
    let mut timer = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            () = stop.cancelled() => return,
            _ = timer.tick() => {
                let (services, err) = controller.services();
                if let Some(err) = err {
                    warn!(error = %err, "Some registries failed to list services");
                }
                info!(
                    registries = controller.get_registries().len(),
                    services = services.len(),
                    gateways = controller.network_gateways().len(),
                    synced = controller.has_synced(),
                    "Aggregated view"
                );
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let config = Config::load(Some(args.config.as_str()))?;

    // 2. Validate configuration (fail fast on misconfigurations)
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 3. Initialize logging
    logging::init_logging(&config.logging)?;
    info!(config = %args.config, "meshreg starting...");

    // 4. Build the aggregator
    let mesh = Arc::new(MeshWatcher::new(Some(config.mesh.clone())));
    let controller = Arc::new(bootstrap::build_controller(&config, mesh));
    if config.registries.is_empty() {
        warn!("No registries configured");
    }

    // 5. Run until Ctrl-C
    let stop = CancellationToken::new();
    let reporter = tokio::spawn(report_loop(
        controller.clone(),
        config.aggregator.report_interval_secs,
        stop.clone(),
    ));

    let signal_stop = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal_stop.cancel();
    });

    controller.run(stop).await;

    if let Err(e) = reporter.await {
        error!("Reporter task failed: {}", e);
    }
    match metrics::gather_metrics() {
        Ok(text) => debug!(metrics = %text, "Final metrics"),
        Err(e) => warn!("Failed to gather metrics: {}", e),
    }
    info!("meshreg stopped");
    Ok(())
}
