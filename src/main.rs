use anyhow::{Context, Result};
use pipeline_scada::{simulation::Simulator, Config, Engine};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    pipeline_scada::init()?;

    let config_path = match std::env::args().nth(1) {
        Some(path) if path == "--version" => {
            pipeline_scada::print_system_info();
            return Ok(());
        }
        Some(path) => path,
        None => {
            error!("Usage: pipeline-scada <config.yaml>");
            std::process::exit(1);
        }
    };

    let config = Config::from_file(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;
    let engine = Arc::new(Engine::new(&config).context("building engine")?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks: Vec<(&str, JoinHandle<()>)> = Vec::new();

    if config.simulation.enabled {
        let simulator = Simulator::new(engine.clone(), config.simulation.clone());
        tasks.push(("simulator", tokio::spawn(simulator.run(shutdown_rx.clone()))));
    }

    #[cfg(feature = "web")]
    if let Some(server) = config.server.clone() {
        let engine = engine.clone();
        let shutdown = shutdown_rx.clone();
        tasks.push((
            "web",
            tokio::spawn(async move {
                if let Err(e) =
                    pipeline_scada::web::start_server(engine, &server.bind_address, shutdown).await
                {
                    error!("Web server error: {}", e);
                }
            }),
        ));
    }

    #[cfg(feature = "metrics")]
    if let Some(metrics) = config.metrics.clone() {
        let server = pipeline_scada::MetricsServer::new(metrics, engine.clone())
            .context("starting metrics exporter")?;
        let shutdown = shutdown_rx.clone();
        tasks.push((
            "metrics",
            tokio::spawn(async move {
                if let Err(e) = server.start(shutdown).await {
                    error!("Metrics server error: {}", e);
                }
            }),
        ));
    }

    info!("pipeline-scada running, press Ctrl-C to stop");
    signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);
    for (name, task) in tasks {
        if let Err(e) = task.await {
            error!("{} task failed: {}", name, e);
        }
    }

    let stats = engine.stats();
    info!(
        "Final stats: {} values ingested, {} rejected, {} alarms raised, {} events dropped",
        stats.values_ingested, stats.values_rejected, stats.alarms_raised, stats.hub.dropped
    );

    Ok(())
}
