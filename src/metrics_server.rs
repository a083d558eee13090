// src/metrics_server.rs - Prometheus exporter for the engine counters

use axum::{routing::get, Router};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::MetricsConfig;
use crate::engine::Engine;
use crate::error::{Result, ScadaError};

/// Metrics server that exposes Prometheus metrics
pub struct MetricsServer {
    config: MetricsConfig,
    handle: PrometheusHandle,
    engine: Arc<Engine>,
}

impl MetricsServer {
    /// Install the Prometheus recorder and create the server
    pub fn new(config: MetricsConfig, engine: Arc<Engine>) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| ScadaError::Config(format!("metrics recorder: {}", e)))?;
        crate::describe_metrics();
        Ok(Self {
            config,
            handle,
            engine,
        })
    }

    /// Gauges are sampled from the engine on every scrape
    fn render(handle: &PrometheusHandle, engine: &Engine) -> String {
        match engine.alarm_stats() {
            Ok(stats) => {
                gauge!("scada_alarms_open", "state" => "active").set(stats.active as f64);
                gauge!("scada_alarms_open", "state" => "acknowledged")
                    .set(stats.acknowledged as f64);
            }
            Err(e) => warn!("Could not sample alarm stats: {}", e),
        }
        gauge!("scada_uptime_seconds").set(engine.stats().uptime_secs as f64);
        handle.render()
    }

    /// Serve `/metrics` until `shutdown` turns true
    pub async fn start(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let handle = self.handle.clone();
        let engine = self.engine.clone();
        let app = Router::new().route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                let engine = engine.clone();
                async move { Self::render(&handle, &engine) }
            }),
        );

        let listener = TcpListener::bind(&self.config.bind_address).await?;
        info!("Metrics server listening on {}", self.config.bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await?;
        Ok(())
    }
}
