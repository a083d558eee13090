// src/web/mod.rs - REST and websocket surface
pub mod handlers;
pub mod websocket;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use crate::engine::Engine;
use crate::error::{Result, ScadaError};

/// Shared state of every handler
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

impl ScadaError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ScadaError::UnknownTag(_) | ScadaError::NotFound(_) => StatusCode::NOT_FOUND,
            ScadaError::InvalidValue(_) | ScadaError::Json(_) => StatusCode::BAD_REQUEST,
            ScadaError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ScadaError::Evaluation { .. }
            | ScadaError::Config(_)
            | ScadaError::Io(_)
            | ScadaError::Yaml(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ScadaError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/stats", get(handlers::stats))
        .route("/api/tags", get(handlers::tags))
        .route("/api/tags/:id/values", post(handlers::ingest_value))
        .route("/api/tags/:id/history", get(handlers::tag_history))
        .route("/api/alarms", get(handlers::alarms))
        .route("/api/alarms/active", get(handlers::active_alarms))
        .route("/api/alarms/stats", get(handlers::alarm_stats))
        .route("/api/alarms/:id", get(handlers::alarm))
        .route("/api/alarms/:id/acknowledge", post(handlers::acknowledge_alarm))
        .route("/api/alarms/:id/resolve", post(handlers::resolve_alarm))
        .route("/ws/tags/", get(websocket::tags_socket))
        .route("/ws/alarms/", get(websocket::alarms_socket))
        .with_state(state)
}

/// Serve the API until `shutdown` turns true
pub async fn start_server(
    engine: Arc<Engine>,
    bind_address: &str,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let app = router(AppState::new(engine));
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("Web server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;

    info!("Web server stopped");
    Ok(())
}
