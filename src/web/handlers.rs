use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::engine::{AlarmStats, EngineStats};
use crate::error::ScadaError;
use crate::evaluator::EvaluationReport;
use crate::model::{ActorId, Alarm, AlarmId, Tag, TagId, TagValue};
use crate::storage::AlarmFilter;
use crate::value::{Quality, Value};

type ApiResult<T> = Result<Json<T>, ScadaError>;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime: u64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::VERSION.to_string(),
        uptime: state.engine.stats().uptime_secs,
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<EngineStats> {
    Json(state.engine.stats())
}

/// Paged-list envelope shared by the list endpoints
#[derive(Debug, Serialize)]
pub struct ItemList<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> From<Vec<T>> for ItemList<T> {
    fn from(items: Vec<T>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}

// ============================================================================
// TAGS
// ============================================================================

pub async fn tags(State(state): State<AppState>) -> Json<ItemList<Tag>> {
    Json(state.engine.catalog().tags().into())
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub value: Value,
    /// Defaults to 100
    #[serde(default)]
    pub quality: Option<i64>,
    /// Defaults to the time of receipt
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub raised: Vec<Alarm>,
    pub resolved: Vec<Alarm>,
    pub failures: Vec<String>,
}

impl From<EvaluationReport> for IngestResponse {
    fn from(report: EvaluationReport) -> Self {
        Self {
            raised: report.raised().cloned().collect(),
            resolved: report.resolved().cloned().collect(),
            failures: report.failures.iter().map(|e| e.to_string()).collect(),
        }
    }
}

pub async fn ingest_value(
    Path(tag_id): Path<TagId>,
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> ApiResult<IngestResponse> {
    let quality = match req.quality {
        None => Quality::GOOD.score(),
        Some(q) => u8::try_from(q)
            .map_err(|_| ScadaError::InvalidValue(format!("quality {} outside 0..=100", q)))?,
    };
    let timestamp = req.timestamp.unwrap_or_else(Utc::now);
    let report = state.engine.ingest(tag_id, req.value, quality, timestamp)?;
    Ok(Json(report.into()))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    100
}

pub async fn tag_history(
    Path(tag_id): Path<TagId>,
    Query(query): Query<HistoryQuery>,
    State(state): State<AppState>,
) -> ApiResult<ItemList<TagValue>> {
    Ok(Json(state.engine.history(tag_id, query.limit)?.into()))
}

// ============================================================================
// ALARMS
// ============================================================================

pub async fn alarms(
    Query(filter): Query<AlarmFilter>,
    State(state): State<AppState>,
) -> ApiResult<ItemList<Alarm>> {
    Ok(Json(state.engine.alarms(&filter)?.into()))
}

pub async fn active_alarms(State(state): State<AppState>) -> ApiResult<ItemList<Alarm>> {
    Ok(Json(state.engine.active_alarms()?.into()))
}

pub async fn alarm_stats(State(state): State<AppState>) -> ApiResult<AlarmStats> {
    Ok(Json(state.engine.alarm_stats()?))
}

pub async fn alarm(Path(id): Path<AlarmId>, State(state): State<AppState>) -> ApiResult<Alarm> {
    Ok(Json(state.engine.alarm(id)?))
}

#[derive(Debug, Deserialize)]
pub struct AcknowledgeRequest {
    pub acknowledged_by: ActorId,
}

pub async fn acknowledge_alarm(
    Path(id): Path<AlarmId>,
    State(state): State<AppState>,
    Json(req): Json<AcknowledgeRequest>,
) -> ApiResult<Alarm> {
    Ok(Json(state.engine.acknowledge(id, req.acknowledged_by)?))
}

pub async fn resolve_alarm(
    Path(id): Path<AlarmId>,
    State(state): State<AppState>,
) -> ApiResult<Alarm> {
    Ok(Json(state.engine.resolve(id)?))
}
