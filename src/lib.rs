//! pipeline-scada - Alarm evaluation and notification core for pipeline monitoring
//!
//! Tag values flow in through [`Engine::ingest`], are checked against the
//! alarm definitions of their tag, and every resulting tag update and alarm
//! transition is fanned out to hub subscribers.
//!
//! # Feature Flags
//!
//! - **web** (default): axum REST API and `/ws/tags/`, `/ws/alarms/` sockets
//! - **metrics**: `metrics` counters and a Prometheus exporter on `/metrics`
//!
//! # Examples
//!
//! ```rust
//! use pipeline_scada::{Config, Engine, Topic, Value};
//!
//! let config = Config::from_yaml(r#"
//! object_types:
//!   - name: pump_station
//! pipeline_objects:
//!   - { object_type: pump_station, name: PS-1, index: 1 }
//! tag_templates:
//!   - { object_type: pump_station, name_template: "PRESSURE_IN_{index}", max_value: 200 }
//! alarm_definitions:
//!   - { name: High inlet pressure, tag: PRESSURE_IN_1, condition: GT, trigger_value: 100 }
//! "#)?;
//! let engine = Engine::new(&config)?;
//! let mut alarms = engine.subscribe(Topic::AlarmUpdates);
//!
//! let tag = engine.catalog().tag_by_name("PRESSURE_IN_1")?;
//! let report = engine.ingest_now(tag.id, Value::Float(120.0))?;
//! assert_eq!(report.raised().count(), 1);
//! assert_eq!(alarms.try_recv().unwrap().kind(), "alarm_raised");
//! # Ok::<(), pipeline_scada::ScadaError>(())
//! ```

// ============================================================================
// CORE MODULES
// ============================================================================

/// Error taxonomy and the crate `Result` alias
pub mod error;

/// Typed tag values and quality scores
pub mod value;

/// Tags, tag values, alarm definitions and alarms
pub mod model;

/// Repository traits and in-memory stores
pub mod storage;

/// Object types, pipeline objects, tag templates and tag instantiation
pub mod catalog;

/// Keyed locks
pub mod sync;

/// Notification hub
pub mod hub;

/// Alarm condition evaluation
pub mod evaluator;

/// Alarm lifecycle transitions
pub mod lifecycle;

/// Tag value ingestion
pub mod ingress;

/// Engine facade
pub mod engine;

/// YAML configuration
pub mod config;

/// Random walk value simulator
pub mod simulation;

// ============================================================================
// NETWORK MODULES (feature-gated)
// ============================================================================

/// REST API and websocket adapters
#[cfg(feature = "web")]
pub mod web;

/// Prometheus exporter
#[cfg(feature = "metrics")]
pub mod metrics_server;

// ============================================================================
// PUBLIC API EXPORTS
// ============================================================================

pub use catalog::Catalog;
pub use config::Config;
pub use engine::{AlarmStats, Engine, EngineStats};
pub use error::{Result, ScadaError};
pub use evaluator::{AlarmTransition, EvaluationReport};
pub use hub::{Event, HubStats, NotificationHub, Subscription, Topic};
pub use model::{
    Alarm, AlarmDefinition, AlarmState, Condition, Severity, Tag, TagValue,
};
pub use storage::{AlarmFilter, AlarmRepository, TagRepository, TagValueStore};
pub use value::{DataType, Quality, Value};

#[cfg(feature = "metrics")]
pub use metrics_server::MetricsServer;

// ============================================================================
// VERSION INFORMATION
// ============================================================================

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build information
pub mod build_info {
    /// Git commit hash (if available)
    pub const GIT_HASH: Option<&str> = option_env!("SCADA_GIT_HASH");

    /// Build timestamp
    pub const BUILD_TIMESTAMP: &str = env!("SCADA_BUILD_TIMESTAMP");

    /// Rust version used for compilation
    pub const RUSTC_VERSION: &str = env!("SCADA_RUSTC_VERSION");

    /// Target triple
    pub const TARGET: &str = env!("SCADA_TARGET");

    /// Build profile (debug/release)
    pub const PROFILE: &str = env!("SCADA_PROFILE");
}

// ============================================================================
// INITIALIZATION
// ============================================================================

/// Install logging and, with the `metrics` feature, metric descriptions
///
/// The log filter comes from `RUST_LOG` and defaults to
/// `pipeline_scada=info`. Calling this more than once is harmless.
pub fn init() -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pipeline_scada=info"));

    // Already initialized by the host application
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();

    #[cfg(feature = "metrics")]
    describe_metrics();

    tracing::info!(
        "pipeline-scada {} ({}, {})",
        VERSION,
        build_info::PROFILE,
        build_info::GIT_HASH.unwrap_or("unknown revision")
    );
    Ok(())
}

#[cfg(feature = "metrics")]
pub(crate) fn describe_metrics() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!("scada_values_ingested_total", "Tag values accepted by ingress");
    describe_counter!("scada_values_rejected_total", "Tag values rejected by ingress");
    describe_counter!("scada_alarms_raised_total", "Alarms raised, by severity");
    describe_counter!("scada_alarms_resolved_total", "Alarms resolved, by mode (auto/manual)");
    describe_counter!("scada_alarms_acknowledged_total", "Alarms acknowledged by operators");
    describe_counter!("scada_evaluation_failures_total", "Alarm definitions that failed to evaluate");
    describe_counter!("scada_hub_events_published_total", "Events published to the hub, by topic");
    describe_counter!("scada_hub_events_dropped_total", "Events dropped from full subscriber queues");
    describe_counter!("scada_websocket_frames_skipped_total", "Websocket frames skipped because the payload did not encode");
    describe_gauge!("scada_hub_subscribers", "Current hub subscribers");
    describe_gauge!("scada_alarms_open", "Open alarms, by state");
    describe_gauge!("scada_uptime_seconds", "Engine uptime in seconds");
}

/// Print version and build information to stdout
pub fn print_system_info() {
    println!("pipeline-scada {}", VERSION);
    if let Some(git_hash) = build_info::GIT_HASH {
        println!("Git Hash: {}", git_hash);
    }
    println!("Build Timestamp: {}", build_info::BUILD_TIMESTAMP);
    println!("Build Target: {}", build_info::TARGET);
    println!("Build Profile: {}", build_info::PROFILE);
    println!("Rust Version: {}", build_info::RUSTC_VERSION);
}
