use thiserror::Error;

use crate::model::{AlarmId, AlarmState, DefinitionId, TagId};

/// Application level error type used throughout the crate.
#[derive(Error, Debug)]
pub enum ScadaError {
    /// Ingested value refers to a tag that does not exist
    #[error("Unknown tag: {0}")]
    UnknownTag(TagId),

    /// Value type or quality rejected by ingress
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Illegal alarm state change
    #[error("Invalid transition for alarm {alarm_id}: {from} -> {to}")]
    InvalidTransition {
        alarm_id: AlarmId,
        from: AlarmState,
        to: AlarmState,
    },

    /// Repository miss
    #[error("Not found: {0}")]
    NotFound(String),

    /// A single alarm definition could not be evaluated
    #[error("Evaluation of definition {definition_id} failed: {reason}")]
    Evaluation {
        definition_id: DefinitionId,
        reason: String,
    },

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O related failure
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    /// Error while parsing YAML configuration files
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Error while encoding wire events
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScadaError {
    /// Shorthand for a repository miss on a typed id
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        ScadaError::NotFound(format!("{} {}", kind, id))
    }
}

/// Convenient alias over [`Result`] using [`ScadaError`]
pub type Result<T> = std::result::Result<T, ScadaError>;
