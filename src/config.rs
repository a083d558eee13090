// src/config.rs - Engine, server and seed data configuration

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::catalog::{Catalog, NewAlarmDefinition, NewPipelineObject, NewTag, NewTagTemplate};
use crate::error::{Result, ScadaError};
use crate::model::{Condition, Severity};
use crate::value::DataType;

// ============================================================================
// MAIN CONFIGURATION
// ============================================================================

/// Main pipeline-scada configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// HTTP/websocket server; disabled when absent
    #[serde(default)]
    pub server: Option<ServerConfig>,

    /// Prometheus exporter; disabled when absent
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,

    /// Random value simulator
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Object type definitions
    #[serde(default)]
    pub object_types: Vec<ObjectTypeConfig>,

    /// Pipeline objects, bound to object types by name
    #[serde(default)]
    pub pipeline_objects: Vec<PipelineObjectConfig>,

    /// Tag templates, bound to object types by name
    #[serde(default)]
    pub tag_templates: Vec<TagTemplateConfig>,

    /// Hand-made tags, bound to pipeline objects by name
    #[serde(default)]
    pub tags: Vec<TagConfig>,

    /// Instantiate templates for every pipeline object on startup
    #[serde(default = "default_true")]
    pub materialize_tags: bool,

    /// Alarm definitions, bound to tags by name
    #[serde(default)]
    pub alarm_definitions: Vec<AlarmDefinitionConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            server: None,
            metrics: None,
            simulation: SimulationConfig::default(),
            object_types: Vec::new(),
            pipeline_objects: Vec::new(),
            tag_templates: Vec::new(),
            tags: Vec::new(),
            materialize_tags: default_true(),
            alarm_definitions: Vec::new(),
        }
    }
}

impl Config {
    /// Load and validate a YAML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&contents)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that do not need a catalog
    pub fn validate(&self) -> Result<()> {
        if self.engine.queue_capacity == 0 {
            return Err(ScadaError::Config(
                "engine.queue_capacity must be at least 1".into(),
            ));
        }
        if self.simulation.enabled && self.simulation.interval_ms == 0 {
            return Err(ScadaError::Config(
                "simulation.interval_ms must be greater than zero".into(),
            ));
        }

        let mut type_names = HashSet::new();
        for object_type in &self.object_types {
            if !type_names.insert(object_type.name.as_str()) {
                return Err(ScadaError::Config(format!(
                    "duplicate object type '{}'",
                    object_type.name
                )));
            }
        }

        for object in &self.pipeline_objects {
            if !type_names.contains(object.object_type.as_str()) {
                return Err(ScadaError::Config(format!(
                    "pipeline object '{}' references unknown object type '{}'",
                    object.name, object.object_type
                )));
            }
        }

        for template in &self.tag_templates {
            if !type_names.contains(template.object_type.as_str()) {
                return Err(ScadaError::Config(format!(
                    "tag template '{}' references unknown object type '{}'",
                    template.name_template, template.object_type
                )));
            }
            check_range(&template.name_template, template.min_value, template.max_value)?;
        }

        for tag in &self.tags {
            check_range(&tag.name, tag.min_value, tag.max_value)?;
        }

        for definition in &self.alarm_definitions {
            if !definition.trigger_value.is_finite() {
                return Err(ScadaError::Config(format!(
                    "alarm definition '{}' has a non-finite trigger value",
                    definition.name
                )));
            }
        }

        Ok(())
    }

    /// Build a catalog holding the configured seed data
    ///
    /// Alarm definitions are bound after templates are materialized, so they
    /// may reference instantiated tag names.
    pub fn build_catalog(&self) -> Result<Catalog> {
        let catalog = Catalog::new();

        for object_type in &self.object_types {
            catalog.add_object_type(&object_type.name, &object_type.description)?;
        }

        for object in &self.pipeline_objects {
            let object_type = catalog.object_type_by_name(&object.object_type)?;
            catalog.add_pipeline_object(NewPipelineObject {
                object_type: object_type.id,
                name: object.name.clone(),
                index: object.index.clone(),
                description: object.description.clone(),
                location: object.location.clone(),
                km_mark: object.km_mark,
            })?;
        }

        for template in &self.tag_templates {
            let object_type = catalog.object_type_by_name(&template.object_type)?;
            catalog.add_template(NewTagTemplate {
                object_type: object_type.id,
                name_template: template.name_template.clone(),
                description_template: template.description_template.clone(),
                data_type: template.data_type,
                engineering_units: template.engineering_units.clone(),
                min_value: template.min_value,
                max_value: template.max_value,
            })?;
        }

        if self.materialize_tags {
            catalog.materialize_tags()?;
        }

        for tag in &self.tags {
            let object = catalog.pipeline_object_by_name(&tag.object)?;
            catalog.add_tag(NewTag {
                name: tag.name.clone(),
                description: tag.description.clone(),
                data_type: tag.data_type,
                engineering_units: tag.engineering_units.clone(),
                min_value: tag.min_value,
                max_value: tag.max_value,
                pipeline_object: object.id,
            })?;
        }

        for definition in &self.alarm_definitions {
            let tag = catalog.tag_by_name(&definition.tag).map_err(|_| {
                ScadaError::Config(format!(
                    "alarm definition '{}' references unknown tag '{}'",
                    definition.name, definition.tag
                ))
            })?;
            catalog.add_definition(NewAlarmDefinition {
                tag_id: tag.id,
                name: definition.name.clone(),
                condition: definition.condition,
                trigger_value: definition.trigger_value,
                message: definition.message.clone(),
                severity: definition.severity,
                enabled: definition.enabled,
            })?;
        }

        Ok(catalog)
    }
}

fn check_range(name: &str, min_value: f64, max_value: f64) -> Result<()> {
    if min_value > max_value {
        return Err(ScadaError::Config(format!(
            "'{}' has min_value {} above max_value {}",
            name, min_value, max_value
        )));
    }
    Ok(())
}

// ============================================================================
// ENGINE CONFIGURATION
// ============================================================================

/// Engine runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-subscriber notification queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Values kept per tag by the in-memory store (0 = unbounded)
    #[serde(default = "default_history_retention")]
    pub history_retention: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            history_retention: default_history_retention(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_bind")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_server_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_bind")]
    pub bind_address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            bind_address: default_metrics_bind(),
        }
    }
}

/// Random walk simulator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Fixed RNG seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,

    /// Largest step per tick, as a percentage of the tag range
    #[serde(default = "default_step_percent")]
    pub step_percent: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: default_interval_ms(),
            seed: None,
            step_percent: default_step_percent(),
        }
    }
}

// ============================================================================
// SEED DATA
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectTypeConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineObjectConfig {
    /// Object type name
    pub object_type: String,
    pub name: String,
    /// Substituted verbatim for `{index}`; quote it to keep leading zeros
    #[serde(deserialize_with = "index_from_scalar")]
    pub index: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub km_mark: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagTemplateConfig {
    /// Object type name
    pub object_type: String,
    pub name_template: String,
    #[serde(default)]
    pub description_template: String,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub engineering_units: String,
    #[serde(default = "default_min_value")]
    pub min_value: f64,
    #[serde(default = "default_max_value")]
    pub max_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagConfig {
    pub name: String,
    /// Pipeline object name
    pub object: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub engineering_units: String,
    #[serde(default = "default_min_value")]
    pub min_value: f64,
    #[serde(default = "default_max_value")]
    pub max_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmDefinitionConfig {
    pub name: String,
    /// Tag name
    pub tag: String,
    pub condition: Condition,
    #[serde(default)]
    pub trigger_value: f64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Accept `index: 7` as well as `index: "007"`
fn index_from_scalar<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Number(u64),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Text(s) => s,
        Scalar::Number(n) => n.to_string(),
    })
}

// ============================================================================
// DEFAULTS
// ============================================================================

fn default_true() -> bool { true }
fn default_queue_capacity() -> usize { crate::hub::DEFAULT_QUEUE_CAPACITY }
fn default_history_retention() -> usize { 10_000 }
fn default_server_bind() -> String { "0.0.0.0:8000".to_string() }
fn default_metrics_bind() -> String { "0.0.0.0:9090".to_string() }
fn default_interval_ms() -> u64 { 1000 }
fn default_step_percent() -> f64 { 2.0 }
fn default_min_value() -> f64 { 0.0 }
fn default_max_value() -> f64 { 100.0 }
