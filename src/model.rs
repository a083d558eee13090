// src/model.rs - Tags, tag values, alarm definitions and alarms
//
// Plain value records shared by the catalog, the stores and the engine.
// None of these types know how they are persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value::{DataType, Quality, Value};

pub type ObjectTypeId = u64;
pub type PipelineObjectId = u64;
pub type TemplateId = u64;
pub type TagId = u64;
pub type DefinitionId = u64;
pub type AlarmId = u64;
/// Operator identity recorded on acknowledgement
pub type ActorId = u64;

// ============================================================================
// TAGS
// ============================================================================

/// A measured or controlled point of a pipeline object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub data_type: DataType,
    #[serde(default)]
    pub engineering_units: String,
    pub min_value: f64,
    pub max_value: f64,
    #[serde(default)]
    pub archived: bool,
    pub pipeline_object: PipelineObjectId,
    /// Template the tag was instantiated from, if any
    #[serde(default)]
    pub template: Option<TemplateId>,
}

impl Tag {
    /// Whether a numeric reading lies inside the configured range
    pub fn in_range(&self, value: &Value) -> bool {
        match value.as_float() {
            Some(v) if self.data_type.is_numeric() => v >= self.min_value && v <= self.max_value,
            _ => true,
        }
    }
}

/// One immutable observation of a tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagValue {
    pub tag_id: TagId,
    pub value: Value,
    pub quality: Quality,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// ALARM DEFINITIONS
// ============================================================================

/// Alarm activation condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    /// Value strictly greater than the trigger value
    #[serde(rename = "GT")]
    GreaterThan,
    /// Value strictly less than the trigger value
    #[serde(rename = "LT")]
    LessThan,
    /// Value exactly equal to the trigger value (no tolerance)
    #[serde(rename = "EQ")]
    Equal,
    /// Value differs from the previous value of the tag
    #[serde(rename = "CHANGE")]
    Change,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Condition::GreaterThan => "GT",
            Condition::LessThan => "LT",
            Condition::Equal => "EQ",
            Condition::Change => "CHANGE",
        })
    }
}

/// Alarm severity, ordered from least to most critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Medium
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        })
    }
}

/// A rule bound to exactly one tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmDefinition {
    pub id: DefinitionId,
    pub tag_id: TagId,
    pub name: String,
    pub condition: Condition,
    /// Threshold for GT/LT/EQ; ignored by CHANGE
    #[serde(default)]
    pub trigger_value: f64,
    /// Message template, see [`AlarmDefinition::render_message`]
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl AlarmDefinition {
    /// Render the message template for a firing value
    ///
    /// Recognised placeholders: `{tag}`, `{value}`, `{trigger_value}`, `{units}`.
    /// An empty template falls back to the definition name.
    pub fn render_message(&self, tag: &Tag, value: &Value) -> String {
        if self.message.is_empty() {
            return self.name.clone();
        }
        self.message
            .replace("{tag}", &tag.name)
            .replace("{value}", &value.to_string())
            .replace("{trigger_value}", &self.trigger_value.to_string())
            .replace("{units}", &tag.engineering_units)
    }
}

// ============================================================================
// ALARMS
// ============================================================================

/// Alarm lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlarmState {
    Active,
    Acknowledged,
    Resolved,
}

impl AlarmState {
    /// ACTIVE and ACKNOWLEDGED alarms count against the de-duplication invariant
    pub fn is_open(&self) -> bool {
        !matches!(self, AlarmState::Resolved)
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlarmState::Active => "ACTIVE",
            AlarmState::Acknowledged => "ACKNOWLEDGED",
            AlarmState::Resolved => "RESOLVED",
        })
    }
}

/// A record of an alarm definition having fired
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub id: AlarmId,
    pub definition_id: DefinitionId,
    pub tag_id: TagId,
    /// Severity copied from the definition when raised
    pub severity: Severity,
    /// Rendered message at raise time
    pub message: String,
    /// Tag value that raised the alarm
    pub value: Value,
    pub triggered_at: DateTime<Utc>,
    pub state: AlarmState,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<ActorId>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alarm {
    /// Create a freshly raised alarm in the ACTIVE state
    pub fn raise(
        id: AlarmId,
        definition: &AlarmDefinition,
        tag: &Tag,
        value: &Value,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            definition_id: definition.id,
            tag_id: tag.id,
            severity: definition.severity,
            message: definition.render_message(tag, value),
            value: value.clone(),
            triggered_at: at,
            state: AlarmState::Active,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }
}
