// src/evaluator.rs - Alarm condition evaluation
//
// For every incoming tag value the evaluator walks the enabled definitions of
// the tag in id order and decides, under each definition's lock, whether to
// raise a new alarm, suppress a duplicate or auto-resolve an ACTIVE alarm.
// A definition that cannot be evaluated is reported and skipped; it never
// stops its siblings.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

#[cfg(feature = "metrics")]
use metrics::counter;

use crate::error::{Result, ScadaError};
use crate::hub::{Event, NotificationHub};
use crate::model::{Alarm, AlarmDefinition, AlarmState, Condition, DefinitionId, Tag, TagId};
use crate::storage::{AlarmRepository, TagRepository};
use crate::sync::KeyedLocks;
use crate::value::Value;

/// Alarm state change decided by the evaluator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "alarm", rename_all = "snake_case")]
pub enum AlarmTransition {
    Raised(Alarm),
    Resolved(Alarm),
}

impl AlarmTransition {
    pub fn alarm(&self) -> &Alarm {
        match self {
            AlarmTransition::Raised(a) | AlarmTransition::Resolved(a) => a,
        }
    }
}

/// Outcome of evaluating one tag value
#[derive(Debug, Default)]
pub struct EvaluationReport {
    pub transitions: Vec<AlarmTransition>,
    /// Per-definition failures; these never abort the evaluation
    pub failures: Vec<ScadaError>,
}

impl EvaluationReport {
    pub fn raised(&self) -> impl Iterator<Item = &Alarm> {
        self.transitions.iter().filter_map(|t| match t {
            AlarmTransition::Raised(a) => Some(a),
            _ => None,
        })
    }

    pub fn resolved(&self) -> impl Iterator<Item = &Alarm> {
        self.transitions.iter().filter_map(|t| match t {
            AlarmTransition::Resolved(a) => Some(a),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty() && self.failures.is_empty()
    }
}

fn evaluation_error(definition: &AlarmDefinition, reason: impl Into<String>) -> ScadaError {
    ScadaError::Evaluation {
        definition_id: definition.id,
        reason: reason.into(),
    }
}

fn numeric_operands(definition: &AlarmDefinition, value: &Value) -> Result<(f64, f64)> {
    if !definition.trigger_value.is_finite() {
        return Err(evaluation_error(
            definition,
            format!("trigger value {} is not finite", definition.trigger_value),
        ));
    }
    let v = value.as_float().ok_or_else(|| {
        evaluation_error(
            definition,
            format!(
                "{} value cannot be compared with {}",
                value.type_name(),
                definition.condition
            ),
        )
    })?;
    Ok((v, definition.trigger_value))
}

/// Whether a value satisfies a definition's condition
///
/// Numeric conditions read booleans as 0/1. EQ is an exact comparison.
/// CHANGE needs a previous value and never qualifies without one.
///
/// ```rust
/// use pipeline_scada::evaluator::qualifies;
/// use pipeline_scada::{AlarmDefinition, Condition, Severity, Value};
///
/// let def = AlarmDefinition {
///     id: 1,
///     tag_id: 1,
///     name: "High pressure".into(),
///     condition: Condition::GreaterThan,
///     trigger_value: 100.0,
///     message: String::new(),
///     severity: Severity::High,
///     enabled: true,
/// };
/// assert!(qualifies(&def, &Value::Float(120.0), None).unwrap());
/// assert!(!qualifies(&def, &Value::Float(100.0), None).unwrap());
/// ```
pub fn qualifies(
    definition: &AlarmDefinition,
    value: &Value,
    previous: Option<&Value>,
) -> Result<bool> {
    match definition.condition {
        Condition::Change => Ok(matches!(previous, Some(prev) if prev != value)),
        Condition::GreaterThan => {
            let (v, threshold) = numeric_operands(definition, value)?;
            Ok(v > threshold)
        }
        Condition::LessThan => {
            let (v, threshold) = numeric_operands(definition, value)?;
            Ok(v < threshold)
        }
        Condition::Equal => {
            let (v, threshold) = numeric_operands(definition, value)?;
            Ok(v == threshold)
        }
    }
}

/// Applies alarm definitions to incoming tag values
pub struct AlarmEvaluator {
    tags: Arc<dyn TagRepository>,
    alarms: Arc<dyn AlarmRepository>,
    hub: NotificationHub,
    locks: Arc<KeyedLocks<DefinitionId>>,
}

impl AlarmEvaluator {
    pub fn new(
        tags: Arc<dyn TagRepository>,
        alarms: Arc<dyn AlarmRepository>,
        hub: NotificationHub,
        locks: Arc<KeyedLocks<DefinitionId>>,
    ) -> Self {
        Self {
            tags,
            alarms,
            hub,
            locks,
        }
    }

    /// Evaluate a value of the tag with the given id
    pub fn evaluate(
        &self,
        tag_id: TagId,
        value: &Value,
        previous: Option<&Value>,
    ) -> Result<EvaluationReport> {
        let tag = self.tags.tag(tag_id).map_err(|e| match e {
            ScadaError::NotFound(_) => ScadaError::UnknownTag(tag_id),
            other => other,
        })?;
        Ok(self.evaluate_tag(&tag, value, previous))
    }

    /// Evaluate a value of an already resolved tag
    pub fn evaluate_tag(
        &self,
        tag: &Tag,
        value: &Value,
        previous: Option<&Value>,
    ) -> EvaluationReport {
        let mut report = EvaluationReport::default();

        let definitions = match self.tags.enabled_definitions(tag.id) {
            Ok(definitions) => definitions,
            Err(e) => {
                warn!("Could not load alarm definitions for tag '{}': {}", tag.name, e);
                report.failures.push(e);
                return report;
            }
        };
        trace!(
            "Evaluating {} definitions for tag '{}' = {}",
            definitions.len(),
            tag.name,
            value
        );

        for definition in &definitions {
            match self.apply(tag, definition, value, previous) {
                Ok(Some(transition)) => report.transitions.push(transition),
                Ok(None) => {}
                Err(e) => {
                    warn!("Alarm definition '{}' skipped: {}", definition.name, e);

                    #[cfg(feature = "metrics")]
                    counter!("scada_evaluation_failures_total").increment(1);

                    report.failures.push(e);
                }
            }
        }
        report
    }

    fn apply(
        &self,
        tag: &Tag,
        definition: &AlarmDefinition,
        value: &Value,
        previous: Option<&Value>,
    ) -> Result<Option<AlarmTransition>> {
        let qualifies = qualifies(definition, value, previous)?;

        let lock = self.locks.handle(definition.id);
        let _guard = lock.lock();

        match (qualifies, self.alarms.find_open(definition.id)?) {
            (true, None) => {
                let alarm = Alarm::raise(self.alarms.next_id(), definition, tag, value, Utc::now());
                self.alarms.save(&alarm)?;
                info!(
                    "Alarm {} raised [{}]: {}",
                    alarm.id, alarm.severity, alarm.message
                );
                self.hub.publish(Event::alarm_raised(&alarm));

                #[cfg(feature = "metrics")]
                counter!("scada_alarms_raised_total", "severity" => alarm.severity.to_string())
                    .increment(1);

                Ok(Some(AlarmTransition::Raised(alarm)))
            }
            (true, Some(open)) => {
                trace!(
                    "Definition '{}' still qualifies, alarm {} already {}",
                    definition.name,
                    open.id,
                    open.state
                );
                Ok(None)
            }
            (false, Some(mut alarm)) if alarm.state == AlarmState::Active => {
                alarm.resolve(Utc::now())?;
                self.alarms.save(&alarm)?;
                info!("Alarm {} cleared by value {}", alarm.id, value);
                self.hub.publish(Event::alarm_resolved(&alarm));

                #[cfg(feature = "metrics")]
                counter!("scada_alarms_resolved_total", "mode" => "auto").increment(1);

                Ok(Some(AlarmTransition::Resolved(alarm)))
            }
            (false, Some(alarm)) => {
                debug!(
                    "Alarm {} condition cleared while {}, waiting for operator",
                    alarm.id, alarm.state
                );
                Ok(None)
            }
            (false, None) => Ok(None),
        }
    }
}
