// src/lifecycle.rs - Alarm state transitions
//
//   ACTIVE ──acknowledge──► ACKNOWLEDGED
//     │                          │
//     └──resolve / auto──► RESOLVED ◄──resolve──┘
//
// RESOLVED is terminal. Every check-then-act runs under the definition lock
// shared with the evaluator.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

#[cfg(feature = "metrics")]
use metrics::counter;

use crate::error::{Result, ScadaError};
use crate::hub::{Event, NotificationHub};
use crate::model::{ActorId, Alarm, AlarmId, AlarmState, DefinitionId};
use crate::storage::AlarmRepository;
use crate::sync::KeyedLocks;

impl Alarm {
    /// ACTIVE → ACKNOWLEDGED
    pub fn acknowledge(&mut self, actor: ActorId, at: DateTime<Utc>) -> Result<()> {
        if self.state != AlarmState::Active {
            return Err(self.invalid(AlarmState::Acknowledged));
        }
        self.state = AlarmState::Acknowledged;
        self.acknowledged_at = Some(at);
        self.acknowledged_by = Some(actor);
        Ok(())
    }

    /// ACTIVE or ACKNOWLEDGED → RESOLVED
    pub fn resolve(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.state == AlarmState::Resolved {
            return Err(self.invalid(AlarmState::Resolved));
        }
        self.state = AlarmState::Resolved;
        self.resolved_at = Some(at);
        Ok(())
    }

    fn invalid(&self, to: AlarmState) -> ScadaError {
        ScadaError::InvalidTransition {
            alarm_id: self.id,
            from: self.state,
            to,
        }
    }
}

/// Operator-driven alarm transitions
pub struct AlarmLifecycle {
    alarms: Arc<dyn AlarmRepository>,
    hub: NotificationHub,
    locks: Arc<KeyedLocks<DefinitionId>>,
}

impl AlarmLifecycle {
    pub fn new(
        alarms: Arc<dyn AlarmRepository>,
        hub: NotificationHub,
        locks: Arc<KeyedLocks<DefinitionId>>,
    ) -> Self {
        Self { alarms, hub, locks }
    }

    /// Acknowledge an ACTIVE alarm on behalf of `actor`
    pub fn acknowledge(&self, alarm_id: AlarmId, actor: ActorId) -> Result<Alarm> {
        let alarm = self.transition(
            alarm_id,
            |alarm| alarm.acknowledge(actor, Utc::now()),
            Event::alarm_acknowledged,
        )?;
        info!("Alarm {} acknowledged by {}", alarm.id, actor);

        #[cfg(feature = "metrics")]
        counter!("scada_alarms_acknowledged_total").increment(1);

        Ok(alarm)
    }

    /// Manually resolve an ACTIVE or ACKNOWLEDGED alarm
    pub fn resolve(&self, alarm_id: AlarmId) -> Result<Alarm> {
        let alarm = self.transition(
            alarm_id,
            |alarm| alarm.resolve(Utc::now()),
            Event::alarm_resolved,
        )?;
        info!("Alarm {} resolved manually", alarm.id);

        #[cfg(feature = "metrics")]
        counter!("scada_alarms_resolved_total", "mode" => "manual").increment(1);

        Ok(alarm)
    }

    /// Apply, persist and publish under the definition lock
    fn transition<F>(&self, alarm_id: AlarmId, apply: F, event: fn(&Alarm) -> Event) -> Result<Alarm>
    where
        F: FnOnce(&mut Alarm) -> Result<()>,
    {
        // definition_id never changes, so it can be read before locking
        let definition_id = self.alarms.get(alarm_id)?.definition_id;
        let lock = self.locks.handle(definition_id);
        let _guard = lock.lock();

        let mut alarm = self.alarms.get(alarm_id)?;
        apply(&mut alarm)?;
        self.alarms.save(&alarm)?;
        self.hub.publish(event(&alarm));
        Ok(alarm)
    }
}
