// src/storage/memory.rs
//! In-memory alarm and tag value stores

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

use super::{AlarmFilter, AlarmRepository, TagValueStore};
use crate::error::{Result, ScadaError};
use crate::model::{Alarm, AlarmId, DefinitionId, TagId, TagValue};

/// Alarm store with an index of the open alarm per definition
#[derive(Debug)]
pub struct MemoryAlarmStore {
    alarms: DashMap<AlarmId, Alarm>,
    open: DashMap<DefinitionId, AlarmId>,
    next_id: AtomicU64,
}

impl MemoryAlarmStore {
    pub fn new() -> Self {
        Self {
            alarms: DashMap::new(),
            open: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.alarms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }
}

impl Default for MemoryAlarmStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AlarmRepository for MemoryAlarmStore {
    fn next_id(&self) -> AlarmId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn find_open(&self, definition_id: DefinitionId) -> Result<Option<Alarm>> {
        let id = match self.open.get(&definition_id) {
            Some(entry) => *entry.value(),
            None => return Ok(None),
        };
        Ok(self.alarms.get(&id).map(|entry| entry.value().clone()))
    }

    fn get(&self, id: AlarmId) -> Result<Alarm> {
        self.alarms
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ScadaError::not_found("alarm", id))
    }

    fn save(&self, alarm: &Alarm) -> Result<()> {
        trace!("Saving alarm {} in state {}", alarm.id, alarm.state);
        self.alarms.insert(alarm.id, alarm.clone());
        if alarm.is_open() {
            self.open.insert(alarm.definition_id, alarm.id);
        } else {
            self.open
                .remove_if(&alarm.definition_id, |_, open_id| *open_id == alarm.id);
        }
        Ok(())
    }

    fn list(&self, filter: &AlarmFilter) -> Result<Vec<Alarm>> {
        let mut alarms: Vec<Alarm> = self
            .alarms
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        alarms.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at).then(b.id.cmp(&a.id)));
        Ok(alarms)
    }
}

/// Per-tag value log with an optional retention bound
///
/// `retention == 0` keeps every value.
#[derive(Debug)]
pub struct MemoryValueStore {
    series: DashMap<TagId, VecDeque<TagValue>>,
    retention: usize,
}

impl MemoryValueStore {
    pub fn new(retention: usize) -> Self {
        Self {
            series: DashMap::new(),
            retention,
        }
    }

    /// Number of values currently retained for a tag
    pub fn len(&self, tag_id: TagId) -> usize {
        self.series.get(&tag_id).map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for MemoryValueStore {
    fn default() -> Self {
        Self::new(0)
    }
}

impl TagValueStore for MemoryValueStore {
    fn append(&self, value: TagValue) -> Result<()> {
        let mut series = self.series.entry(value.tag_id).or_default();
        series.push_back(value);
        if self.retention > 0 {
            while series.len() > self.retention {
                series.pop_front();
            }
        }
        Ok(())
    }

    fn latest(&self, tag_id: TagId) -> Result<Option<TagValue>> {
        Ok(self
            .series
            .get(&tag_id)
            .and_then(|series| series.back().cloned()))
    }

    fn history(&self, tag_id: TagId, limit: usize) -> Result<Vec<TagValue>> {
        let mut values: Vec<TagValue> = match self.series.get(&tag_id) {
            Some(series) => series.iter().rev().cloned().collect(),
            None => return Ok(Vec::new()),
        };
        // Stable sort keeps later arrivals first among equal timestamps
        values.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        values.truncate(limit);
        Ok(values)
    }
}
