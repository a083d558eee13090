// src/storage/mod.rs
//! Repository interfaces consumed by the engine
//!
//! The engine only ever talks to these traits. Durable backends live outside
//! this crate; [`memory`] provides the in-memory stores the binary and the
//! tests run on.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    Alarm, AlarmDefinition, AlarmId, AlarmState, DefinitionId, Severity, Tag, TagId, TagValue,
};

pub mod memory;

pub use memory::{MemoryAlarmStore, MemoryValueStore};

/// Read access to tags and their alarm definitions
#[cfg_attr(test, mockall::automock)]
pub trait TagRepository: Send + Sync {
    /// Resolve a tag; `NotFound` if it does not exist
    fn tag(&self, id: TagId) -> Result<Tag>;

    /// Enabled definitions bound to a tag, ordered by definition id
    fn enabled_definitions(&self, tag_id: TagId) -> Result<Vec<AlarmDefinition>>;

    /// Resolve a single definition; `NotFound` if it does not exist
    fn definition(&self, id: DefinitionId) -> Result<AlarmDefinition>;
}

/// Alarm persistence
#[cfg_attr(test, mockall::automock)]
pub trait AlarmRepository: Send + Sync {
    /// Allocate an id for a new alarm
    fn next_id(&self) -> AlarmId;

    /// The ACTIVE or ACKNOWLEDGED alarm of a definition, if any
    fn find_open(&self, definition_id: DefinitionId) -> Result<Option<Alarm>>;

    /// Resolve an alarm; `NotFound` if it does not exist
    fn get(&self, id: AlarmId) -> Result<Alarm>;

    /// Insert or replace an alarm
    fn save(&self, alarm: &Alarm) -> Result<()>;

    /// Alarms matching the filter, newest first
    fn list(&self, filter: &AlarmFilter) -> Result<Vec<Alarm>>;
}

/// Append-only tag value log
#[cfg_attr(test, mockall::automock)]
pub trait TagValueStore: Send + Sync {
    fn append(&self, value: TagValue) -> Result<()>;

    /// Most recently appended value for the tag
    fn latest(&self, tag_id: TagId) -> Result<Option<TagValue>>;

    /// Up to `limit` values ordered by timestamp, newest first
    fn history(&self, tag_id: TagId, limit: usize) -> Result<Vec<TagValue>>;
}

/// Alarm list filter; `None` fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlarmFilter {
    #[serde(default)]
    pub state: Option<AlarmState>,
    #[serde(default)]
    pub severity: Option<Severity>,
    /// Only ACTIVE or ACKNOWLEDGED alarms
    #[serde(default)]
    pub open_only: bool,
}

impl AlarmFilter {
    /// ACTIVE and ACKNOWLEDGED alarms
    pub fn open() -> Self {
        Self {
            open_only: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, alarm: &Alarm) -> bool {
        if self.open_only && !alarm.is_open() {
            return false;
        }
        if let Some(state) = self.state {
            if alarm.state != state {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            if alarm.severity != severity {
                return false;
            }
        }
        true
    }
}
