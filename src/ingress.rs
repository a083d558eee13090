// src/ingress.rs - Tag value ingestion
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::{Result, ScadaError};
use crate::evaluator::{AlarmEvaluator, EvaluationReport};
use crate::hub::{Event, NotificationHub};
use crate::model::{TagId, TagValue};
use crate::storage::{TagRepository, TagValueStore};
use crate::sync::KeyedLocks;
use crate::value::{Quality, Value};

/// Validates, stores and evaluates incoming tag values
///
/// Values of one tag are serialized by a per-tag lock so the CHANGE
/// condition always compares against the value appended just before.
pub struct Ingress {
    tags: Arc<dyn TagRepository>,
    values: Arc<dyn TagValueStore>,
    evaluator: AlarmEvaluator,
    hub: NotificationHub,
    locks: KeyedLocks<TagId>,
}

impl Ingress {
    pub fn new(
        tags: Arc<dyn TagRepository>,
        values: Arc<dyn TagValueStore>,
        evaluator: AlarmEvaluator,
        hub: NotificationHub,
    ) -> Self {
        Self {
            tags,
            values,
            evaluator,
            hub,
            locks: KeyedLocks::new(),
        }
    }

    /// Accept one observation of a tag
    ///
    /// Fails with `UnknownTag` for an unresolvable id and `InvalidValue` for a
    /// type mismatch, a non-finite float or a quality above 100. On success the
    /// value is persisted, published and evaluated before returning.
    pub fn ingest(
        &self,
        tag_id: TagId,
        value: Value,
        quality: u8,
        timestamp: DateTime<Utc>,
    ) -> Result<EvaluationReport> {
        let tag = self.tags.tag(tag_id).map_err(|e| match e {
            ScadaError::NotFound(_) => ScadaError::UnknownTag(tag_id),
            other => other,
        })?;
        let quality = Quality::new(quality)?;
        let value = value.normalize_for(tag.data_type)?;

        if tag.archived {
            debug!("Value received for archived tag '{}'", tag.name);
        }
        if !tag.in_range(&value) {
            debug!(
                "Tag '{}' value {} outside [{}, {}]",
                tag.name, value, tag.min_value, tag.max_value
            );
        }

        let lock = self.locks.handle(tag_id);
        let _guard = lock.lock();

        let previous = self.values.latest(tag_id)?.map(|v| v.value);
        let record = TagValue {
            tag_id,
            value,
            quality,
            timestamp,
        };
        self.values.append(record.clone())?;
        trace!("Stored '{}' = {} (q={})", tag.name, record.value, record.quality);
        self.hub.publish(Event::tag_update(&record));

        Ok(self
            .evaluator
            .evaluate_tag(&tag, &record.value, previous.as_ref()))
    }
}
