// src/engine.rs
//! Alarm engine facade
//!
//! Wires the catalog, the stores, the notification hub, ingress and the
//! lifecycle service together and keeps the engine counters.
//!
//! ```text
//! ingest ──► Ingress ──► TagValueStore
//!               │  └────► hub: tag_update
//!               ▼
//!         AlarmEvaluator ──► AlarmRepository
//!                      └───► hub: alarm_raised / alarm_resolved
//!
//! acknowledge / resolve ──► AlarmLifecycle ──► AlarmRepository, hub
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

#[cfg(feature = "metrics")]
use metrics::counter;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::Result;
use crate::evaluator::{AlarmEvaluator, EvaluationReport};
use crate::hub::{HubStats, NotificationHub, Subscription, SubscriptionId, Topic};
use crate::ingress::Ingress;
use crate::lifecycle::AlarmLifecycle;
use crate::model::{ActorId, Alarm, AlarmId, AlarmState, Severity, TagId, TagValue};
use crate::storage::{
    AlarmFilter, AlarmRepository, MemoryAlarmStore, MemoryValueStore, TagRepository,
    TagValueStore,
};
use crate::sync::KeyedLocks;
use crate::value::{Quality, Value};

/// Snapshot of the engine counters
#[derive(Clone, Debug, Default, Serialize)]
pub struct EngineStats {
    pub uptime_secs: u64,
    pub values_ingested: u64,
    pub values_rejected: u64,
    pub alarms_raised: u64,
    pub alarms_resolved: u64,
    pub alarms_acknowledged: u64,
    pub evaluation_failures: u64,
    pub tag_count: usize,
    pub definition_count: usize,
    pub hub: HubStats,
}

/// Alarm totals by state and severity
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AlarmStats {
    pub total: usize,
    pub active: usize,
    pub acknowledged: usize,
    pub resolved: usize,
    pub by_severity: BTreeMap<Severity, usize>,
}

#[derive(Debug, Default)]
struct Counters {
    values_ingested: AtomicU64,
    values_rejected: AtomicU64,
    alarms_raised: AtomicU64,
    alarms_resolved: AtomicU64,
    alarms_acknowledged: AtomicU64,
    evaluation_failures: AtomicU64,
}

pub struct Engine {
    catalog: Arc<Catalog>,
    alarms: Arc<dyn AlarmRepository>,
    values: Arc<dyn TagValueStore>,
    hub: NotificationHub,
    ingress: Ingress,
    lifecycle: AlarmLifecycle,
    counters: Counters,
    start_time: Instant,
}

impl Engine {
    /// Build an engine with in-memory stores from a configuration
    pub fn new(config: &Config) -> Result<Self> {
        let catalog = Arc::new(config.build_catalog()?);
        let engine = Self::with_stores(
            catalog,
            Arc::new(MemoryAlarmStore::new()),
            Arc::new(MemoryValueStore::new(config.engine.history_retention)),
            NotificationHub::new(config.engine.queue_capacity),
        );
        info!(
            "Engine ready: {} tags, {} alarm definitions",
            engine.catalog.tags().len(),
            engine.catalog.definitions().len()
        );
        Ok(engine)
    }

    /// Build an engine over caller-provided stores
    pub fn with_stores(
        catalog: Arc<Catalog>,
        alarms: Arc<dyn AlarmRepository>,
        values: Arc<dyn TagValueStore>,
        hub: NotificationHub,
    ) -> Self {
        let tags: Arc<dyn TagRepository> = catalog.clone();
        let definition_locks = Arc::new(KeyedLocks::new());

        let evaluator = AlarmEvaluator::new(
            tags.clone(),
            alarms.clone(),
            hub.clone(),
            definition_locks.clone(),
        );
        let ingress = Ingress::new(tags, values.clone(), evaluator, hub.clone());
        let lifecycle = AlarmLifecycle::new(alarms.clone(), hub.clone(), definition_locks);

        Self {
            catalog,
            alarms,
            values,
            hub,
            ingress,
            lifecycle,
            counters: Counters::default(),
            start_time: Instant::now(),
        }
    }

    // ------------------------------------------------------------------------
    // Ingestion and transitions
    // ------------------------------------------------------------------------

    /// Ingest one tag value; see [`Ingress::ingest`]
    pub fn ingest(
        &self,
        tag_id: TagId,
        value: Value,
        quality: u8,
        timestamp: DateTime<Utc>,
    ) -> Result<EvaluationReport> {
        let report = match self.ingress.ingest(tag_id, value, quality, timestamp) {
            Ok(report) => report,
            Err(e) => {
                self.counters.values_rejected.fetch_add(1, Ordering::Relaxed);
                debug!("Rejected value for tag {}: {}", tag_id, e);

                #[cfg(feature = "metrics")]
                counter!("scada_values_rejected_total").increment(1);

                return Err(e);
            }
        };

        self.counters.values_ingested.fetch_add(1, Ordering::Relaxed);
        self.counters
            .alarms_raised
            .fetch_add(report.raised().count() as u64, Ordering::Relaxed);
        self.counters
            .alarms_resolved
            .fetch_add(report.resolved().count() as u64, Ordering::Relaxed);
        self.counters
            .evaluation_failures
            .fetch_add(report.failures.len() as u64, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        counter!("scada_values_ingested_total").increment(1);

        Ok(report)
    }

    /// Ingest a good-quality value stamped with the current time
    pub fn ingest_now(&self, tag_id: TagId, value: Value) -> Result<EvaluationReport> {
        self.ingest(tag_id, value, Quality::GOOD.score(), Utc::now())
    }

    pub fn acknowledge(&self, alarm_id: AlarmId, actor: ActorId) -> Result<Alarm> {
        let alarm = self.lifecycle.acknowledge(alarm_id, actor)?;
        self.counters
            .alarms_acknowledged
            .fetch_add(1, Ordering::Relaxed);
        Ok(alarm)
    }

    pub fn resolve(&self, alarm_id: AlarmId) -> Result<Alarm> {
        let alarm = self.lifecycle.resolve(alarm_id)?;
        self.counters.alarms_resolved.fetch_add(1, Ordering::Relaxed);
        Ok(alarm)
    }

    // ------------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------------

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        self.hub.subscribe(topic)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.hub.unsubscribe(id)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Alarms still waiting for an operator (ACTIVE only), newest first
    ///
    /// An acknowledged alarm leaves this list; see [`Engine::open_alarms`].
    pub fn active_alarms(&self) -> Result<Vec<Alarm>> {
        self.alarms.list(&AlarmFilter {
            state: Some(AlarmState::Active),
            ..AlarmFilter::default()
        })
    }

    /// ACTIVE and ACKNOWLEDGED alarms, newest first
    pub fn open_alarms(&self) -> Result<Vec<Alarm>> {
        self.alarms.list(&AlarmFilter::open())
    }

    pub fn alarms(&self, filter: &AlarmFilter) -> Result<Vec<Alarm>> {
        self.alarms.list(filter)
    }

    pub fn alarm(&self, alarm_id: AlarmId) -> Result<Alarm> {
        self.alarms.get(alarm_id)
    }

    pub fn alarm_stats(&self) -> Result<AlarmStats> {
        let alarms = self.alarms.list(&AlarmFilter::default())?;
        let mut stats = AlarmStats {
            total: alarms.len(),
            ..AlarmStats::default()
        };
        for alarm in &alarms {
            match alarm.state {
                AlarmState::Active => stats.active += 1,
                AlarmState::Acknowledged => stats.acknowledged += 1,
                AlarmState::Resolved => stats.resolved += 1,
            }
            *stats.by_severity.entry(alarm.severity).or_insert(0) += 1;
        }
        Ok(stats)
    }

    pub fn latest_value(&self, tag_id: TagId) -> Result<Option<TagValue>> {
        self.values.latest(tag_id)
    }

    /// Up to `limit` values of a tag, newest timestamp first
    pub fn history(&self, tag_id: TagId, limit: usize) -> Result<Vec<TagValue>> {
        self.values.history(tag_id, limit)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            uptime_secs: self.start_time.elapsed().as_secs(),
            values_ingested: self.counters.values_ingested.load(Ordering::Relaxed),
            values_rejected: self.counters.values_rejected.load(Ordering::Relaxed),
            alarms_raised: self.counters.alarms_raised.load(Ordering::Relaxed),
            alarms_resolved: self.counters.alarms_resolved.load(Ordering::Relaxed),
            alarms_acknowledged: self.counters.alarms_acknowledged.load(Ordering::Relaxed),
            evaluation_failures: self.counters.evaluation_failures.load(Ordering::Relaxed),
            tag_count: self.catalog.tags().len(),
            definition_count: self.catalog.definitions().len(),
            hub: self.hub.stats(),
        }
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }
}
