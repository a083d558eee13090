// src/hub.rs - Tag and alarm notification fan-out
//
//! # Notification hub
//!
//! Fans tag-value and alarm-state events out to every subscriber of the
//! event's topic.
//!
//! ```text
//! publish(event)
//!     │
//!     ├──► [queue 1] ──► Subscription::recv()   (websocket, test, ...)
//!     ├──► [queue 2] ──► Subscription::recv()
//!     └──► [queue N] ──► Subscription::recv()
//! ```
//!
//! - Each subscriber owns a bounded FIFO queue; events arrive in publish order
//! - On overflow the oldest queued event is discarded and counted
//! - `publish` never blocks and never fails
//! - No ordering guarantee between different subscribers
//!
//! A [`Subscription`] unsubscribes itself when dropped.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::model::{Alarm, AlarmId, DefinitionId, Severity, TagId, TagValue};
use crate::value::{Quality, Value};

pub type SubscriptionId = u64;

/// Default per-subscriber queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

// ============================================================================
// EVENTS
// ============================================================================

/// Event stream a subscriber listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    TagUpdates,
    AlarmUpdates,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Topic::TagUpdates => "tag_updates",
            Topic::AlarmUpdates => "alarm_updates",
        })
    }
}

/// Alarm fields carried by every alarm event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmNotice {
    pub alarm_id: AlarmId,
    pub definition_id: DefinitionId,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AlarmNotice {
    fn new(alarm: &Alarm, timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            alarm_id: alarm.id,
            definition_id: alarm.definition_id,
            severity: alarm.severity,
            message: alarm.message.clone(),
            timestamp: timestamp.unwrap_or_else(Utc::now),
        }
    }
}

/// Wire event, serialized as a `type`-tagged JSON object
///
/// ```rust
/// use pipeline_scada::hub::Event;
/// use pipeline_scada::{Quality, Value};
/// use chrono::Utc;
///
/// let ev = Event::TagUpdate {
///     tag_id: 4,
///     value: Value::Float(5.5),
///     quality: Quality::GOOD,
///     timestamp: Utc::now(),
/// };
/// let json = serde_json::to_value(&ev).unwrap();
/// assert_eq!(json["type"], "tag_update");
/// assert_eq!(json["value"], 5.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TagUpdate {
        tag_id: TagId,
        value: Value,
        quality: Quality,
        timestamp: DateTime<Utc>,
    },
    AlarmRaised(AlarmNotice),
    AlarmResolved(AlarmNotice),
    AlarmAcknowledged(AlarmNotice),
}

impl Event {
    pub fn tag_update(value: &TagValue) -> Self {
        Event::TagUpdate {
            tag_id: value.tag_id,
            value: value.value.clone(),
            quality: value.quality,
            timestamp: value.timestamp,
        }
    }

    pub fn alarm_raised(alarm: &Alarm) -> Self {
        Event::AlarmRaised(AlarmNotice::new(alarm, Some(alarm.triggered_at)))
    }

    pub fn alarm_resolved(alarm: &Alarm) -> Self {
        Event::AlarmResolved(AlarmNotice::new(alarm, alarm.resolved_at))
    }

    pub fn alarm_acknowledged(alarm: &Alarm) -> Self {
        Event::AlarmAcknowledged(AlarmNotice::new(alarm, alarm.acknowledged_at))
    }

    pub fn topic(&self) -> Topic {
        match self {
            Event::TagUpdate { .. } => Topic::TagUpdates,
            Event::AlarmRaised(_) | Event::AlarmResolved(_) | Event::AlarmAcknowledged(_) => {
                Topic::AlarmUpdates
            }
        }
    }

    /// Alarm payload for alarm events
    pub fn alarm(&self) -> Option<&AlarmNotice> {
        match self {
            Event::TagUpdate { .. } => None,
            Event::AlarmRaised(n) | Event::AlarmResolved(n) | Event::AlarmAcknowledged(n) => {
                Some(n)
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::TagUpdate { .. } => "tag_update",
            Event::AlarmRaised(_) => "alarm_raised",
            Event::AlarmResolved(_) => "alarm_resolved",
            Event::AlarmAcknowledged(_) => "alarm_acknowledged",
        }
    }
}

// ============================================================================
// SUBSCRIBER QUEUES
// ============================================================================

#[derive(Debug, Default)]
struct QueueState {
    events: VecDeque<Arc<Event>>,
    closed: bool,
}

#[derive(Debug)]
struct SubscriberQueue {
    topic: Topic,
    state: Mutex<QueueState>,
    notify: Notify,
    dropped: AtomicU64,
}

enum Push {
    Queued,
    Overflowed,
    Closed,
}

impl SubscriberQueue {
    fn new(topic: Topic) -> Self {
        Self {
            topic,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, event: Arc<Event>, capacity: usize) -> Push {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed {
                return Push::Closed;
            }
            let outcome = if state.events.len() >= capacity {
                state.events.pop_front();
                Push::Overflowed
            } else {
                Push::Queued
            };
            state.events.push_back(event);
            outcome
        };
        self.notify.notify_one();
        outcome
    }

    fn close(&self) {
        {
            let mut state = self.state.lock();
            state.closed = true;
            state.events.clear();
        }
        self.notify.notify_one();
    }
}

// ============================================================================
// HUB
// ============================================================================

#[derive(Debug)]
struct HubInner {
    subscribers: DashMap<SubscriptionId, Arc<SubscriberQueue>>,
    next_id: AtomicU64,
    capacity: usize,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl HubInner {
    fn remove(&self, id: SubscriptionId) {
        if let Some((_, queue)) = self.subscribers.remove(&id) {
            queue.close();
            debug!("Subscription {} to {} closed", id, queue.topic);

            #[cfg(feature = "metrics")]
            gauge!("scada_hub_subscribers").set(self.subscribers.len() as f64);
        }
    }
}

/// Hub counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStats {
    pub subscribers: usize,
    pub published: u64,
    pub dropped: u64,
}

/// Publish/subscribe hub; cheap to clone
#[derive(Debug, Clone)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

impl NotificationHub {
    /// Create a hub whose subscriber queues hold up to `capacity` events
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(SubscriberQueue::new(topic));
        self.inner.subscribers.insert(id, queue.clone());
        debug!("Subscription {} opened for {}", id, topic);

        #[cfg(feature = "metrics")]
        gauge!("scada_hub_subscribers").set(self.inner.subscribers.len() as f64);

        Subscription {
            id,
            topic,
            queue,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscription; unknown ids are ignored
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.remove(id);
    }

    /// Deliver an event to every subscriber of its topic
    ///
    /// Returns the number of subscribers the event was queued for.
    pub fn publish(&self, event: Event) -> usize {
        let topic = event.topic();
        let event = Arc::new(event);
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        counter!("scada_hub_events_published_total", "topic" => topic.to_string()).increment(1);

        let targets: Vec<(SubscriptionId, Arc<SubscriberQueue>)> = self
            .inner
            .subscribers
            .iter()
            .filter(|entry| entry.value().topic == topic)
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut delivered = 0;
        for (id, queue) in targets {
            match queue.push(Arc::clone(&event), self.inner.capacity) {
                Push::Queued => delivered += 1,
                Push::Overflowed => {
                    delivered += 1;
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    let total = queue.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if total == 1 {
                        warn!(
                            "Subscriber {} fell behind on {}, dropping oldest events",
                            id, topic
                        );
                    } else {
                        debug!("Subscriber {} dropped event ({} total)", id, total);
                    }

                    #[cfg(feature = "metrics")]
                    counter!("scada_hub_events_dropped_total").increment(1);
                }
                Push::Closed => trace!("Skipping closed subscription {}", id),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            subscribers: self.inner.subscribers.len(),
            published: self.inner.published.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

// ============================================================================
// SUBSCRIPTION
// ============================================================================

/// Receiving end of one subscriber queue
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    queue: Arc<SubscriberQueue>,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Events discarded from this queue because it was full
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    /// Wait for the next event; `None` once unsubscribed
    ///
    /// Cancel safe: an event is only removed from the queue when it is
    /// returned.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        loop {
            let notified = self.queue.notify.notified();
            {
                let mut state = self.queue.state.lock();
                if let Some(event) = state.events.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Next queued event without waiting
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.queue.state.lock().events.pop_front()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.state.lock().closed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tag_event(tag_id: TagId, v: f64) -> Event {
        Event::TagUpdate {
            tag_id,
            value: Value::Float(v),
            quality: Quality::GOOD,
            timestamp: Utc::now(),
        }
    }

    fn value_of(event: &Event) -> f64 {
        match event {
            Event::TagUpdate { value, .. } => value.as_float().unwrap(),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_topic_routing() {
        let hub = NotificationHub::new(8);
        let mut tags = hub.subscribe(Topic::TagUpdates);
        let mut alarms = hub.subscribe(Topic::AlarmUpdates);

        assert_eq!(hub.publish(tag_event(1, 1.0)), 1);
        assert!(tags.try_recv().is_some());
        assert!(alarms.try_recv().is_none());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let hub = NotificationHub::new(3);
        let mut sub = hub.subscribe(Topic::TagUpdates);
        for i in 0..5 {
            hub.publish(tag_event(1, i as f64));
        }

        let received: Vec<f64> = std::iter::from_fn(|| sub.try_recv())
            .map(|e| value_of(&e))
            .collect();
        assert_eq!(received, vec![2.0, 3.0, 4.0]);
        assert_eq!(sub.dropped(), 2);
        assert_eq!(hub.stats().dropped, 2);
        assert_eq!(hub.stats().published, 5);
    }

    #[test]
    fn test_slow_subscriber_does_not_affect_others() {
        let hub = NotificationHub::new(2);
        let mut slow = hub.subscribe(Topic::TagUpdates);
        let mut fast = hub.subscribe(Topic::TagUpdates);

        for i in 0..4 {
            hub.publish(tag_event(1, i as f64));
            assert!(fast.try_recv().is_some());
        }
        assert_eq!(fast.dropped(), 0);
        assert_eq!(slow.dropped(), 2);
        assert_eq!(slow.try_recv().map(|e| value_of(&e)), Some(2.0));
    }

    #[test]
    fn test_repeated_subscribe_is_independent() {
        let hub = NotificationHub::default();
        let a = hub.subscribe(Topic::AlarmUpdates);
        let b = hub.subscribe(Topic::AlarmUpdates);
        assert_ne!(a.id(), b.id());
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let hub = NotificationHub::new(8);
        let mut sub = hub.subscribe(Topic::TagUpdates);
        hub.publish(tag_event(1, 1.0));

        hub.unsubscribe(sub.id());
        hub.publish(tag_event(1, 2.0));

        assert!(sub.is_closed());
        assert!(sub.try_recv().is_none());
        assert_eq!(hub.subscriber_count(), 0);

        // Unknown and repeated ids are no-ops
        hub.unsubscribe(sub.id());
        hub.unsubscribe(12345);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let hub = NotificationHub::new(8);
        {
            let _sub = hub.subscribe(Topic::TagUpdates);
            assert_eq!(hub.subscriber_count(), 1);
        }
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(tag_event(1, 1.0)), 0);
    }

    #[tokio::test]
    async fn test_recv_preserves_publish_order() {
        let hub = NotificationHub::new(1024);
        let mut sub = hub.subscribe(Topic::TagUpdates);

        let publisher = {
            let hub = hub.clone();
            tokio::spawn(async move {
                for i in 0..500 {
                    hub.publish(tag_event(1, i as f64));
                    if i % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };

        for expected in 0..500 {
            let event = sub.recv().await.unwrap();
            assert_eq!(value_of(&event), expected as f64);
        }
        publisher.await.unwrap();
    }

    #[tokio::test]
    async fn test_recv_returns_none_after_unsubscribe() {
        let hub = NotificationHub::new(8);
        let mut sub = hub.subscribe(Topic::AlarmUpdates);
        let id = sub.id();

        let waiter = tokio::spawn(async move { sub.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        hub.unsubscribe(id);

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_alarm_event_wire_shape() {
        let notice = AlarmNotice {
            alarm_id: 9,
            definition_id: 2,
            severity: Severity::Critical,
            message: "Line pressure high".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(Event::AlarmAcknowledged(notice)).unwrap();
        assert_eq!(json["type"], "alarm_acknowledged");
        assert_eq!(json["alarm_id"], 9);
        assert_eq!(json["severity"], "CRITICAL");
    }
}
