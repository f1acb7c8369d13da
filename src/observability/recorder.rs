//! Event sinks
//!
//! [`EventRecorder`] is the one-way event/audit collaborator. Recording is
//! infallible to callers: a sink that cannot deliver drops the event.

use super::events::ClusterEvent;
use crate::model::ClusterKey;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

/// A single recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub cluster: ClusterKey,
    pub event: ClusterEvent,
    pub message: String,
}

impl EventRecord {
    pub fn new(cluster: &ClusterKey, event: ClusterEvent, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            cluster: cluster.clone(),
            event,
            message: message.into(),
        }
    }
}

/// Sink for cluster events.
pub trait EventRecorder: Send + Sync {
    fn record(&self, cluster: &ClusterKey, event: ClusterEvent, message: &str);
}

/// Emits every event as a log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventRecorder;

impl EventRecorder for TracingEventRecorder {
    fn record(&self, cluster: &ClusterKey, event: ClusterEvent, message: &str) {
        if event.is_warning() {
            warn!(target: "clusterkeeper::events", cluster = %cluster, event = event.as_str(), "{message}");
        } else {
            info!(target: "clusterkeeper::events", cluster = %cluster, event = event.as_str(), "{message}");
        }
    }
}

/// In-memory recorder for tests and simulations.
#[derive(Debug, Default, Clone)]
pub struct MemoryEventRecorder {
    records: Arc<Mutex<Vec<EventRecord>>>,
}

impl MemoryEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded entries, oldest first.
    pub fn records(&self) -> Vec<EventRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Recorded event kinds, oldest first.
    pub fn events(&self) -> Vec<ClusterEvent> {
        self.records().iter().map(|r| r.event).collect()
    }

    /// Number of times `event` was recorded.
    pub fn count(&self, event: ClusterEvent) -> usize {
        self.records().iter().filter(|r| r.event == event).count()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

impl EventRecorder for MemoryEventRecorder {
    fn record(&self, cluster: &ClusterKey, event: ClusterEvent, message: &str) {
        let record = EventRecord::new(cluster, event, message);
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_recorder_keeps_order() {
        let recorder = MemoryEventRecorder::new();
        let key = ClusterKey::new("db", "c");

        recorder.record(&key, ClusterEvent::Create, "creating");
        recorder.record(&key, ClusterEvent::Ready, "ready");
        recorder.record(&key, ClusterEvent::Ready, "ready again");

        assert_eq!(recorder.len(), 3);
        assert_eq!(
            recorder.events(),
            vec![ClusterEvent::Create, ClusterEvent::Ready, ClusterEvent::Ready]
        );
        assert_eq!(recorder.count(ClusterEvent::Ready), 2);
        assert_eq!(recorder.records()[0].message, "creating");
    }

    #[test]
    fn test_clones_share_storage() {
        let recorder = MemoryEventRecorder::new();
        let clone = recorder.clone();
        clone.record(&ClusterKey::new("db", "c"), ClusterEvent::Failed, "boom");
        assert_eq!(recorder.count(ClusterEvent::Failed), 1);
    }

    #[test]
    fn test_tracing_recorder_does_not_panic_without_subscriber() {
        TracingEventRecorder.record(&ClusterKey::new("db", "c"), ClusterEvent::Invalid, "bad spec");
    }
}
