//! Sync lifecycle broadcasting.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::result::SyncResultSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Queued,
    Started,
    Finished,
    /// The submission collapsed into a sync already in flight.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncEvent {
    pub timestamp: DateTime<Utc>,
    pub unit_id: String,
    pub phase: SyncPhase,
    /// Totals of the finished sync.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<SyncResultSet>,
}

impl SyncEvent {
    pub fn new(unit_id: &str, phase: SyncPhase) -> Self {
        Self {
            timestamp: Utc::now(),
            unit_id: unit_id.to_string(),
            phase,
            results: None,
        }
    }

    pub fn finished(unit_id: &str, results: SyncResultSet) -> Self {
        Self {
            results: Some(results),
            ..Self::new(unit_id, SyncPhase::Finished)
        }
    }
}

#[derive(Clone)]
pub struct SyncEventBroadcaster {
    sender: broadcast::Sender<SyncEvent>,
}

impl SyncEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn send(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}

impl Default for SyncEventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_without_subscribers() {
        let broadcaster = SyncEventBroadcaster::default();
        broadcaster.send(SyncEvent::new("u1", SyncPhase::Queued));
    }

    #[test]
    fn test_subscribers_receive_events() {
        let broadcaster = SyncEventBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();

        broadcaster.send(SyncEvent::new("u1", SyncPhase::Started));
        broadcaster.send(SyncEvent::finished("u1", SyncResultSet::new()));

        let started = rx.try_recv().unwrap();
        assert_eq!(started.phase, SyncPhase::Started);
        assert!(started.results.is_none());

        let finished = rx.try_recv().unwrap();
        assert_eq!(finished.phase, SyncPhase::Finished);
        assert!(finished.results.is_some());
    }

    #[test]
    fn test_event_serializes_phase_lowercase() {
        let json = serde_json::to_value(SyncEvent::new("u1", SyncPhase::Skipped)).unwrap();
        assert_eq!(json["phase"], "skipped");
        assert!(json.get("results").is_none());
    }
}
