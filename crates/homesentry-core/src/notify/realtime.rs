// ── Realtime fanout hub ──
//
// In-process pub/sub feeding live dashboard connections. Subscribers
// are tracked individually so one dead connection never takes down a
// broadcast for the rest.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::model::{Alert, PLACEHOLDER_NAME};

/// Topic carrying new-alert events.
pub const ALERTS_TOPIC: &str = "alerts";

struct Subscriber {
    topic: String,
    tx: mpsc::UnboundedSender<Arc<serde_json::Value>>,
}

/// Keyed subscriber map for realtime events.
///
/// Publishing walks the topic's subscribers; a failed send evicts only
/// the subscriber it failed for.
pub struct RealtimeHub {
    next_id: AtomicU64,
    subscribers: DashMap<u64, Subscriber>,
}

impl RealtimeHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: DashMap::new(),
        }
    }

    /// Register a new subscriber on a topic.
    pub fn subscribe(&self, topic: impl Into<String>) -> RealtimeHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(
            id,
            Subscriber {
                topic: topic.into(),
                tx,
            },
        );
        RealtimeHandle { id, rx }
    }

    /// Drop a subscriber explicitly (connection closed cleanly).
    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.remove(&id);
    }

    /// Publish an event to every subscriber of a topic. Returns the
    /// number of subscribers reached; unreachable ones are removed.
    pub fn publish(&self, topic: &str, event: serde_json::Value) -> usize {
        let event = Arc::new(event);
        let mut delivered = 0;
        let mut dead = Vec::new();

        for entry in &self.subscribers {
            if entry.value().topic != topic {
                continue;
            }
            if entry.value().tx.send(Arc::clone(&event)).is_ok() {
                delivered += 1;
            } else {
                dead.push(*entry.key());
            }
        }

        for id in dead {
            debug!(subscriber = id, topic, "removing dead realtime subscriber");
            self.subscribers.remove(&id);
        }

        delivered
    }

    /// Broadcast a new alert on the alerts topic.
    pub fn publish_alert(&self, alert: &Alert) -> usize {
        self.publish(ALERTS_TOPIC, alert_event(alert))
    }

    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers
            .iter()
            .filter(|e| e.value().topic == topic)
            .count()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's receiving end.
pub struct RealtimeHandle {
    id: u64,
    rx: mpsc::UnboundedReceiver<Arc<serde_json::Value>>,
}

impl RealtimeHandle {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Receive the next event. `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<Arc<serde_json::Value>> {
        self.rx.recv().await
    }

    /// Non-blocking receive for poll-style consumers.
    pub fn try_recv(&mut self) -> Option<Arc<serde_json::Value>> {
        self.rx.try_recv().ok()
    }
}

/// The wire shape dashboards expect for a new alert.
fn alert_event(alert: &Alert) -> serde_json::Value {
    serde_json::json!({
        "type": "new_alert",
        "data": {
            "alert_id": alert.source_alert_id,
            "device_ip": alert.device_ip,
            "device_name": alert.device_name.as_deref().unwrap_or(PLACEHOLDER_NAME),
            "severity": alert.severity,
            "reason": alert.reason,
            "timestamp": alert.timestamp,
            "action_taken": alert.action_taken,
            "status": alert.status.as_deref().unwrap_or("active"),
        },
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::Severity;

    fn alert() -> Alert {
        Alert {
            dedup_key: "x1:192.168.1.50".into(),
            source_alert_id: "x1".into(),
            device_ip: "192.168.1.50".into(),
            device_mac: None,
            device_name: Some("Cam1".into()),
            severity: Severity::High,
            timestamp: Utc::now(),
            reason: "port scan".into(),
            action_taken: None,
            status: None,
            acknowledged: false,
        }
    }

    #[tokio::test]
    async fn alert_reaches_alerts_subscribers_only() {
        let hub = RealtimeHub::new();
        let mut alerts_sub = hub.subscribe(ALERTS_TOPIC);
        let _devices_sub = hub.subscribe("devices");

        assert_eq!(hub.publish_alert(&alert()), 1);

        let event = alerts_sub.recv().await.unwrap();
        assert_eq!(event["type"], "new_alert");
        assert_eq!(event["data"]["alert_id"], "x1");
        assert_eq!(event["data"]["device_name"], "Cam1");
        assert_eq!(event["data"]["severity"], "high");
        assert_eq!(event["data"]["status"], "active");
    }

    #[tokio::test]
    async fn dropped_subscriber_is_evicted_on_next_publish() {
        let hub = RealtimeHub::new();
        let keep = hub.subscribe(ALERTS_TOPIC);
        let gone = hub.subscribe(ALERTS_TOPIC);
        drop(gone);

        assert_eq!(hub.publish_alert(&alert()), 1);
        assert_eq!(hub.subscriber_count(ALERTS_TOPIC), 1);
        drop(keep);
    }

    #[tokio::test]
    async fn explicit_unsubscribe_removes_subscriber() {
        let hub = RealtimeHub::new();
        let handle = hub.subscribe(ALERTS_TOPIC);
        hub.unsubscribe(handle.id());
        assert_eq!(hub.subscriber_count(ALERTS_TOPIC), 0);
    }
}
