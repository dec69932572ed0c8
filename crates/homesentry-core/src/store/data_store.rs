// ── Central in-memory state store ──

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::model::{Alert, Device, PushSubscription};
use crate::store::collection::EntityCollection;
use crate::stream::EntityStream;

/// Central in-memory store for all engine state.
///
/// One reactive collection per entity type. Reads are lock-free, and
/// every collection exposes a snapshot stream for subscribers.
pub struct DataStore {
    devices: EntityCollection<Device>,
    alerts: EntityCollection<Alert>,
    subscriptions: EntityCollection<PushSubscription>,

    /// Completion time of the most recent reconcile pass.
    last_reconcile: watch::Sender<Option<DateTime<Utc>>>,
}

impl DataStore {
    #[must_use]
    pub fn new() -> Self {
        let (last_reconcile, _) = watch::channel(None);

        Self {
            devices: EntityCollection::new(),
            alerts: EntityCollection::new(),
            subscriptions: EntityCollection::new(),
            last_reconcile,
        }
    }

    // ── Devices ──────────────────────────────────────────────────────

    /// Insert or replace a device record, keyed by IP. Returns `true`
    /// when the device was not previously known.
    pub fn upsert_device(&self, device: Device) -> bool {
        self.devices.upsert(device.ip.to_string(), device)
    }

    /// Look up a device by IP string.
    #[must_use]
    pub fn device(&self, ip: &str) -> Option<Arc<Device>> {
        self.devices.get(ip)
    }

    /// Read-modify-write a device record. Returns `None` for unknown IPs.
    pub fn update_device<F>(&self, ip: &str, mutate: F) -> Option<Arc<Device>>
    where
        F: FnOnce(&mut Device),
    {
        self.devices.update(ip, mutate)
    }

    #[must_use]
    pub fn devices(&self) -> Arc<Vec<Arc<Device>>> {
        self.devices.snapshot()
    }

    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// All device IPs currently in the store.
    #[must_use]
    pub fn device_ips(&self) -> Vec<String> {
        self.devices.keys()
    }

    #[must_use]
    pub fn device_stream(&self) -> EntityStream<Device> {
        EntityStream::new(self.devices.subscribe())
    }

    // ── Alerts ───────────────────────────────────────────────────────

    /// `true` when an alert with this dedup key has already been seen.
    #[must_use]
    pub fn alert_exists(&self, dedup_key: &str) -> bool {
        self.alerts.contains_key(dedup_key)
    }

    /// Record a newly ingested alert. Returns `false` when the dedup
    /// key is already present, in which case the store is untouched.
    pub fn insert_alert(&self, alert: Alert) -> bool {
        let key = alert.dedup_key.clone();
        self.alerts.insert_if_absent(key, alert)
    }

    #[must_use]
    pub fn alert(&self, dedup_key: &str) -> Option<Arc<Alert>> {
        self.alerts.get(dedup_key)
    }

    /// Mark an alert acknowledged. Returns `false` for unknown keys.
    pub fn acknowledge_alert(&self, dedup_key: &str) -> bool {
        self.alerts
            .update(dedup_key, |alert| alert.acknowledged = true)
            .is_some()
    }

    #[must_use]
    pub fn alerts(&self) -> Arc<Vec<Arc<Alert>>> {
        self.alerts.snapshot()
    }

    #[must_use]
    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }

    #[must_use]
    pub fn alert_stream(&self) -> EntityStream<Alert> {
        EntityStream::new(self.alerts.subscribe())
    }

    // ── Push subscriptions ───────────────────────────────────────────

    /// Register or refresh a push subscription. Returns `true` when the
    /// `(owner, endpoint)` pair was not previously known.
    pub fn upsert_subscription(&self, sub: PushSubscription) -> bool {
        let key = PushSubscription::store_key(&sub.owner, &sub.endpoint);
        self.subscriptions.upsert(key, sub)
    }

    /// Look up a subscription by its store key.
    #[must_use]
    pub fn subscription(&self, key: &str) -> Option<Arc<PushSubscription>> {
        self.subscriptions.get(key)
    }

    /// All subscriptions that are still active.
    #[must_use]
    pub fn active_subscriptions(&self) -> Vec<Arc<PushSubscription>> {
        self.subscriptions
            .snapshot()
            .iter()
            .filter(|s| s.is_active)
            .cloned()
            .collect()
    }

    /// Deactivate a subscription by its store key. The record is kept
    /// for audit; only the active flag flips. Returns `false` for
    /// unknown keys.
    pub fn deactivate_subscription(&self, key: &str) -> bool {
        self.subscriptions
            .update(key, |sub| sub.is_active = false)
            .is_some()
    }

    /// Stamp a subscription as used after a successful delivery.
    pub fn touch_subscription(&self, key: &str, at: DateTime<Utc>) {
        self.subscriptions.update(key, |sub| sub.last_used = Some(at));
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    // ── Reconcile bookkeeping ────────────────────────────────────────

    pub fn mark_reconciled(&self, at: DateTime<Utc>) {
        self.last_reconcile.send_modify(|t| *t = Some(at));
    }

    #[must_use]
    pub fn last_reconcile(&self) -> Option<DateTime<Utc>> {
        *self.last_reconcile.borrow()
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::IpAddr;

    use super::*;
    use crate::model::{DeviceStatus, MacAddress, PushKeys, Severity, PLACEHOLDER_NAME};

    fn device(ip: &str) -> Device {
        let ip: IpAddr = ip.parse().unwrap();
        let now = Utc::now();
        Device {
            ip,
            mac: MacAddress::placeholder_for(ip),
            display_name: PLACEHOLDER_NAME.to_owned(),
            status: DeviceStatus::Active,
            is_blocked: false,
            first_seen: now,
            last_seen: now,
            bytes_sent: 0,
            bytes_received: 0,
            packet_count: 0,
            metadata: serde_json::Map::new(),
        }
    }

    fn alert(id: &str, ip: &str) -> Alert {
        Alert {
            dedup_key: Alert::dedup_key_for(id, ip),
            source_alert_id: id.to_owned(),
            device_ip: ip.to_owned(),
            device_mac: None,
            device_name: None,
            severity: Severity::Medium,
            timestamp: Utc::now(),
            reason: "port scan".into(),
            action_taken: None,
            status: None,
            acknowledged: false,
        }
    }

    fn subscription(owner: &str, endpoint: &str) -> PushSubscription {
        PushSubscription {
            owner: owner.to_owned(),
            endpoint: endpoint.to_owned(),
            keys: PushKeys {
                p256dh: "p".into(),
                auth: "a".into(),
            },
            user_agent: None,
            is_active: true,
            created_at: Utc::now(),
            last_used: None,
        }
    }

    #[test]
    fn device_upsert_and_lookup() {
        let store = DataStore::new();
        assert!(store.upsert_device(device("192.168.1.50")));
        assert!(!store.upsert_device(device("192.168.1.50")));
        assert!(store.device("192.168.1.50").is_some());
        assert_eq!(store.device_count(), 1);
    }

    #[test]
    fn alert_dedup_blocks_second_insert() {
        let store = DataStore::new();
        assert!(store.insert_alert(alert("a-1", "192.168.1.50")));
        assert!(!store.insert_alert(alert("a-1", "192.168.1.50")));
        assert!(store.insert_alert(alert("a-1", "192.168.1.51")));
        assert_eq!(store.alert_count(), 2);
    }

    #[test]
    fn acknowledge_flips_flag_once_known() {
        let store = DataStore::new();
        let a = alert("a-1", "10.0.0.2");
        let key = a.dedup_key.clone();
        store.insert_alert(a);

        assert!(store.acknowledge_alert(&key));
        assert!(store.alert(&key).unwrap().acknowledged);
        assert!(!store.acknowledge_alert("missing:key"));
    }

    #[test]
    fn subscription_deactivation_keeps_record() {
        let store = DataStore::new();
        let sub = subscription("alice", "https://push.example/ep1");
        let key = PushSubscription::store_key(&sub.owner, &sub.endpoint);
        store.upsert_subscription(sub);

        assert_eq!(store.active_subscriptions().len(), 1);
        assert!(store.deactivate_subscription(&key));
        assert!(store.active_subscriptions().is_empty());
        assert_eq!(store.subscription_count(), 1);
    }
}
