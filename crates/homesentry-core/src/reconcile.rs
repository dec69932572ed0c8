// ── Device reconciler ──
//
// Merges three views of the network into the canonical device table:
// the presence feed (who answers ARP right now), the metadata feed
// (curated attributes), and the firewall (authoritative blocked state).
// Runs as a periodic tick; a tick over unchanged inputs writes nothing.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::firewall::{FirewallExecutor, GroundTruth};
use crate::model::{is_real_name, Device, DeviceStatus, MacAddress, PLACEHOLDER_NAME};
use crate::source::{FeedEntry, FeedSnapshot, FileFeed};
use crate::store::DataStore;

/// What one reconcile pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub created: usize,
    pub updated: usize,
    /// Sources that could not answer this tick ("presence",
    /// "metadata", "firewall").
    pub degraded_sources: Vec<&'static str>,
}

impl ReconcileOutcome {
    #[must_use]
    pub fn wrote_nothing(&self) -> bool {
        self.created == 0 && self.updated == 0
    }
}

pub struct DeviceReconciler {
    store: Arc<DataStore>,
    firewall: Arc<FirewallExecutor>,
    presence: FileFeed,
    metadata: FileFeed,
    config: Arc<EngineConfig>,
}

impl DeviceReconciler {
    #[must_use]
    pub fn new(
        store: Arc<DataStore>,
        firewall: Arc<FirewallExecutor>,
        config: Arc<EngineConfig>,
    ) -> Self {
        let presence = FileFeed::new(&config.presence_file, "presence");
        let metadata = FileFeed::new(&config.metadata_file, "metadata");
        Self {
            store,
            firewall,
            presence,
            metadata,
            config,
        }
    }

    /// One full reconcile pass over every known IP.
    pub async fn run_tick(&self) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        let presence = match self.presence.snapshot().await {
            Ok(snap) => Some(snap),
            Err(err) => {
                warn!(error = %err, "presence feed degraded this tick");
                outcome.degraded_sources.push("presence");
                None
            }
        };
        let metadata = match self.metadata.snapshot().await {
            Ok(snap) => Some(snap),
            Err(err) => {
                warn!(error = %err, "metadata feed degraded this tick");
                outcome.degraded_sources.push("metadata");
                None
            }
        };

        let mut firewall_degraded = false;
        for ip in self.candidate_ips(presence.as_ref(), metadata.as_ref()) {
            let meta = metadata.as_ref().and_then(|s| s.get(&ip));
            let pres = presence.as_ref().and_then(|s| s.get(&ip));
            let stored = self.store.device(&ip.to_string());

            // Feeds silent on a stored device: the firewall is still a
            // source, so its blocked state is refreshed before the
            // record is left alone.
            if meta.is_none() && pres.is_none() {
                if let Some(existing) = stored.as_deref() {
                    self.refresh_blocked_state(ip, existing, &mut outcome, &mut firewall_degraded)
                        .await;
                }
                continue;
            }

            self.reconcile_one(
                ip,
                stored.as_deref(),
                meta,
                pres,
                presence.is_some(),
                &mut outcome,
                &mut firewall_degraded,
            )
            .await;
        }

        if firewall_degraded {
            outcome.degraded_sources.push("firewall");
        }

        self.store.mark_reconciled(Utc::now());

        if outcome.wrote_nothing() {
            debug!("reconcile tick: no changes");
        } else {
            info!(
                created = outcome.created,
                updated = outcome.updated,
                degraded = ?outcome.degraded_sources,
                "reconcile tick complete"
            );
        }
        outcome
    }

    /// Union of metadata, presence, and stored IPs, minus exclusions.
    fn candidate_ips(
        &self,
        presence: Option<&FeedSnapshot>,
        metadata: Option<&FeedSnapshot>,
    ) -> Vec<IpAddr> {
        let mut ips: BTreeSet<IpAddr> = BTreeSet::new();
        if let Some(snap) = metadata {
            ips.extend(snap.ips().copied());
        }
        if let Some(snap) = presence {
            ips.extend(snap.ips().copied());
        }
        for key in self.store.device_ips() {
            if let Ok(ip) = key.parse::<IpAddr>() {
                ips.insert(ip);
            }
        }
        ips.retain(|ip| !self.config.is_excluded(*ip));
        ips.into_iter().collect()
    }

    /// Ground-truth-only pass for a device both feeds are silent on.
    ///
    /// Catches blocks and unblocks applied outside the engine. Anything
    /// but a definitive answer that differs from the record is a no-op.
    async fn refresh_blocked_state(
        &self,
        ip: IpAddr,
        existing: &Device,
        outcome: &mut ReconcileOutcome,
        firewall_degraded: &mut bool,
    ) {
        let blocked = match self.firewall.ground_truth(ip).await {
            GroundTruth::Blocked => true,
            GroundTruth::NotBlocked => false,
            GroundTruth::Unavailable => {
                *firewall_degraded = true;
                return;
            }
        };

        if blocked == existing.is_blocked {
            return;
        }

        let updated = self.store.update_device(&ip.to_string(), |device| {
            device.is_blocked = blocked;
            if blocked {
                device.status = DeviceStatus::Blocked;
            } else if device.status == DeviceStatus::Blocked {
                device.status = DeviceStatus::Offline;
            }
        });
        if updated.is_some() {
            info!(%ip, blocked, "blocked state changed outside the engine");
            outcome.updated += 1;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn reconcile_one(
        &self,
        ip: IpAddr,
        stored: Option<&Device>,
        meta: Option<&FeedEntry>,
        pres: Option<&FeedEntry>,
        presence_available: bool,
        outcome: &mut ReconcileOutcome,
        firewall_degraded: &mut bool,
    ) {
        // With the presence feed down, last-known presence stands in.
        let present = if presence_available {
            pres.is_some()
        } else {
            stored.is_some_and(|d| d.status.is_active())
        };

        let is_blocked = match self.firewall.ground_truth(ip).await {
            GroundTruth::Blocked => true,
            GroundTruth::NotBlocked => false,
            GroundTruth::Unavailable => {
                *firewall_degraded = true;
                feed_blocked(meta) || feed_blocked(pres) || stored.is_some_and(|d| d.is_blocked)
            }
        };

        let display_name = resolve_name(
            meta.and_then(|e| e.name.as_deref()),
            stored.map(|d| d.display_name.as_str()),
            pres.and_then(|e| e.name.as_deref()),
        );

        let mac = meta
            .and_then(|e| e.mac.as_deref())
            .or_else(|| pres.and_then(|e| e.mac.as_deref()))
            .map(MacAddress::new)
            .or_else(|| stored.map(|d| d.mac.clone()))
            .unwrap_or_else(|| MacAddress::placeholder_for(ip));

        let status = DeviceStatus::derive(is_blocked, present);

        let feed_first_seen = pres
            .and_then(FeedEntry::first_seen_utc)
            .or_else(|| meta.and_then(FeedEntry::first_seen_utc));
        let feed_last_seen = pres
            .and_then(FeedEntry::last_seen_utc)
            .or_else(|| meta.and_then(FeedEntry::last_seen_utc));

        match stored {
            None => {
                let first_seen = feed_first_seen.unwrap_or_else(Utc::now);
                let device = Device {
                    ip,
                    mac,
                    display_name,
                    status,
                    is_blocked,
                    first_seen,
                    last_seen: feed_last_seen.unwrap_or(first_seen),
                    bytes_sent: counter(pres, |e| e.bytes_sent),
                    bytes_received: counter(pres, |e| e.bytes_received),
                    packet_count: counter(pres, |e| e.packet_count),
                    metadata: meta.map(|e| e.extra.clone()).unwrap_or_default(),
                };
                self.store.upsert_device(device);
                outcome.created += 1;
            }
            Some(existing) => {
                let mut next = existing.clone();
                next.mac = mac;
                next.display_name = display_name;
                next.status = status;
                next.is_blocked = is_blocked;
                if let Some(seen) = feed_last_seen {
                    next.last_seen = seen;
                }
                if let Some(v) = pres.and_then(|e| e.bytes_sent) {
                    next.bytes_sent = v;
                }
                if let Some(v) = pres.and_then(|e| e.bytes_received) {
                    next.bytes_received = v;
                }
                if let Some(v) = pres.and_then(|e| e.packet_count) {
                    next.packet_count = v;
                }
                if let Some(extra) = meta.map(|e| e.extra.clone()) {
                    next.metadata = extra;
                }

                if next != *existing {
                    self.store.upsert_device(next);
                    outcome.updated += 1;
                }
            }
        }
    }
}

fn feed_blocked(entry: Option<&FeedEntry>) -> bool {
    entry.and_then(|e| e.blocked).unwrap_or(false)
}

fn counter(entry: Option<&FeedEntry>, pick: impl Fn(&FeedEntry) -> Option<u64>) -> u64 {
    entry.and_then(pick).unwrap_or(0)
}

/// Display-name precedence. A stored real name beats a placeholder
/// from the feeds; only an explicit rename can regress it.
fn resolve_name(meta: Option<&str>, stored: Option<&str>, pres: Option<&str>) -> String {
    if let Some(name) = meta.filter(|n| is_real_name(n)) {
        return name.to_owned();
    }
    if let Some(name) = stored.filter(|n| is_real_name(n)) {
        return name.to_owned();
    }
    if let Some(name) = meta.filter(|n| !n.trim().is_empty()) {
        return name.to_owned();
    }
    if let Some(name) = pres.filter(|n| !n.trim().is_empty()) {
        return name.to_owned();
    }
    PLACEHOLDER_NAME.to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::firewall::{FirewallBackend, FirewallError};

    /// Backend answering from a fixed blocked list.
    struct ListBackend {
        blocked: Vec<IpAddr>,
        available: bool,
    }

    #[async_trait]
    impl FirewallBackend for ListBackend {
        async fn block(&self, _ip: IpAddr) -> Result<(), FirewallError> {
            Ok(())
        }
        async fn unblock(&self, _ip: IpAddr) -> Result<(), FirewallError> {
            Ok(())
        }
        async fn is_blocked(&self, ip: IpAddr) -> Result<bool, FirewallError> {
            if self.available {
                Ok(self.blocked.contains(&ip))
            } else {
                Err(FirewallError::Unavailable {
                    reason: "nft not runnable".into(),
                })
            }
        }
    }

    struct Fixture {
        store: Arc<DataStore>,
        reconciler: DeviceReconciler,
        // Kept alive so the feed files outlive the tick.
        _presence: Option<tempfile::NamedTempFile>,
        _metadata: Option<tempfile::NamedTempFile>,
    }

    fn feed_file(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn fixture(presence: Option<&str>, metadata: Option<&str>, backend: ListBackend) -> Fixture {
        let presence = presence.map(feed_file);
        let metadata = metadata.map(feed_file);

        let config = Arc::new(EngineConfig {
            presence_file: presence
                .as_ref()
                .map_or("/nonexistent/presence.json".into(), |f| {
                    f.path().to_path_buf()
                }),
            metadata_file: metadata
                .as_ref()
                .map_or("/nonexistent/metadata.json".into(), |f| {
                    f.path().to_path_buf()
                }),
            ..EngineConfig::default()
        });

        let store = Arc::new(DataStore::new());
        let firewall = Arc::new(FirewallExecutor::new(Arc::new(backend), store.clone()));
        let reconciler = DeviceReconciler::new(store.clone(), firewall, config);

        Fixture {
            store,
            reconciler,
            _presence: presence,
            _metadata: metadata,
        }
    }

    fn available(blocked: &[&str]) -> ListBackend {
        ListBackend {
            blocked: blocked.iter().map(|s| s.parse().unwrap()).collect(),
            available: true,
        }
    }

    #[tokio::test]
    async fn creates_devices_from_union_of_feeds() {
        let fx = fixture(
            Some(r#"{"192.168.1.50": {"mac": "aa:bb:cc:dd:ee:ff"}}"#),
            Some(r#"{"192.168.1.60": {"name": "Thermostat"}}"#),
            available(&[]),
        );

        let outcome = fx.reconciler.run_tick().await;
        assert_eq!(outcome.created, 2);
        assert_eq!(outcome.updated, 0);
        assert!(outcome.degraded_sources.is_empty());

        let present = fx.store.device("192.168.1.50").unwrap();
        assert_eq!(present.status, DeviceStatus::Active);
        assert_eq!(present.display_name, PLACEHOLDER_NAME);

        // Metadata-only device is not present, so it reads offline.
        let absent = fx.store.device("192.168.1.60").unwrap();
        assert_eq!(absent.status, DeviceStatus::Offline);
        assert_eq!(absent.display_name, "Thermostat");
    }

    #[tokio::test]
    async fn second_tick_over_unchanged_inputs_writes_nothing() {
        let fx = fixture(
            Some(r#"{"192.168.1.50": {"name": "Camera", "last_seen": 1700000000}}"#),
            Some(r#"{"192.168.1.50": {"blocked": false}}"#),
            available(&[]),
        );

        let first = fx.reconciler.run_tick().await;
        assert_eq!(first.created, 1);

        let second = fx.reconciler.run_tick().await;
        assert!(second.wrote_nothing());
    }

    #[tokio::test]
    async fn ground_truth_beats_feed_blocked_flags() {
        // Feeds say blocked, firewall says no.
        let fx = fixture(
            Some(r#"{"192.168.1.50": {"blocked": true}}"#),
            Some(r#"{"192.168.1.50": {"blocked": true}}"#),
            available(&[]),
        );
        fx.reconciler.run_tick().await;
        assert!(!fx.store.device("192.168.1.50").unwrap().is_blocked);

        // Feeds say nothing, firewall says blocked.
        let fx = fixture(
            Some(r#"{"192.168.1.50": {}}"#),
            Some("{}"),
            available(&["192.168.1.50"]),
        );
        fx.reconciler.run_tick().await;
        let device = fx.store.device("192.168.1.50").unwrap();
        assert!(device.is_blocked);
        assert_eq!(device.status, DeviceStatus::Blocked);
    }

    #[tokio::test]
    async fn firewall_outage_falls_back_to_feed_flags() {
        let fx = fixture(
            Some(r#"{"192.168.1.50": {"blocked": true}}"#),
            Some("{}"),
            ListBackend {
                blocked: Vec::new(),
                available: false,
            },
        );

        let outcome = fx.reconciler.run_tick().await;
        assert!(outcome.degraded_sources.contains(&"firewall"));
        assert!(fx.store.device("192.168.1.50").unwrap().is_blocked);
    }

    #[tokio::test]
    async fn stored_real_name_never_regresses() {
        let fx = fixture(
            Some(r#"{"192.168.1.50": {"name": "Kitchen Camera"}}"#),
            Some("{}"),
            available(&[]),
        );
        fx.reconciler.run_tick().await;
        assert_eq!(
            fx.store.device("192.168.1.50").unwrap().display_name,
            "Kitchen Camera"
        );

        // Presence now reports no name; the stored one stands.
        let fx2 = fixture(
            Some(r#"{"192.168.1.50": {}}"#),
            Some("{}"),
            available(&[]),
        );
        fx2.store.upsert_device(Device {
            display_name: "Kitchen Camera".into(),
            ..(*fx.store.device("192.168.1.50").unwrap()).clone()
        });
        fx2.reconciler.run_tick().await;
        assert_eq!(
            fx2.store.device("192.168.1.50").unwrap().display_name,
            "Kitchen Camera"
        );
    }

    #[tokio::test]
    async fn metadata_real_name_wins_over_stored() {
        let fx = fixture(
            Some(r#"{"192.168.1.50": {"name": "old-hostname"}}"#),
            Some(r#"{"192.168.1.50": {"name": "Living Room TV"}}"#),
            available(&[]),
        );
        fx.reconciler.run_tick().await;
        assert_eq!(
            fx.store.device("192.168.1.50").unwrap().display_name,
            "Living Room TV"
        );
    }

    fn seed_device(store: &DataStore, ip: &str, blocked: bool) {
        let now = Utc::now();
        let ip: IpAddr = ip.parse().unwrap();
        store.upsert_device(Device {
            ip,
            mac: MacAddress::placeholder_for(ip),
            display_name: "Ghost".into(),
            status: DeviceStatus::derive(blocked, !blocked),
            is_blocked: blocked,
            first_seen: now,
            last_seen: now,
            bytes_sent: 42,
            bytes_received: 0,
            packet_count: 0,
            metadata: serde_json::Map::new(),
        });
    }

    #[tokio::test]
    async fn devices_absent_from_all_sources_are_untouched() {
        let fx = fixture(Some("{}"), Some("{}"), available(&[]));
        seed_device(&fx.store, "192.168.1.99", false);

        let outcome = fx.reconciler.run_tick().await;
        assert!(outcome.wrote_nothing());
        let ghost = fx.store.device("192.168.1.99").unwrap();
        assert_eq!(ghost.status, DeviceStatus::Active);
        assert_eq!(ghost.bytes_sent, 42);
    }

    #[tokio::test]
    async fn external_block_is_picked_up_when_feeds_are_silent() {
        // Blocked outside the engine; neither feed mentions the IP.
        let fx = fixture(Some("{}"), Some("{}"), available(&["192.168.1.99"]));
        seed_device(&fx.store, "192.168.1.99", false);

        let outcome = fx.reconciler.run_tick().await;
        assert_eq!(outcome.updated, 1);
        let device = fx.store.device("192.168.1.99").unwrap();
        assert!(device.is_blocked);
        assert_eq!(device.status, DeviceStatus::Blocked);
        // Everything but the blocked state is preserved.
        assert_eq!(device.display_name, "Ghost");
        assert_eq!(device.bytes_sent, 42);
    }

    #[tokio::test]
    async fn external_unblock_is_picked_up_when_feeds_are_silent() {
        let fx = fixture(Some("{}"), Some("{}"), available(&[]));
        seed_device(&fx.store, "192.168.1.99", true);

        let outcome = fx.reconciler.run_tick().await;
        assert_eq!(outcome.updated, 1);
        let device = fx.store.device("192.168.1.99").unwrap();
        assert!(!device.is_blocked);
        // Offline until presence confirms the device again.
        assert_eq!(device.status, DeviceStatus::Offline);
    }

    #[tokio::test]
    async fn silent_device_is_untouched_when_firewall_unreachable() {
        let fx = fixture(
            Some("{}"),
            Some("{}"),
            ListBackend {
                blocked: Vec::new(),
                available: false,
            },
        );
        seed_device(&fx.store, "192.168.1.99", true);

        let outcome = fx.reconciler.run_tick().await;
        assert!(outcome.wrote_nothing());
        assert!(outcome.degraded_sources.contains(&"firewall"));
        assert!(fx.store.device("192.168.1.99").unwrap().is_blocked);
    }

    #[tokio::test]
    async fn missing_presence_feed_degrades_not_empties() {
        let fx = fixture(None, Some(r#"{"192.168.1.50": {"name": "TV"}}"#), available(&[]));

        let outcome = fx.reconciler.run_tick().await;
        assert!(outcome.degraded_sources.contains(&"presence"));
        // Metadata-only entries still reconcile.
        assert!(fx.store.device("192.168.1.50").is_some());
    }

    #[tokio::test]
    async fn excluded_ips_are_skipped() {
        let fx = fixture(
            Some(r#"{"127.0.0.1": {}, "169.254.1.1": {}, "192.168.1.50": {}}"#),
            Some("{}"),
            available(&[]),
        );

        let outcome = fx.reconciler.run_tick().await;
        assert_eq!(outcome.created, 1);
        assert!(fx.store.device("127.0.0.1").is_none());
        assert!(fx.store.device("169.254.1.1").is_none());
    }

    #[tokio::test]
    async fn mac_is_synthesized_when_no_source_supplies_one() {
        let fx = fixture(Some(r#"{"192.168.1.50": {}}"#), Some("{}"), available(&[]));
        fx.reconciler.run_tick().await;

        let device = fx.store.device("192.168.1.50").unwrap();
        assert!(device.mac.as_str().starts_with("02:00:"));
    }

    #[test]
    fn name_precedence_table() {
        // Real metadata name wins outright.
        assert_eq!(resolve_name(Some("TV"), Some("Old"), Some("host")), "TV");
        // Placeholder metadata name defers to a stored real name.
        assert_eq!(
            resolve_name(Some(PLACEHOLDER_NAME), Some("Old"), None),
            "Old"
        );
        // No real name anywhere: any metadata name, then presence.
        assert_eq!(
            resolve_name(Some(PLACEHOLDER_NAME), None, Some("host")),
            PLACEHOLDER_NAME
        );
        assert_eq!(resolve_name(None, None, Some("host")), "host");
        assert_eq!(resolve_name(None, None, None), PLACEHOLDER_NAME);
    }
}
