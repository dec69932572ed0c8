// ── Runtime engine configuration ──
//
// These types describe *what* the engine watches and who it notifies.
// The daemon builds an `EngineConfig` from its config file and hands it
// in -- core never touches disk for configuration.

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// One notification recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminContact {
    pub email: String,
    /// Recipients can opt out without being removed from the roster.
    pub notifications_enabled: bool,
}

/// Configuration for a single engine instance.
///
/// Built by the daemon from `homesentry-config`, passed to `Engine::new`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Presence feed file (scanner output, map of IP to live entry).
    pub presence_file: PathBuf,
    /// Metadata feed file (map of IP to curated attributes).
    pub metadata_file: PathBuf,
    /// Alert feed file (object, array, or JSON-Lines).
    pub alerts_file: PathBuf,

    /// How often to run a reconcile pass.
    pub reconcile_interval: Duration,
    /// How often to poll the alert feed.
    pub ingest_interval: Duration,

    /// IPs the reconciler never manages, on top of loopback and
    /// link-local which are always excluded.
    pub excluded_ips: HashSet<IpAddr>,

    /// Base URL embedded in notification payloads.
    pub dashboard_url: String,

    /// Notification roster.
    pub admins: Vec<AdminContact>,

    /// When false, the first ingest tick only seeds the dedup set from
    /// alerts already present in the feed, without notifying.
    pub notify_on_first_tick: bool,
}

impl EngineConfig {
    /// Whether the reconciler should skip this IP entirely.
    #[must_use]
    pub fn is_excluded(&self, ip: IpAddr) -> bool {
        if self.excluded_ips.contains(&ip) {
            return true;
        }
        match ip {
            IpAddr::V4(v4) => v4.is_loopback() || v4.is_link_local(),
            IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xffc0) == 0xfe80,
        }
    }

    /// Recipients who currently want email.
    #[must_use]
    pub fn notified_admins(&self) -> impl Iterator<Item = &AdminContact> {
        self.admins.iter().filter(|a| a.notifications_enabled)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            presence_file: PathBuf::from("active_devices.json"),
            metadata_file: PathBuf::from("devices.json"),
            alerts_file: PathBuf::from("alerts.json"),
            reconcile_interval: Duration::from_secs(10),
            ingest_interval: Duration::from_secs(2),
            excluded_ips: HashSet::new(),
            dashboard_url: "http://localhost:8080".into(),
            admins: Vec::new(),
            notify_on_first_tick: false,
        }
    }
}
