// ── Device domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use super::mac::MacAddress;

/// Name assigned when no source supplies a real one.
pub const PLACEHOLDER_NAME: &str = "Unknown Device";

/// Canonical device status, derived every reconciliation tick.
///
/// `Blocked` wins over `Active`: a blocked device that is still answering
/// ARP is reported as blocked, not active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Offline,
    Blocked,
}

impl DeviceStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Status implied by the blocked flag and presence bit.
    pub fn derive(blocked: bool, present: bool) -> Self {
        if blocked {
            Self::Blocked
        } else if present {
            Self::Active
        } else {
            Self::Offline
        }
    }
}

/// The canonical Device record. One per network identity, keyed by IP;
/// MAC is auxiliary and may be a synthesized placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub ip: IpAddr,
    pub mac: MacAddress,
    /// Resolved display name. Holds [`PLACEHOLDER_NAME`] until a real
    /// name arrives; a real name never regresses to the placeholder
    /// except through an explicit rename.
    pub display_name: String,
    pub status: DeviceStatus,
    pub is_blocked: bool,

    // Lifecycle
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,

    // Traffic counters (0 when unknown)
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packet_count: u64,

    /// Raw attribute bag carried from the metadata feed.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Device {
    /// Whether the device carries a real (non-placeholder) name.
    pub fn has_real_name(&self) -> bool {
        is_real_name(&self.display_name)
    }
}

/// A name counts as real when it is non-empty and not the placeholder.
pub fn is_real_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && trimmed != PLACEHOLDER_NAME
}
