// ── Alert domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::mac::MacAddress;

/// Normalized alert severity.
///
/// Normalization is total: any unrecognized or absent input maps to
/// [`Severity::Low`], never an error.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Map a raw severity string onto the four-value enum.
    ///
    /// Case-insensitive, synonym-aware, and total: anything
    /// unrecognized (including absent) is `Low`.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("medium" | "med" | "moderate" | "warn" | "warning") => Self::Medium,
            Some("high" | "hi" | "severe" | "major") => Self::High,
            Some("critical" | "crit" | "emergency" | "fatal") => Self::Critical,
            _ => Self::Low,
        }
    }

    /// High and critical alerts demand user interaction in push payloads.
    pub fn requires_interaction(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

/// A persisted security alert. Created once by the ingestion pipeline;
/// mutated only by an explicit acknowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Globally-unique dedup key: `"{source_alert_id}:{device_ip}"`.
    /// The composite is required because producers reuse alert ids
    /// across devices.
    pub dedup_key: String,
    pub source_alert_id: String,
    /// Device IP as reported; the literal `"unknown"` when absent.
    pub device_ip: String,
    pub device_mac: Option<MacAddress>,
    pub device_name: Option<String>,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    /// Whatever action the producer reports having taken, carried opaquely.
    pub action_taken: Option<serde_json::Value>,
    pub status: Option<String>,
    pub acknowledged: bool,
}

impl Alert {
    /// Compose the dedup key for a source alert id and device IP.
    pub fn dedup_key_for(source_alert_id: &str, device_ip: &str) -> String {
        format!("{source_alert_id}:{device_ip}")
    }

    /// Display name for notification payloads, falling back to the IP.
    pub fn display_target(&self) -> &str {
        self.device_name.as_deref().unwrap_or(&self.device_ip)
    }
}
