// ── Push subscription domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque browser push encryption material, passed through to the
/// delivery transport unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// One push delivery endpoint for one owner.
///
/// Never hard-deleted: a permanently-gone endpoint is flipped to
/// `is_active = false` and excluded from fanout, keeping the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushSubscription {
    /// Owning recipient (admin email in practice).
    pub owner: String,
    /// Delivery endpoint URL, unique per owner.
    pub endpoint: String,
    pub keys: PushKeys,
    pub user_agent: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

impl PushSubscription {
    /// Store key: one record per (owner, endpoint) pair.
    pub fn store_key(owner: &str, endpoint: &str) -> String {
        format!("{owner}|{endpoint}")
    }
}
