// ── Core error types ──
//
// User-facing errors from homesentry-core. Transport details (process
// exit codes, SMTP responses, HTTP statuses) never surface raw -- each
// backend maps its failures onto these domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Alert not found: {dedup_key}")]
    AlertNotFound { dedup_key: String },

    #[error("Push subscription not found: {key}")]
    SubscriptionNotFound { key: String },

    // ── Firewall errors ──────────────────────────────────────────────
    #[error("Firewall command failed for {ip}: {reason}")]
    FirewallCommand { ip: String, reason: String },

    #[error("Firewall ground truth unavailable: {reason}")]
    FirewallUnavailable { reason: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Engine is shutting down")]
    ShuttingDown,
}

impl From<crate::firewall::FirewallError> for CoreError {
    fn from(err: crate::firewall::FirewallError) -> Self {
        match err {
            crate::firewall::FirewallError::Backend { ip, reason } => {
                CoreError::FirewallCommand { ip, reason }
            }
            crate::firewall::FirewallError::SetMissing { reason }
            | crate::firewall::FirewallError::Unavailable { reason } => {
                CoreError::FirewallUnavailable { reason }
            }
        }
    }
}
