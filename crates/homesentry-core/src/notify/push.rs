// ── Browser push channel ──

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Alert, PushSubscription, PLACEHOLDER_NAME};

/// Failures from a push delivery attempt.
#[derive(Debug, Error)]
pub enum PushError {
    /// The delivery service reports the endpoint permanently gone
    /// (HTTP 404/410). The subscription must be deactivated.
    #[error("push endpoint gone")]
    SubscriptionGone,

    /// Anything transient; the subscription stays active.
    #[error("push delivery failed: {0}")]
    Delivery(String),
}

/// Seam to the actual push delivery service. The daemon supplies an
/// HTTP implementation; tests supply scripted fakes.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &serde_json::Value,
    ) -> Result<(), PushError>;
}

/// Notification payload in the shape the service worker expects.
#[must_use]
pub fn alert_payload(alert: &Alert, dashboard_url: &str) -> serde_json::Value {
    let target = alert
        .device_name
        .as_deref()
        .unwrap_or(PLACEHOLDER_NAME);
    serde_json::json!({
        "title": format!("Security alert: {}", severity_label(alert)),
        "body": format!("{} on {}", alert.reason, target),
        "icon": "/icons/alert.png",
        "tag": alert.source_alert_id,
        "data": {
            "url": dashboard_url,
            "alert_id": alert.source_alert_id,
            "device_ip": alert.device_ip,
        },
        "requireInteraction": alert.severity.requires_interaction(),
    })
}

fn severity_label(alert: &Alert) -> String {
    alert.severity.to_string().to_uppercase()
}
