// ── Notification fanout ──
//
// Three independent channels: realtime (dashboard connections), browser
// push, and email. The fanout itself is infallible -- each channel logs
// its own failures and never blocks the others.

pub mod email;
pub mod push;
pub mod realtime;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::model::{Alert, PushSubscription};
use crate::store::DataStore;

pub use email::{EmailError, EmailMessage, EmailTransport};
pub use push::{PushError, PushTransport};
pub use realtime::{RealtimeHandle, RealtimeHub, ALERTS_TOPIC};

/// Dispatches every newly persisted alert to all three channels.
///
/// Push and email transports are optional; a deployment without SMTP
/// still gets realtime and push.
pub struct NotificationFanout {
    store: Arc<DataStore>,
    config: Arc<EngineConfig>,
    realtime: Arc<RealtimeHub>,
    push: Option<Arc<dyn PushTransport>>,
    email: Option<Arc<dyn EmailTransport>>,
}

impl NotificationFanout {
    #[must_use]
    pub fn new(
        store: Arc<DataStore>,
        config: Arc<EngineConfig>,
        realtime: Arc<RealtimeHub>,
        push: Option<Arc<dyn PushTransport>>,
        email: Option<Arc<dyn EmailTransport>>,
    ) -> Self {
        Self {
            store,
            config,
            realtime,
            push,
            email,
        }
    }

    /// Fan one alert out to every channel. Never fails; notification
    /// delivery is at-most-once and a channel failure must not roll
    /// back the persisted alert.
    pub async fn dispatch(&self, alert: &Alert) {
        let reached = self.realtime.publish_alert(alert);
        debug!(
            alert = %alert.dedup_key,
            subscribers = reached,
            "realtime alert published"
        );

        self.dispatch_push(alert).await;
        self.dispatch_email(alert).await;
    }

    async fn dispatch_push(&self, alert: &Alert) {
        let Some(transport) = &self.push else {
            return;
        };

        let payload = push::alert_payload(alert, &self.config.dashboard_url);
        let mut sent = 0usize;
        let subscriptions = self.store.active_subscriptions();
        let total = subscriptions.len();

        for sub in subscriptions {
            match transport.deliver(&sub, &payload).await {
                Ok(()) => {
                    sent += 1;
                    let key = PushSubscription::store_key(&sub.owner, &sub.endpoint);
                    self.store.touch_subscription(&key, Utc::now());
                }
                Err(PushError::SubscriptionGone) => {
                    let key = PushSubscription::store_key(&sub.owner, &sub.endpoint);
                    warn!(
                        owner = %sub.owner,
                        endpoint = %sub.endpoint,
                        "push endpoint gone, deactivating subscription"
                    );
                    self.store.deactivate_subscription(&key);
                }
                Err(err) => {
                    warn!(
                        owner = %sub.owner,
                        endpoint = %sub.endpoint,
                        error = %err,
                        "push delivery failed"
                    );
                }
            }
        }

        if total > 0 {
            info!(alert = %alert.dedup_key, sent, total, "push notifications sent");
        }
    }

    async fn dispatch_email(&self, alert: &Alert) {
        let Some(transport) = &self.email else {
            return;
        };

        for admin in self.config.notified_admins() {
            let message = email::render(alert, &admin.email, &self.config.dashboard_url);
            match transport.send(&message).await {
                Ok(()) => info!(to = %admin.email, alert = %alert.dedup_key, "alert email sent"),
                Err(err) => {
                    // Recipients are never deactivated over delivery failures.
                    warn!(to = %admin.email, error = %err, "alert email failed");
                }
            }
        }
    }
}
