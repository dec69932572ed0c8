// ── HTTP push transport ──
//
// Posts the notification payload to each subscription endpoint. The
// payload encryption key material is opaque here; it is forwarded in
// headers for the delivery service to use.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use homesentry_core::{PushError, PushSubscription, PushTransport};

/// Time-to-live the delivery service should keep an undelivered
/// notification around for, in seconds.
const PUSH_TTL_SECS: &str = "86400";

pub struct HttpPushTransport {
    client: reqwest::Client,
}

impl HttpPushTransport {
    pub fn new(timeout: Duration) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PushError::Delivery(format!("http client setup failed: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &serde_json::Value,
    ) -> Result<(), PushError> {
        let response = self
            .client
            .post(&subscription.endpoint)
            .header("TTL", PUSH_TTL_SECS)
            .header("X-Push-P256dh", &subscription.keys.p256dh)
            .header("X-Push-Auth", &subscription.keys.auth)
            .json(payload)
            .send()
            .await
            .map_err(|e| PushError::Delivery(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(PushError::SubscriptionGone),
            status => Err(PushError::Delivery(format!(
                "endpoint returned {status}"
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use homesentry_core::PushKeys;
    use wiremock::matchers::{body_json_string, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn subscription(endpoint: String) -> PushSubscription {
        PushSubscription {
            owner: "admin@example.com".into(),
            endpoint,
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

    #[tokio::test]
    async fn delivers_payload_with_ttl() {
        let server = MockServer::start().await;
        let payload = serde_json::json!({"title": "Security alert: HIGH"});

        Mock::given(method("POST"))
            .and(header("TTL", PUSH_TTL_SECS))
            .and(body_json_string(payload.to_string()))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpPushTransport::new(Duration::from_secs(5)).unwrap();
        transport
            .deliver(&subscription(server.uri()), &payload)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn gone_status_maps_to_subscription_gone() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let transport = HttpPushTransport::new(Duration::from_secs(5)).unwrap();
        let err = transport
            .deliver(&subscription(server.uri()), &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PushError::SubscriptionGone));
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let transport = HttpPushTransport::new(Duration::from_secs(5)).unwrap();
        let err = transport
            .deliver(&subscription(server.uri()), &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PushError::Delivery(_)));
    }
}
