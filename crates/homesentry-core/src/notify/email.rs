// ── Email channel ──

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Alert, Severity};

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("email delivery failed: {0}")]
    Delivery(String),
}

/// A fully rendered message, ready for any SMTP-ish transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

/// Seam to the mail system. The daemon supplies an SMTP
/// implementation; tests capture messages instead.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

/// Render an alert into a message for one recipient.
///
/// Plain text and HTML variants carry the same facts; the HTML one
/// color-codes the severity and links back to the dashboard.
#[must_use]
pub fn render(alert: &Alert, to: &str, dashboard_url: &str) -> EmailMessage {
    let severity = alert.severity.to_string().to_uppercase();
    let target = alert.display_target();
    let timestamp = alert.timestamp.format("%Y-%m-%d %H:%M:%S UTC");

    let subject = format!("HomeSentry alert [{severity}]: {}", alert.reason);

    let text_body = format!(
        "HOMESENTRY SECURITY ALERT\n\n\
         Severity: {severity}\n\
         Reason: {}\n\
         Device: {target}\n\
         Time: {timestamp}\n\n\
         Check the dashboard for details: {dashboard_url}\n",
        alert.reason,
    );

    let color = severity_color(alert.severity);
    let html_body = format!(
        r#"<html>
<body style="font-family: Arial, sans-serif; color: #333;">
  <div style="max-width: 600px; margin: 0 auto; border: 1px solid #e5e7eb; border-radius: 8px; overflow: hidden;">
    <div style="background-color: {color}; padding: 20px; text-align: center; color: white;">
      <h1 style="margin: 0;">Security Alert</h1>
    </div>
    <div style="padding: 24px;">
      <h2 style="margin-top: 0;">{reason}</h2>
      <p>Severity: <strong style="color: {color};">{severity}</strong></p>
      <p>Device: <strong>{target}</strong></p>
      <p>Time: {timestamp}</p>
      <p style="text-align: center; margin-top: 24px;">
        <a href="{dashboard_url}" style="background-color: #3b82f6; color: white; padding: 12px 24px; text-decoration: none; border-radius: 6px;">View Dashboard</a>
      </p>
    </div>
  </div>
</body>
</html>
"#,
        reason = alert.reason,
    );

    EmailMessage {
        to: to.to_owned(),
        subject,
        text_body,
        html_body,
    }
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "#ef4444",
        Severity::High => "#f97316",
        Severity::Medium => "#eab308",
        Severity::Low => "#3b82f6",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;

    use super::*;

    #[test]
    fn rendered_message_carries_the_facts() {
        let alert = Alert {
            dedup_key: "x1:192.168.1.50".into(),
            source_alert_id: "x1".into(),
            device_ip: "192.168.1.50".into(),
            device_mac: None,
            device_name: Some("Cam1".into()),
            severity: Severity::Critical,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
            reason: "port scan".into(),
            action_taken: None,
            status: None,
            acknowledged: false,
        };

        let msg = render(&alert, "admin@example.com", "http://dash.local");
        assert_eq!(msg.to, "admin@example.com");
        assert_eq!(msg.subject, "HomeSentry alert [CRITICAL]: port scan");
        assert!(msg.text_body.contains("Severity: CRITICAL"));
        assert!(msg.text_body.contains("Device: Cam1"));
        assert!(msg.html_body.contains("#ef4444"));
        assert!(msg.html_body.contains("http://dash.local"));
    }

    #[test]
    fn nameless_alert_falls_back_to_ip() {
        let alert = Alert {
            dedup_key: "a1:10.0.0.5".into(),
            source_alert_id: "a1".into(),
            device_ip: "10.0.0.5".into(),
            device_mac: None,
            device_name: None,
            severity: Severity::Low,
            timestamp: Utc::now(),
            reason: "anomaly".into(),
            action_taken: None,
            status: None,
            acknowledged: false,
        };
        let msg = render(&alert, "a@b.c", "http://dash.local");
        assert!(msg.text_body.contains("Device: 10.0.0.5"));
    }
}
