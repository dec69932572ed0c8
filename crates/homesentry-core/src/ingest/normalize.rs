// ── Raw alert normalization ──

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

use crate::ingest::parse::RawAlert;
use crate::model::{Alert, MacAddress, Severity};

/// Device IP recorded when the producer did not name one. Still part
/// of the dedup key, so id-only alerts dedup among themselves.
pub const UNKNOWN_IP: &str = "unknown";

/// Normalize a producer timestamp onto `DateTime<Utc>`.
///
/// Attempts, in order: numeric epoch seconds, RFC 3339/ISO-8601,
/// `"%Y-%m-%d %H:%M:%S"` read as UTC. Anything else falls back to now
/// with a warning. Total; ingestion never fails on a bad timestamp.
pub fn normalize_timestamp(raw: Option<&serde_json::Value>) -> DateTime<Utc> {
    if let Some(parsed) = raw.and_then(try_parse_timestamp) {
        return parsed;
    }
    if let Some(raw) = raw {
        warn!(%raw, "unparseable alert timestamp, using current time");
    }
    Utc::now()
}

fn try_parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::Number(n) => {
            let secs = n.as_f64()?;
            if !secs.is_finite() {
                return None;
            }
            #[allow(clippy::cast_possible_truncation)]
            let whole = secs.trunc() as i64;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let nanos = ((secs - secs.trunc()).abs() * 1e9) as u32;
            Utc.timestamp_opt(whole, nanos).single()
        }
        serde_json::Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(Utc.from_utc_datetime(&naive));
            }
            None
        }
        _ => None,
    }
}

/// Build a persistable [`Alert`] from a raw record.
///
/// Returns `None` when the record has no `alert_id` (nothing to dedup
/// on); the caller logs and drops it.
pub fn alert_from_raw(raw: &RawAlert) -> Option<Alert> {
    let alert_id = raw.alert_id.as_deref()?.trim();
    if alert_id.is_empty() {
        return None;
    }

    let device = raw.device.as_ref();
    let device_ip = device
        .and_then(|d| d.ip.as_deref())
        .filter(|ip| !ip.trim().is_empty())
        .unwrap_or(UNKNOWN_IP)
        .to_owned();

    Some(Alert {
        dedup_key: Alert::dedup_key_for(alert_id, &device_ip),
        source_alert_id: alert_id.to_owned(),
        device_ip,
        device_mac: device.and_then(|d| d.mac.as_deref()).map(MacAddress::new),
        device_name: device.and_then(|d| d.name.clone()),
        severity: Severity::normalize(raw.severity.as_deref()),
        timestamp: normalize_timestamp(raw.timestamp.as_ref()),
        reason: raw.reason.clone().unwrap_or_default(),
        action_taken: raw.action_taken.clone(),
        status: raw.status.clone(),
        acknowledged: false,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ingest::parse::RawDevice;

    #[test]
    fn epoch_seconds_parse() {
        let ts = normalize_timestamp(Some(&serde_json::json!(1_700_000_000)));
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[test]
    fn rfc3339_parses() {
        let ts = normalize_timestamp(Some(&serde_json::json!("2024-01-01T10:00:00Z")));
        assert_eq!(ts.to_rfc3339(), "2024-01-01T10:00:00+00:00");
    }

    #[test]
    fn space_separated_parses_as_utc() {
        let ts = normalize_timestamp(Some(&serde_json::json!("2024-01-01 10:00:00")));
        assert_eq!(ts.to_rfc3339(), "2024-01-01T10:00:00+00:00");
    }

    #[test]
    fn garbage_falls_back_to_now() {
        let before = Utc::now();
        let ts = normalize_timestamp(Some(&serde_json::json!("next tuesday")));
        assert!(ts >= before);

        let absent = normalize_timestamp(None);
        assert!(absent >= before);
    }

    #[test]
    fn missing_alert_id_is_dropped() {
        assert!(alert_from_raw(&RawAlert::default()).is_none());
        let blank = RawAlert {
            alert_id: Some("   ".into()),
            ..RawAlert::default()
        };
        assert!(alert_from_raw(&blank).is_none());
    }

    #[test]
    fn missing_ip_defaults_to_unknown() {
        let raw = RawAlert {
            alert_id: Some("a1".into()),
            ..RawAlert::default()
        };
        let alert = alert_from_raw(&raw).unwrap();
        assert_eq!(alert.device_ip, "unknown");
        assert_eq!(alert.dedup_key, "a1:unknown");
        assert_eq!(alert.severity, Severity::Low);
    }

    #[test]
    fn full_record_maps_through() {
        let raw = RawAlert {
            alert_id: Some("x1".into()),
            device: Some(RawDevice {
                ip: Some("192.168.1.50".into()),
                mac: Some("AA:BB:CC:DD:EE:FF".into()),
                name: Some("Cam1".into()),
            }),
            severity: Some("High".into()),
            reason: Some("port scan".into()),
            timestamp: Some(serde_json::json!("2024-01-01 10:00:00")),
            action_taken: None,
            status: Some("new".into()),
        };
        let alert = alert_from_raw(&raw).unwrap();
        assert_eq!(alert.dedup_key, "x1:192.168.1.50");
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.device_mac.as_ref().unwrap().as_str(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(alert.device_name.as_deref(), Some("Cam1"));
    }
}
