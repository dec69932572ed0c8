// ── Alert feed parsing ──
//
// Producers write the alert feed in one of three shapes: a single JSON
// object, a JSON array, or JSON-Lines. One bad line never fails the
// batch.

use serde::Deserialize;
use tracing::warn;

/// Device reference embedded in a raw alert record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDevice {
    pub ip: Option<String>,
    pub mac: Option<String>,
    pub name: Option<String>,
}

/// One alert record as the producer wrote it, before normalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAlert {
    pub alert_id: Option<String>,
    #[serde(default)]
    pub device: Option<RawDevice>,
    pub severity: Option<String>,
    pub reason: Option<String>,
    /// Epoch number or date string; normalized later.
    pub timestamp: Option<serde_json::Value>,
    #[serde(alias = "action")]
    pub action_taken: Option<serde_json::Value>,
    pub status: Option<String>,
}

/// Counts from one parse pass, for the tick log line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParseStats {
    pub parsed: usize,
    pub malformed_lines: usize,
}

/// Parse an alert feed document of any accepted shape.
///
/// Whole-document JSON is tried first (object reads as a one-element
/// batch, array as a batch); if that fails the input is treated as
/// JSON-Lines with per-line skip and log.
pub fn parse_alert_feed(raw: &str) -> (Vec<RawAlert>, ParseStats) {
    let mut stats = ParseStats::default();

    if let Ok(doc) = serde_json::from_str::<serde_json::Value>(raw) {
        let records = match doc {
            serde_json::Value::Object(_) => vec![doc],
            serde_json::Value::Array(items) => items,
            other => {
                warn!(kind = value_kind(&other), "alert feed is not an object or array");
                stats.malformed_lines = 1;
                return (Vec::new(), stats);
            }
        };

        let mut alerts = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_value::<RawAlert>(record) {
                Ok(alert) => alerts.push(alert),
                Err(err) => {
                    warn!(error = %err, "skipping malformed alert record");
                    stats.malformed_lines += 1;
                }
            }
        }
        stats.parsed = alerts.len();
        return (alerts, stats);
    }

    // JSON-Lines fallback.
    let mut alerts = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawAlert>(line) {
            Ok(alert) => alerts.push(alert),
            Err(err) => {
                warn!(error = %err, "skipping malformed alert line");
                stats.malformed_lines += 1;
            }
        }
    }
    stats.parsed = alerts.len();
    (alerts, stats)
}

fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
