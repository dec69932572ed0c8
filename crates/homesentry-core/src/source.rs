// ── Feed source adapters ──
//
// File-backed presence and metadata feeds. A feed that cannot be read
// or parsed is reported as a `SourceError` so the reconciler can
// degrade; it is never silently treated as an empty network.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Why a feed snapshot could not be produced.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot read feed {path}: {reason}")]
    Unavailable { path: String, reason: String },

    #[error("feed {path} is malformed: {reason}")]
    Malformed { path: String, reason: String },
}

/// One per-IP record as supplied by a feed. Every field is optional;
/// unknown fields are carried in `extra` rather than rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedEntry {
    pub mac: Option<String>,
    pub name: Option<String>,
    pub blocked: Option<bool>,
    pub status: Option<String>,

    /// Epoch seconds, fractional accepted.
    pub first_seen: Option<f64>,
    pub last_seen: Option<f64>,

    pub bytes_sent: Option<u64>,
    pub bytes_received: Option<u64>,
    pub packet_count: Option<u64>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FeedEntry {
    #[must_use]
    pub fn first_seen_utc(&self) -> Option<DateTime<Utc>> {
        self.first_seen.and_then(epoch_to_utc)
    }

    #[must_use]
    pub fn last_seen_utc(&self) -> Option<DateTime<Utc>> {
        self.last_seen.and_then(epoch_to_utc)
    }
}

/// Epoch seconds (possibly fractional) to UTC. Out-of-range input
/// yields `None` rather than panicking.
fn epoch_to_utc(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let whole = secs.trunc() as i64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let nanos = ((secs - secs.trunc()).abs() * 1e9) as u32;
    Utc.timestamp_opt(whole, nanos).single()
}

/// A parsed point-in-time view of one feed: IP to entry.
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    pub entries: HashMap<IpAddr, FeedEntry>,
}

impl FeedSnapshot {
    #[must_use]
    pub fn get(&self, ip: &IpAddr) -> Option<&FeedEntry> {
        self.entries.get(ip)
    }

    #[must_use]
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.entries.contains_key(ip)
    }

    pub fn ips(&self) -> impl Iterator<Item = &IpAddr> {
        self.entries.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// File-backed JSON feed: a single object mapping IP strings to entries.
///
/// Backs both the presence feed (scanner output) and the metadata feed
/// (curated attributes); only the path and label differ.
#[derive(Debug, Clone)]
pub struct FileFeed {
    path: PathBuf,
    /// Feed name used in log lines ("presence", "metadata").
    label: &'static str,
}

impl FileFeed {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, label: &'static str) -> Self {
        Self {
            path: path.into(),
            label,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the feed file.
    ///
    /// Keys that do not parse as IP addresses are skipped with a
    /// warning; they never fail the whole snapshot.
    pub async fn snapshot(&self) -> Result<FeedSnapshot, SourceError> {
        let path = self.path.display().to_string();

        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SourceError::Unavailable {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;

        let parsed: HashMap<String, FeedEntry> =
            serde_json::from_str(&raw).map_err(|e| SourceError::Malformed {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let mut entries = HashMap::with_capacity(parsed.len());
        for (key, entry) in parsed {
            match key.parse::<IpAddr>() {
                Ok(ip) => {
                    entries.insert(ip, entry);
                }
                Err(_) => {
                    warn!(feed = self.label, key, "skipping non-IP feed key");
                }
            }
        }

        Ok(FeedSnapshot { entries })
    }
}
