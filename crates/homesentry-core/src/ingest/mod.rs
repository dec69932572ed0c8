// ── Alert ingestion pipeline ──
//
// Polls the alert feed, normalizes whatever shape the producer wrote,
// dedups against the store, and hands each newly persisted alert to the
// fanout before moving to the next record. Check-then-insert is safe
// under the single-writer assumption: one ingestion loop per deployment.

mod normalize;
mod parse;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::notify::NotificationFanout;
use crate::store::DataStore;

pub use normalize::{alert_from_raw, normalize_timestamp, UNKNOWN_IP};
pub use parse::{parse_alert_feed, ParseStats, RawAlert, RawDevice};

/// What one ingest pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Newly persisted alerts (each of these was fanned out).
    pub ingested: usize,
    /// Records skipped because the dedup key already existed.
    pub duplicates: usize,
    /// Records dropped for having no alert id.
    pub dropped: usize,
    pub malformed_lines: usize,
}

pub struct AlertIngestor {
    store: Arc<DataStore>,
    fanout: Arc<NotificationFanout>,
    feed_path: PathBuf,
    notify_on_first_tick: bool,
    seeded: bool,
}

impl AlertIngestor {
    #[must_use]
    pub fn new(
        store: Arc<DataStore>,
        fanout: Arc<NotificationFanout>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            fanout,
            feed_path: config.alerts_file.clone(),
            notify_on_first_tick: config.notify_on_first_tick,
            seeded: false,
        }
    }

    /// One ingest pass over the alert feed.
    ///
    /// The first pass after startup seeds the dedup set from alerts
    /// already sitting in the feed without notifying anyone, unless
    /// `notify_on_first_tick` says otherwise.
    pub async fn run_tick(&mut self) -> IngestOutcome {
        let notify = self.seeded || self.notify_on_first_tick;
        let seeding = !self.seeded;
        self.seeded = true;

        let mut outcome = IngestOutcome::default();

        let raw = match tokio::fs::read_to_string(&self.feed_path).await {
            Ok(raw) => raw,
            Err(err) => {
                // No feed yet is normal on a quiet network.
                debug!(path = %self.feed_path.display(), error = %err, "alert feed not readable");
                return outcome;
            }
        };

        let (records, stats) = parse_alert_feed(&raw);
        outcome.malformed_lines = stats.malformed_lines;

        for record in &records {
            let Some(alert) = alert_from_raw(record) else {
                warn!("dropping alert record without alert_id");
                outcome.dropped += 1;
                continue;
            };

            if self.store.insert_alert(alert.clone()) {
                outcome.ingested += 1;
                if notify {
                    // Insert-then-fanout per record, in file order.
                    self.fanout.dispatch(&alert).await;
                }
            } else {
                outcome.duplicates += 1;
            }
        }

        if seeding && !notify && outcome.ingested > 0 {
            info!(
                seeded = outcome.ingested,
                "seeded alert dedup set from existing feed"
            );
        } else if outcome.ingested > 0 || outcome.malformed_lines > 0 {
            info!(
                ingested = outcome.ingested,
                duplicates = outcome.duplicates,
                dropped = outcome.dropped,
                malformed = outcome.malformed_lines,
                "ingest tick complete"
            );
        }

        outcome
    }
}
