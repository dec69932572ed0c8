// homesentry-core: Reconciliation and notification engine for a home
// network sentry -- merges presence, metadata, and firewall state into
// a canonical device table and fans security alerts out to realtime,
// push, and email channels.

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod firewall;
pub mod ingest;
pub mod model;
pub mod notify;
pub mod reconcile;
pub mod source;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{Command, CommandResult};
pub use config::{AdminContact, EngineConfig};
pub use engine::{Engine, EngineTransports};
pub use error::CoreError;
pub use firewall::{FirewallBackend, FirewallError, FirewallExecutor, GroundTruth};
pub use ingest::IngestOutcome;
pub use notify::{
    EmailError, EmailMessage, EmailTransport, NotificationFanout, PushError, PushTransport,
    RealtimeHandle, RealtimeHub,
};
pub use reconcile::{DeviceReconciler, ReconcileOutcome};
pub use source::{FeedEntry, FeedSnapshot, FileFeed, SourceError};
pub use store::DataStore;
pub use stream::EntityStream;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Alert, Device, DeviceStatus, MacAddress, PushKeys, PushSubscription, Severity,
    PLACEHOLDER_NAME,
};
