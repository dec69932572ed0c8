// ── Command API ──
//
// All write operations flow through a unified `Command` enum. The
// engine's command processor routes each variant to the firewall
// executor or the store.

use std::net::IpAddr;

use crate::error::CoreError;
use crate::model::{Alert, Device, PushKeys};

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
}

/// All possible write operations against the engine.
#[derive(Debug, Clone)]
pub enum Command {
    // ── Firewall operations ──────────────────────────────────────────
    BlockDevice { ip: IpAddr },
    UnblockDevice { ip: IpAddr },

    // ── Device operations ────────────────────────────────────────────
    RenameDevice { ip: IpAddr, name: String },

    // ── Alert operations ─────────────────────────────────────────────
    AcknowledgeAlert { dedup_key: String },

    // ── Push subscription lifecycle ──────────────────────────────────
    RegisterPushSubscription {
        owner: String,
        endpoint: String,
        keys: PushKeys,
        user_agent: Option<String>,
    },
    DeactivatePushSubscription { owner: String, endpoint: String },
}

/// Result of a command execution.
#[derive(Debug)]
pub enum CommandResult {
    Ok,
    Device(Device),
    Alert(Alert),
}
