// ── Firewall command executor ──
//
// The packet-filtering mechanism itself lives behind `FirewallBackend`;
// this module owns the idempotence and verification logic around it.
// Enforcement commands are inherently racy against the real firewall,
// so success is judged by outcome, not by command exit status alone.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::DeviceStatus;
use crate::store::DataStore;

/// Failures surfaced by a firewall backend.
#[derive(Debug, Error)]
pub enum FirewallError {
    /// The command itself failed.
    #[error("firewall command failed for {ip}: {reason}")]
    Backend { ip: String, reason: String },

    /// The deny-list construct does not exist yet. Callers treat its
    /// absence as "nothing is blocked".
    #[error("firewall deny set missing: {reason}")]
    SetMissing { reason: String },

    /// The firewall could not be queried at all.
    #[error("firewall unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Seam to the host firewall. The daemon supplies an nft-set
/// implementation; tests supply scripted fakes.
#[async_trait]
pub trait FirewallBackend: Send + Sync {
    async fn block(&self, ip: IpAddr) -> Result<(), FirewallError>;
    async fn unblock(&self, ip: IpAddr) -> Result<(), FirewallError>;
    async fn is_blocked(&self, ip: IpAddr) -> Result<bool, FirewallError>;
}

/// What the firewall actually says about an IP right now.
///
/// `Unavailable` is distinct from `NotBlocked`: callers that must not
/// invent state (the reconciler) fall back to feed flags on
/// `Unavailable`, while a missing deny set is a definitive "not
/// blocked".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundTruth {
    Blocked,
    NotBlocked,
    Unavailable,
}

/// Runs block/unblock commands and keeps the device store consistent
/// with what the firewall reports.
pub struct FirewallExecutor {
    backend: Arc<dyn FirewallBackend>,
    store: Arc<DataStore>,
}

impl FirewallExecutor {
    #[must_use]
    pub fn new(backend: Arc<dyn FirewallBackend>, store: Arc<DataStore>) -> Self {
        Self { backend, store }
    }

    /// Query the authoritative blocked state of an IP.
    ///
    /// A missing deny set means nothing is blocked; any other query
    /// failure is reported as `Unavailable` so callers can choose
    /// their own fallback.
    pub async fn ground_truth(&self, ip: IpAddr) -> GroundTruth {
        match self.backend.is_blocked(ip).await {
            Ok(true) => GroundTruth::Blocked,
            Ok(false) => GroundTruth::NotBlocked,
            Err(FirewallError::SetMissing { reason }) => {
                warn!(%ip, reason, "deny set missing, treating as not blocked");
                GroundTruth::NotBlocked
            }
            Err(err) => {
                warn!(%ip, error = %err, "firewall ground truth unavailable");
                GroundTruth::Unavailable
            }
        }
    }

    /// Block an IP. Already-blocked is success, not an error.
    pub async fn block(&self, ip: IpAddr) -> Result<(), CoreError> {
        if self.ground_truth(ip).await == GroundTruth::Blocked {
            debug!(%ip, "already blocked, nothing to do");
            self.mark_blocked(ip, true);
            return Ok(());
        }

        self.backend.block(ip).await?;
        info!(%ip, "device blocked");
        self.mark_blocked(ip, true);
        Ok(())
    }

    /// Unblock an IP.
    ///
    /// Success is judged by outcome: the command succeeding, the
    /// firewall no longer listing the IP, or the store already showing
    /// it unblocked all count. Hard failure only when the firewall
    /// confirms the IP is still blocked after the attempt.
    pub async fn unblock(&self, ip: IpAddr) -> Result<(), CoreError> {
        let command_err = match self.backend.unblock(ip).await {
            Ok(()) => {
                info!(%ip, "device unblocked");
                self.mark_blocked(ip, false);
                return Ok(());
            }
            Err(err) => err,
        };

        match self.ground_truth(ip).await {
            GroundTruth::NotBlocked => {
                debug!(%ip, "unblock command failed but IP is not blocked");
                self.mark_blocked(ip, false);
                Ok(())
            }
            GroundTruth::Unavailable => {
                let already_unblocked = self
                    .store
                    .device(&ip.to_string())
                    .is_some_and(|d| !d.is_blocked);
                if already_unblocked {
                    debug!(%ip, "unblock unverifiable but record already unblocked");
                    Ok(())
                } else {
                    Err(command_err.into())
                }
            }
            GroundTruth::Blocked => Err(CoreError::FirewallCommand {
                ip: ip.to_string(),
                reason: "still blocked after unblock attempt".into(),
            }),
        }
    }

    /// Sync the stored record with a confirmed blocked state. Devices
    /// the reconciler has not seen yet simply have no record to update.
    ///
    /// An unblocked device reads Offline until presence confirms it;
    /// the next reconcile pass restores Active.
    fn mark_blocked(&self, ip: IpAddr, blocked: bool) {
        self.store.update_device(&ip.to_string(), |device| {
            device.is_blocked = blocked;
            if blocked {
                device.status = DeviceStatus::Blocked;
            } else if device.status == DeviceStatus::Blocked {
                device.status = DeviceStatus::Offline;
            }
        });
    }
}
