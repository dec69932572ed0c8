// ── nftables deny-set backend ──
//
// Ground truth lives in one nft set (`inet homefw malicious_devices`
// by default). Block and unblock are element add/delete; membership is
// read back with `nft list set`.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use homesentry_core::{FirewallBackend, FirewallError};

const NFT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct NftSetBackend {
    family: String,
    table: String,
    set: String,
}

impl NftSetBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            family: "inet".into(),
            table: "homefw".into(),
            set: "malicious_devices".into(),
        }
    }

    async fn run_nft(&self, args: &[&str]) -> Result<std::process::Output, FirewallError> {
        debug!(?args, "running nft");
        let result = tokio::time::timeout(NFT_TIMEOUT, Command::new("nft").args(args).output())
            .await
            .map_err(|_| FirewallError::Unavailable {
                reason: "nft command timed out".into(),
            })?;

        result.map_err(|e| FirewallError::Unavailable {
            reason: format!("cannot run nft: {e}"),
        })
    }

    fn command_error(ip: IpAddr, output: &std::process::Output) -> FirewallError {
        FirewallError::Backend {
            ip: ip.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        }
    }
}

impl Default for NftSetBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FirewallBackend for NftSetBackend {
    async fn block(&self, ip: IpAddr) -> Result<(), FirewallError> {
        let element = format!("{{ {ip} }}");
        let output = self
            .run_nft(&["add", "element", &self.family, &self.table, &self.set, &element])
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Self::command_error(ip, &output))
        }
    }

    async fn unblock(&self, ip: IpAddr) -> Result<(), FirewallError> {
        let element = format!("{{ {ip} }}");
        let output = self
            .run_nft(&["delete", "element", &self.family, &self.table, &self.set, &element])
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Self::command_error(ip, &output))
        }
    }

    async fn is_blocked(&self, ip: IpAddr) -> Result<bool, FirewallError> {
        let output = self
            .run_nft(&["list", "set", &self.family, &self.table, &self.set])
            .await?;

        if !output.status.success() {
            // The set not existing yet is normal before the first block.
            return Err(FirewallError::SetMissing {
                reason: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        Ok(set_contains(&listing, ip))
    }
}

/// Whether an nft set listing names this IP as an element.
///
/// Output looks like `elements = { 10.10.0.11, 192.168.1.100 }`; the
/// IP must match a whole element, not a substring of one.
fn set_contains(listing: &str, ip: IpAddr) -> bool {
    let needle = ip.to_string();
    let Some(start) = listing.find("elements") else {
        return false;
    };
    listing[start..]
        .split(|c: char| c.is_whitespace() || matches!(c, '{' | '}' | ',' | '='))
        .any(|token| token == needle)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn membership_requires_a_whole_element() {
        let listing = "table inet homefw {\n\tset malicious_devices {\n\t\ttype ipv4_addr\n\t\telements = { 10.10.0.11, 192.168.1.100 }\n\t}\n}\n";

        assert!(set_contains(listing, "10.10.0.11".parse().unwrap()));
        assert!(set_contains(listing, "192.168.1.100".parse().unwrap()));
        // Substring of a listed element, not an element itself.
        assert!(!set_contains(listing, "192.168.1.10".parse().unwrap()));
        assert!(!set_contains(listing, "10.10.0.1".parse().unwrap()));
    }

    #[test]
    fn empty_set_contains_nothing() {
        let listing = "table inet homefw {\n\tset malicious_devices {\n\t\ttype ipv4_addr\n\t}\n}\n";
        assert!(!set_contains(listing, "10.10.0.11".parse().unwrap()));
    }
}
