// ── MAC address identity type ──
//
// Every device carries a MAC even when no source reported one: the
// reconciler synthesizes a locally-administered placeholder from the IP
// so downstream consumers never branch on a missing key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// MAC address, normalized to lowercase colon-separated format (aa:bb:cc:dd:ee:ff).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacAddress(String);

impl MacAddress {
    /// Create a normalized MAC address from any common format.
    /// Accepts colon-separated, dash-separated, or bare hex.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let normalized = raw.as_ref().trim().to_lowercase().replace('-', ":");

        // Bare 12-digit hex gets its colons inserted.
        if normalized.len() == 12 && normalized.bytes().all(|b| b.is_ascii_hexdigit()) {
            let mut separated = String::with_capacity(17);
            for (i, b) in normalized.bytes().enumerate() {
                if i > 0 && i % 2 == 0 {
                    separated.push(':');
                }
                separated.push(char::from(b));
            }
            return Self(separated);
        }

        Self(normalized)
    }

    /// Synthesize a placeholder MAC for a device whose real MAC is unknown.
    ///
    /// Uses the locally-administered `02:00` prefix with the last four
    /// bytes derived from the IP, so the same IP always yields the same
    /// placeholder.
    pub fn placeholder_for(ip: IpAddr) -> Self {
        let tail = match ip {
            IpAddr::V4(v4) => v4.octets(),
            IpAddr::V6(v6) => {
                let o = v6.octets();
                [
                    o[0] ^ o[4] ^ o[8] ^ o[12],
                    o[1] ^ o[5] ^ o[9] ^ o[13],
                    o[2] ^ o[6] ^ o[10] ^ o[14],
                    o[3] ^ o[7] ^ o[11] ^ o[15],
                ]
            }
        };
        Self(format!(
            "02:00:{:02x}:{:02x}:{:02x}:{:02x}",
            tail[0], tail[1], tail[2], tail[3]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MacAddress {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
