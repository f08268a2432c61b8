//! Stable device identities

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::BridgeError;

/// Identity of a physical controller, derived from its MAC address
///
/// Address and port changes never change the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(Uuid);

impl DeviceId {
    /// Derive the identity from the advertised hardware token
    pub fn from_hardware_token(mac: &str) -> Self {
        let normalized = mac.trim().to_lowercase();
        DeviceId(Uuid::new_v5(&Uuid::NAMESPACE_OID, normalized.as_bytes()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DeviceId {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(DeviceId)
            .map_err(|e| BridgeError::ValidationError(format!("invalid device id {s}: {e}")))
    }
}

/// Serial number shown for a controller: its MAC without separators
pub fn serial_from_mac(mac: &str) -> String {
    mac.trim().replace(':', "")
}
