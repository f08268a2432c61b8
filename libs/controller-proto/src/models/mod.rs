//! Wire models

use serde::{Deserialize, Serialize};

/// Highest relay index a controller exposes (relay 16 is the master valve)
pub const MAX_RELAYS: u8 = 15;

/// Master valve status as broadcast by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "i64")]
pub enum MasterStatus {
    /// Master valve open, at least one zone running
    Running,

    /// All zones finished, system is relieving pressure
    WindingDown,

    /// Master valve closed
    Inactive,
}

impl From<i64> for MasterStatus {
    fn from(value: i64) -> Self {
        match value {
            1 => MasterStatus::Running,
            2 => MasterStatus::WindingDown,
            _ => MasterStatus::Inactive,
        }
    }
}

/// Status of a single relay
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    pub relay: u8,

    /// 1 when the relay is on, 0 otherwise
    pub status: u8,

    /// Seconds until the controller switches the relay off
    #[serde(default)]
    pub remaining_duration: i64,

    /// Default run time stored on the controller
    #[serde(default)]
    pub default_duration: Option<u32>,
}

impl RelayStatus {
    pub fn is_active(&self) -> bool {
        self.status == 1
    }
}

/// Frames pushed by the controller
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundFrame {
    MasterStatus { status: MasterStatus },
    RelayStatus(RelayStatus),
    SystemStatus {
        master: MasterStatus,
        #[serde(default)]
        relays: Vec<RelayStatus>,
    },
}

impl InboundFrame {
    /// Parse a text frame
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Frames sent to the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum OutboundCommand {
    Set(SetCommand),

    /// Ask the controller to broadcast a `system-status` frame
    Get,
}

/// Body of a `set` command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCommand {
    pub relay: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_state: Option<u8>,

    /// New default run time, persisted by the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_duration: Option<u32>,
}

impl OutboundCommand {
    /// Switch a relay on or off
    pub fn set_target(relay: u8, active: bool) -> Self {
        OutboundCommand::Set(SetCommand {
            relay,
            target_state: Some(u8::from(active)),
            default_duration: None,
        })
    }

    /// Store a new default duration on the controller
    pub fn set_default_duration(relay: u8, seconds: u32) -> Self {
        OutboundCommand::Set(SetCommand {
            relay,
            target_state: None,
            default_duration: Some(seconds),
        })
    }

    /// Request a full status broadcast
    pub fn get_status() -> Self {
        OutboundCommand::Get
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
