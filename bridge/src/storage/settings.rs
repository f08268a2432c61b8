//! Settings file management

use serde::{Deserialize, Serialize};

use controller_proto::models::MAX_RELAYS;

use crate::errors::BridgeError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Bridge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Platform identifier
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Platform display name
    #[serde(default = "default_name")]
    pub name: String,

    /// Number of valves wired on every controller
    pub active_solenoids: u8,

    /// Accepted for compatibility with existing configs, not used
    #[serde(default)]
    pub activation_delay: Option<u64>,

    /// Program switches created on every controller
    #[serde(default)]
    pub programs: Vec<ProgramConfig>,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON logs on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Also write daily log files under the storage directory
    #[serde(default)]
    pub log_to_file: bool,

    /// Local HTTP API
    #[serde(default)]
    pub server: ServerSettings,

    /// Controller discovery
    #[serde(default)]
    pub discovery: DiscoverySettings,

    /// Controller channel
    #[serde(default)]
    pub session: SessionSettings,
}

fn default_true() -> bool {
    true
}

fn default_platform() -> String {
    "esp-irrigation-controller".to_string()
}

fn default_name() -> String {
    "ESP Irrigation".to_string()
}

impl Settings {
    /// Settings with defaults everywhere except the valve count
    pub fn new(active_solenoids: u8) -> Self {
        Self {
            platform: default_platform(),
            name: default_name(),
            active_solenoids,
            activation_delay: None,
            programs: Vec::new(),
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            server: ServerSettings::default(),
            discovery: DiscoverySettings::default(),
            session: SessionSettings::default(),
        }
    }

    /// Read and validate a settings file
    pub async fn load(file: &File) -> Result<Self, BridgeError> {
        let settings: Settings = file.read_json().await.map_err(|e| {
            BridgeError::ConfigError(format!(
                "unable to read {}: {}",
                file.path().display(),
                e
            ))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.active_solenoids == 0 || self.active_solenoids > MAX_RELAYS {
            return Err(BridgeError::ConfigError(format!(
                "activeSolenoids must be between 1 and {}, got {}",
                MAX_RELAYS, self.active_solenoids
            )));
        }
        if let Some(program) = self.programs.iter().find(|p| p.name.trim().is_empty()) {
            return Err(BridgeError::ConfigError(format!(
                "program with solenoids \"{}\" has no name",
                program.solenoids
            )));
        }
        Ok(())
    }
}

/// A configured program
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramConfig {
    pub name: String,

    /// Comma separated valve indices, e.g. `"1,2,3"`
    pub solenoids: String,

    /// Ignored, the switch subtype is always derived from the name
    #[serde(default)]
    pub subtype: Option<String>,
}

/// Local HTTP API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8581
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverySettings {
    /// Delay before the catch-up probe after startup
    #[serde(default = "default_initial_probe_delay")]
    pub initial_probe_delay_secs: u64,

    /// Steady-state probe interval
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Devices not seen within this window after startup are removed
    #[serde(default = "default_eviction_grace")]
    pub eviction_grace_hours: u64,

    /// Controllers announced by the static discovery feed
    #[serde(default)]
    pub controllers: Vec<StaticController>,
}

fn default_initial_probe_delay() -> u64 {
    5
}

fn default_probe_interval() -> u64 {
    60
}

fn default_eviction_grace() -> u64 {
    72
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            initial_probe_delay_secs: default_initial_probe_delay(),
            probe_interval_secs: default_probe_interval(),
            eviction_grace_hours: default_eviction_grace(),
            controllers: Vec::new(),
        }
    }
}

/// A controller announced without network discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticController {
    pub name: String,
    pub host: String,

    #[serde(default = "default_controller_port")]
    pub port: u16,

    pub mac: String,
}

fn default_controller_port() -> u16 {
    81
}

/// Controller channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,

    #[serde(default = "default_reconnect_base_delay")]
    pub reconnect_base_delay_ms: u64,

    #[serde(default = "default_reconnect_max_delay")]
    pub reconnect_max_delay_ms: u64,
}

fn default_handshake_timeout() -> u64 {
    2000
}

fn default_reconnect_base_delay() -> u64 {
    1000
}

fn default_reconnect_max_delay() -> u64 {
    30_000
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: default_handshake_timeout(),
            reconnect_base_delay_ms: default_reconnect_base_delay(),
            reconnect_max_delay_ms: default_reconnect_max_delay(),
        }
    }
}
