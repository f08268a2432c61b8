//! Capability objects for individual controls
//!
//! Each control exposes a read and a write, both routed through the engine.

use async_trait::async_trait;

use crate::engine::EngineHandle;
use crate::errors::BridgeError;
use crate::models::DeviceId;

#[async_trait]
pub trait Control: Send + Sync {
    type Value: Send;

    async fn get(&self) -> Result<Self::Value, BridgeError>;

    async fn set(&self, value: Self::Value) -> Result<(), BridgeError>;
}

/// Whether a valve is switched on
pub struct ValveActive {
    engine: EngineHandle,
    device: DeviceId,
    relay: u8,
}

impl ValveActive {
    pub fn new(engine: EngineHandle, device: DeviceId, relay: u8) -> Self {
        Self {
            engine,
            device,
            relay,
        }
    }
}

#[async_trait]
impl Control for ValveActive {
    type Value = bool;

    async fn get(&self) -> Result<bool, BridgeError> {
        Ok(self.engine.valve(self.device, self.relay).await?.active)
    }

    async fn set(&self, value: bool) -> Result<(), BridgeError> {
        self.engine
            .set_valve_active(self.device, self.relay, value)
            .await
    }
}

/// Default run time of a valve in seconds
pub struct ValveSetDuration {
    engine: EngineHandle,
    device: DeviceId,
    relay: u8,
}

impl ValveSetDuration {
    pub fn new(engine: EngineHandle, device: DeviceId, relay: u8) -> Self {
        Self {
            engine,
            device,
            relay,
        }
    }
}

#[async_trait]
impl Control for ValveSetDuration {
    type Value = u32;

    async fn get(&self) -> Result<u32, BridgeError> {
        Ok(self.engine.valve(self.device, self.relay).await?.set_duration)
    }

    async fn set(&self, value: u32) -> Result<(), BridgeError> {
        self.engine
            .set_valve_duration(self.device, self.relay, value)
            .await
    }
}

/// User-chosen valve name, persisted across restarts
pub struct ValveName {
    engine: EngineHandle,
    device: DeviceId,
    relay: u8,
}

impl ValveName {
    pub fn new(engine: EngineHandle, device: DeviceId, relay: u8) -> Self {
        Self {
            engine,
            device,
            relay,
        }
    }
}

#[async_trait]
impl Control for ValveName {
    type Value = String;

    async fn get(&self) -> Result<String, BridgeError> {
        Ok(self
            .engine
            .valve(self.device, self.relay)
            .await?
            .configured_name)
    }

    async fn set(&self, value: String) -> Result<(), BridgeError> {
        self.engine.rename_valve(self.device, self.relay, value).await
    }
}

/// Seconds until a valve switches off; read-only
pub struct ValveRemainingDuration {
    engine: EngineHandle,
    device: DeviceId,
    relay: u8,
}

impl ValveRemainingDuration {
    pub fn new(engine: EngineHandle, device: DeviceId, relay: u8) -> Self {
        Self {
            engine,
            device,
            relay,
        }
    }
}

#[async_trait]
impl Control for ValveRemainingDuration {
    type Value = u32;

    async fn get(&self) -> Result<u32, BridgeError> {
        self.engine.remaining_duration(self.device, self.relay).await
    }

    async fn set(&self, _value: u32) -> Result<(), BridgeError> {
        Err(BridgeError::ReadOnly("remaining duration".to_string()))
    }
}

/// On while the program runs
pub struct ProgramSwitchControl {
    engine: EngineHandle,
    device: DeviceId,
    subtype: String,
}

impl ProgramSwitchControl {
    pub fn new(engine: EngineHandle, device: DeviceId, subtype: impl Into<String>) -> Self {
        Self {
            engine,
            device,
            subtype: subtype.into(),
        }
    }
}

#[async_trait]
impl Control for ProgramSwitchControl {
    type Value = bool;

    async fn get(&self) -> Result<bool, BridgeError> {
        self.engine.program_running(self.device, &self.subtype).await
    }

    async fn set(&self, value: bool) -> Result<(), BridgeError> {
        self.engine
            .set_program(self.device, &self.subtype, value)
            .await
            .map(|_| ())
    }
}
