//! Cloneable handle to a running engine

use tokio::sync::oneshot;

use crate::discovery::Sighting;
use crate::engine::device::DeviceSnapshot;
use crate::engine::events::{ControlRequest, EngineEvent, EngineSender, Reply};
use crate::errors::BridgeError;
use crate::models::{DeviceId, ValveSnapshot};

#[derive(Debug, Clone)]
pub struct EngineHandle {
    events: EngineSender,
}

impl EngineHandle {
    pub fn new(events: EngineSender) -> Self {
        Self { events }
    }

    pub fn report_sighting(&self, sighting: Sighting) -> Result<(), BridgeError> {
        self.send(EngineEvent::Sighting(sighting))
    }

    pub async fn devices(&self) -> Result<Vec<DeviceSnapshot>, BridgeError> {
        self.request(|reply| ControlRequest::ListDevices { reply }).await
    }

    pub async fn device(&self, device: DeviceId) -> Result<DeviceSnapshot, BridgeError> {
        self.request(|reply| ControlRequest::Device { device, reply })
            .await
    }

    pub async fn valve(&self, device: DeviceId, relay: u8) -> Result<ValveSnapshot, BridgeError> {
        self.request(|reply| ControlRequest::Valve {
            device,
            relay,
            reply,
        })
        .await
    }

    pub async fn set_valve_active(
        &self,
        device: DeviceId,
        relay: u8,
        active: bool,
    ) -> Result<(), BridgeError> {
        self.request(|reply| ControlRequest::SetValveActive {
            device,
            relay,
            active,
            reply,
        })
        .await
    }

    pub async fn set_valve_duration(
        &self,
        device: DeviceId,
        relay: u8,
        seconds: u32,
    ) -> Result<(), BridgeError> {
        self.request(|reply| ControlRequest::SetValveDuration {
            device,
            relay,
            seconds,
            reply,
        })
        .await
    }

    pub async fn rename_valve(
        &self,
        device: DeviceId,
        relay: u8,
        name: String,
    ) -> Result<(), BridgeError> {
        self.request(|reply| ControlRequest::RenameValve {
            device,
            relay,
            name,
            reply,
        })
        .await
    }

    pub async fn remaining_duration(&self, device: DeviceId, relay: u8) -> Result<u32, BridgeError> {
        self.request(|reply| ControlRequest::RemainingDuration {
            device,
            relay,
            reply,
        })
        .await
    }

    pub async fn program_running(&self, device: DeviceId, subtype: &str) -> Result<bool, BridgeError> {
        let subtype = subtype.to_string();
        self.request(|reply| ControlRequest::ProgramState {
            device,
            subtype,
            reply,
        })
        .await
    }

    /// Switch a program on or off
    ///
    /// Returns whether the request changed anything; turning on a program
    /// that is already running is ignored.
    pub async fn set_program(
        &self,
        device: DeviceId,
        subtype: &str,
        on: bool,
    ) -> Result<bool, BridgeError> {
        let subtype = subtype.to_string();
        self.request(|reply| ControlRequest::SetProgram {
            device,
            subtype,
            on,
            reply,
        })
        .await
    }

    /// Ask the controller to broadcast its full status
    pub async fn refresh(&self, device: DeviceId) -> Result<(), BridgeError> {
        self.request(|reply| ControlRequest::RefreshStatus { device, reply })
            .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> ControlRequest,
    ) -> Result<T, BridgeError> {
        let (reply, response) = oneshot::channel();
        self.send(EngineEvent::Control(build(reply)))?;
        response.await.map_err(|_| engine_gone())?
    }

    fn send(&self, event: EngineEvent) -> Result<(), BridgeError> {
        self.events.send(event).map_err(|_| engine_gone())
    }
}

fn engine_gone() -> BridgeError {
    BridgeError::EngineError("engine is not running".to_string())
}
