//! Events processed by the engine loop

use controller_proto::InboundFrame;
use tokio::sync::{mpsc, oneshot};

use crate::discovery::Sighting;
use crate::engine::device::DeviceSnapshot;
use crate::errors::BridgeError;
use crate::models::{DeviceId, ValveSnapshot};
use crate::session::ConnectionStatus;

pub type EngineSender = mpsc::UnboundedSender<EngineEvent>;
pub type EngineReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Reply channel of a control request
pub type Reply<T> = oneshot::Sender<Result<T, BridgeError>>;

#[derive(Debug)]
pub enum EngineEvent {
    /// A controller was found on the network
    Sighting(Sighting),

    /// A status frame arrived on a device link
    Frame {
        device: DeviceId,
        link: u64,
        frame: InboundFrame,
    },

    /// A device link changed state
    Connection {
        device: DeviceId,
        link: u64,
        status: ConnectionStatus,
    },

    /// A program step timer expired
    ProgramTimer {
        device: DeviceId,
        subtype: String,
        generation: u64,
    },

    /// The eviction grace period after startup ended
    EvictionCheck,

    Control(ControlRequest),
}

/// Reads and writes issued by the control surface
#[derive(Debug)]
pub enum ControlRequest {
    ListDevices {
        reply: Reply<Vec<DeviceSnapshot>>,
    },
    Device {
        device: DeviceId,
        reply: Reply<DeviceSnapshot>,
    },
    Valve {
        device: DeviceId,
        relay: u8,
        reply: Reply<ValveSnapshot>,
    },
    SetValveActive {
        device: DeviceId,
        relay: u8,
        active: bool,
        reply: Reply<()>,
    },
    SetValveDuration {
        device: DeviceId,
        relay: u8,
        seconds: u32,
        reply: Reply<()>,
    },
    RenameValve {
        device: DeviceId,
        relay: u8,
        name: String,
        reply: Reply<()>,
    },
    RemainingDuration {
        device: DeviceId,
        relay: u8,
        reply: Reply<u32>,
    },
    ProgramState {
        device: DeviceId,
        subtype: String,
        reply: Reply<bool>,
    },
    SetProgram {
        device: DeviceId,
        subtype: String,
        on: bool,
        reply: Reply<bool>,
    },
    RefreshStatus {
        device: DeviceId,
        reply: Reply<()>,
    },
}
