//! Device sessions
//!
//! A session owns the duplex channel to one controller. Reconnection is the
//! link's business; the session only tracks where the link points and
//! whether it is currently up.

pub mod frames;
pub mod ws;

use std::net::SocketAddr;

use controller_proto::OutboundCommand;
use futures::future::BoxFuture;
use tracing::debug;

use crate::engine::events::EngineSender;
use crate::errors::BridgeError;
use crate::models::DeviceId;

/// Connection status reported by a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting { attempt: u32 },
    Connected,
    Disconnected { reason: String },
}

/// Where a link should connect
#[derive(Debug, Clone)]
pub struct LinkTarget {
    pub device: DeviceId,
    pub name: String,
    pub address: SocketAddr,

    /// Tags every event the link reports; bumped each time the session is
    /// repointed so events from a replaced link can be told apart
    pub generation: u64,
}

impl LinkTarget {
    pub fn new(device: DeviceId, name: impl Into<String>, address: SocketAddr) -> Self {
        Self {
            device,
            name: name.into(),
            address,
            generation: 0,
        }
    }
}

/// Outbound half of a reliable duplex channel with built-in reconnect
///
/// Inbound frames and status changes are reported to the engine through the
/// sender passed to [`Connector::open`].
pub trait Link: Send {
    fn send(&self, command: OutboundCommand) -> Result<(), BridgeError>;

    /// Flush queued commands and close the channel
    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async {})
    }
}

/// Opens links to controllers
pub trait Connector: Send + Sync {
    fn open(&self, target: LinkTarget, events: EngineSender) -> Box<dyn Link>;
}

/// Channel state for one controller
pub struct DeviceSession {
    address: SocketAddr,
    link: Box<dyn Link>,
    generation: u64,
    connected: bool,
}

impl DeviceSession {
    pub fn open(connector: &dyn Connector, target: LinkTarget, events: EngineSender) -> Self {
        let target = LinkTarget {
            generation: 0,
            ..target
        };
        Self {
            address: target.address,
            link: connector.open(target, events),
            generation: 0,
            connected: false,
        }
    }

    /// Address the current link points at
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether an event tagged with `generation` came from the current link
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Replace the link with one pointing at a new address
    ///
    /// The old link is closed in the background.
    pub fn repoint(&mut self, connector: &dyn Connector, target: LinkTarget, events: EngineSender) {
        self.generation = self.generation.wrapping_add(1);
        let target = LinkTarget {
            generation: self.generation,
            ..target
        };
        self.address = target.address;
        self.connected = false;
        let previous = std::mem::replace(&mut self.link, connector.open(target, events));
        tokio::spawn(previous.close());
    }

    pub fn set_status(&mut self, status: &ConnectionStatus) {
        self.connected = matches!(status, ConnectionStatus::Connected);
    }

    /// Fire-and-forget send; the next status frame reconciles the outcome
    pub fn send(&self, command: OutboundCommand) {
        if let Err(e) = self.link.send(command) {
            debug!("Dropping command for {}: {}", self.address, e);
        }
    }

    /// Close the link once commands already sent have been written
    pub fn close(self) -> BoxFuture<'static, ()> {
        self.link.close()
    }
}
