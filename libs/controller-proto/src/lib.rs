//! Controller protocol
//!
//! JSON frames exchanged with an ESP irrigation controller over its
//! websocket channel.

pub mod models;

pub use models::{InboundFrame, MasterStatus, OutboundCommand, RelayStatus, SetCommand};
