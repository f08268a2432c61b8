//! Applying controller status frames to device state

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use controller_proto::{InboundFrame, MasterStatus, RelayStatus};
use tracing::debug;

use crate::models::{MasterState, ValveState};

/// What a frame changed
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FrameEffect {
    pub master: bool,
    pub relays: Vec<u8>,
}

/// Apply one inbound frame, received at `now`
///
/// A `system-status` frame has exactly the effect of its master status
/// followed by each of its relay statuses.
pub fn apply_frame(
    frame: &InboundFrame,
    master: &mut MasterState,
    valves: &mut BTreeMap<u8, ValveState>,
    now: DateTime<Utc>,
) -> FrameEffect {
    let mut effect = FrameEffect::default();
    match frame {
        InboundFrame::MasterStatus { status } => {
            apply_master(*status, master, &mut effect);
        }
        InboundFrame::RelayStatus(status) => {
            apply_relay(status, valves, now, &mut effect);
        }
        InboundFrame::SystemStatus {
            master: status,
            relays,
        } => {
            apply_master(*status, master, &mut effect);
            for relay in relays {
                apply_relay(relay, valves, now, &mut effect);
            }
        }
    }
    effect
}

fn apply_master(status: MasterStatus, master: &mut MasterState, effect: &mut FrameEffect) {
    master.apply(status);
    effect.master = true;
}

fn apply_relay(
    status: &RelayStatus,
    valves: &mut BTreeMap<u8, ValveState>,
    now: DateTime<Utc>,
    effect: &mut FrameEffect,
) {
    let Some(valve) = valves.get_mut(&status.relay) else {
        debug!("Ignoring status for unconfigured relay {}", status.relay);
        return;
    };
    valve.apply_status(status, now);
    if !effect.relays.contains(&status.relay) {
        effect.relays.push(status.relay);
    }
}
