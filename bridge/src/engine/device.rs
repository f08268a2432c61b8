//! Per-device state owned by the engine

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use controller_proto::OutboundCommand;
use serde::Serialize;
use tracing::debug;

use crate::engine::events::{EngineEvent, EngineSender};
use crate::models::{DeviceId, MasterState, ProgramMode, ValveSnapshot, ValveState};
use crate::scheduler::{ProgramHost, ProgramScheduler, TimerHandle};
use crate::session::DeviceSession;
use crate::surface::{ControlSurface, DeviceLayout, ProgramSwitch};

/// A started controller
pub struct DeviceRecord {
    pub id: DeviceId,
    pub name: String,
    pub serial: String,
    pub session: DeviceSession,
    pub master: MasterState,
    pub valves: BTreeMap<u8, ValveState>,
    pub programs: BTreeMap<String, ProgramScheduler>,
}

impl DeviceRecord {
    pub fn layout(&self, now: DateTime<Utc>) -> DeviceLayout {
        DeviceLayout {
            id: self.id,
            name: self.name.clone(),
            serial: self.serial.clone(),
            master: self.master,
            valves: self.valves.values().map(|v| v.snapshot_at(now)).collect(),
            programs: self
                .programs
                .values()
                .map(|program| ProgramSwitch {
                    subtype: program.definition().subtype.clone(),
                    name: program.definition().name.clone(),
                    on: program.is_running(),
                })
                .collect(),
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> DeviceSnapshot {
        DeviceSnapshot {
            id: self.id,
            name: self.name.clone(),
            serial: self.serial.clone(),
            address: self.session.address(),
            connected: self.session.is_connected(),
            master: self.master,
            valves: self.valves.values().map(|v| v.snapshot_at(now)).collect(),
            programs: self
                .programs
                .values()
                .map(|program| ProgramSnapshot {
                    subtype: program.definition().subtype.clone(),
                    name: program.definition().name.clone(),
                    solenoids: program.definition().solenoids.clone(),
                    running: program.is_running(),
                    current_valve: program.current_valve(),
                    pending: program.pending(),
                })
                .collect(),
        }
    }

    /// Program mode implied by the current program states
    pub fn program_mode(&self) -> ProgramMode {
        if self.programs.values().any(ProgramScheduler::is_running) {
            ProgramMode::ManualProgramRunning
        } else {
            ProgramMode::NoProgramScheduled
        }
    }
}

/// Point-in-time view of a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub name: String,
    pub serial: String,
    pub address: SocketAddr,
    pub connected: bool,
    pub master: MasterState,
    pub valves: Vec<ValveSnapshot>,
    pub programs: Vec<ProgramSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramSnapshot {
    pub subtype: String,
    pub name: String,
    pub solenoids: Vec<u8>,
    pub running: bool,
    pub current_valve: Option<u8>,
    pub pending: Vec<u8>,
}

/// [`ProgramHost`] backed by a device's session and valves
pub struct DeviceHost<'a, S: ControlSurface> {
    pub id: DeviceId,
    pub session: &'a DeviceSession,
    pub valves: &'a mut BTreeMap<u8, ValveState>,
    pub surface: &'a mut S,
    pub events: &'a EngineSender,
}

impl<S: ControlSurface> ProgramHost for DeviceHost<'_, S> {
    fn valve_duration(&self, relay: u8) -> Option<u32> {
        self.valves.get(&relay).map(|valve| valve.set_duration)
    }

    fn set_valve_active(&mut self, relay: u8, active: bool) {
        self.session
            .send(OutboundCommand::set_target(relay, active));
        if let Some(valve) = self.valves.get_mut(&relay) {
            valve.active = active;
            self.surface
                .update_valve(self.id, &valve.snapshot_at(Utc::now()));
        }
    }

    fn arm_timer(&mut self, subtype: &str, generation: u64, delay: Duration) -> TimerHandle {
        let events = self.events.clone();
        let device = self.id;
        let subtype = subtype.to_string();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(EngineEvent::ProgramTimer {
                device,
                subtype,
                generation,
            });
        });
        TimerHandle::new(task.abort_handle())
    }

    fn program_stopped(&mut self, subtype: &str) {
        debug!("Program {} on {} is off", subtype, self.id);
        self.surface.update_program(self.id, subtype, false);
    }
}
