//! In-memory control surface
//!
//! Keeps the latest pushed state of every device so it can be served over
//! the local HTTP API.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::debug;

use crate::models::{DeviceId, MasterState, ValveSnapshot};
use crate::surface::{ControlSurface, DeviceLayout, ProgramSwitch};

/// Surface-side view of a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceDevice {
    pub id: DeviceId,
    pub name: String,
    pub serial: String,
    pub registered: bool,
    pub reachable: bool,
    pub master: MasterState,
    pub valves: BTreeMap<u8, ValveSnapshot>,
    pub programs: BTreeMap<String, ProgramSwitch>,
}

impl SurfaceDevice {
    fn from_layout(layout: &DeviceLayout) -> Self {
        Self {
            id: layout.id,
            name: layout.name.clone(),
            serial: layout.serial.clone(),
            registered: false,
            reachable: false,
            master: layout.master,
            valves: BTreeMap::new(),
            programs: BTreeMap::new(),
        }
    }
}

/// Device registrations and removals, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Registered(DeviceId),
    Unregistered(DeviceId),
}

/// Lifecycle entries kept, oldest dropped first
const LIFECYCLE_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct Inner {
    devices: BTreeMap<DeviceId, SurfaceDevice>,
    lifecycle: VecDeque<Lifecycle>,
}

impl Inner {
    fn record(&mut self, entry: Lifecycle) {
        if self.lifecycle.len() == LIFECYCLE_CAPACITY {
            self.lifecycle.pop_front();
        }
        self.lifecycle.push_back(entry);
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySurface {
    inner: Arc<RwLock<Inner>>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn devices(&self) -> Vec<SurfaceDevice> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.devices.values().cloned().collect()
    }

    pub fn device(&self, id: DeviceId) -> Option<SurfaceDevice> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.devices.get(&id).cloned()
    }

    /// Most recent registrations and removals, oldest first
    pub fn lifecycle(&self) -> Vec<Lifecycle> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.lifecycle.iter().copied().collect()
    }

    fn with_device(&self, id: DeviceId, f: impl FnOnce(&mut SurfaceDevice)) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match inner.devices.get_mut(&id) {
            Some(device) => f(device),
            None => debug!("Surface has no device {}", id),
        }
    }
}

impl ControlSurface for MemorySurface {
    fn configure_device(&mut self, layout: &DeviceLayout) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let device = inner
            .devices
            .entry(layout.id)
            .or_insert_with(|| SurfaceDevice::from_layout(layout));

        device.name = layout.name.clone();
        device.serial = layout.serial.clone();
        device.master = layout.master;
        for valve in &layout.valves {
            device.valves.insert(valve.relay, valve.clone());
        }
        for program in &layout.programs {
            device
                .programs
                .insert(program.subtype.clone(), program.clone());
        }
    }

    fn register_device(&mut self, id: DeviceId) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(device) = inner.devices.get_mut(&id) {
            device.registered = true;
        }
        inner.record(Lifecycle::Registered(id));
    }

    fn restore_device(&mut self, id: DeviceId) {
        self.with_device(id, |device| device.registered = true);
    }

    fn unregister_device(&mut self, id: DeviceId) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.devices.remove(&id);
        inner.record(Lifecycle::Unregistered(id));
    }

    fn set_reachable(&mut self, id: DeviceId, reachable: bool) {
        self.with_device(id, |device| device.reachable = reachable);
    }

    fn update_master(&mut self, id: DeviceId, master: &MasterState) {
        self.with_device(id, |device| device.master = *master);
    }

    fn update_valve(&mut self, id: DeviceId, valve: &ValveSnapshot) {
        self.with_device(id, |device| {
            device.valves.insert(valve.relay, valve.clone());
        });
    }

    fn remove_valve(&mut self, id: DeviceId, relay: u8) {
        self.with_device(id, |device| {
            device.valves.remove(&relay);
        });
    }

    fn update_program(&mut self, id: DeviceId, subtype: &str, on: bool) {
        self.with_device(id, |device| {
            if let Some(program) = device.programs.get_mut(subtype) {
                program.on = on;
            }
        });
    }

    fn retain_programs(&mut self, id: DeviceId, subtypes: &[String]) {
        self.with_device(id, |device| {
            device.programs.retain(|subtype, _| subtypes.contains(subtype));
        });
    }
}
