//! Control surface adapter
//!
//! The engine pushes device state out through [`ControlSurface`]. Reads and
//! writes coming back from the surface go through the capability objects in
//! [`controls`].

pub mod controls;
pub mod memory;

use serde::Serialize;

use crate::models::{DeviceId, MasterState, ValveSnapshot};

pub use controls::Control;
pub use memory::MemorySurface;

/// A program's switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramSwitch {
    pub subtype: String,
    pub name: String,
    pub on: bool,
}

/// Everything the surface shows for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLayout {
    pub id: DeviceId,
    pub name: String,
    pub serial: String,
    pub master: MasterState,
    pub valves: Vec<ValveSnapshot>,
    pub programs: Vec<ProgramSwitch>,
}

/// Outbound side of the control surface
///
/// Implementations must tolerate updates for controls they do not have.
pub trait ControlSurface: Send + 'static {
    /// Create or refresh a device's system, valve and program controls
    fn configure_device(&mut self, layout: &DeviceLayout);

    /// Announce a device the surface has not seen before
    fn register_device(&mut self, device: DeviceId);

    /// Adopt a device announced during an earlier run
    fn restore_device(&mut self, device: DeviceId);

    /// Withdraw a device and all of its controls
    fn unregister_device(&mut self, device: DeviceId);

    fn set_reachable(&mut self, device: DeviceId, reachable: bool);

    fn update_master(&mut self, device: DeviceId, master: &MasterState);

    fn update_valve(&mut self, device: DeviceId, valve: &ValveSnapshot);

    fn remove_valve(&mut self, device: DeviceId, relay: u8);

    fn update_program(&mut self, device: DeviceId, subtype: &str, on: bool);

    /// Drop program switches whose subtype is not listed
    fn retain_programs(&mut self, device: DeviceId, subtypes: &[String]);
}
