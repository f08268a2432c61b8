//! Master valve state exposed on the per-device system control

use controller_proto::MasterStatus;
use serde::Serialize;

/// Program mode reported by the system control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramMode {
    #[default]
    NoProgramScheduled,
    ManualProgramRunning,
}

/// Live state of the controller's master valve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterState {
    pub active: bool,
    pub in_use: bool,
    pub program_mode: ProgramMode,
}

impl MasterState {
    /// Apply a master status broadcast
    ///
    /// While winding down only the in-use flag clears; the active flag keeps
    /// whatever the last running/inactive broadcast set.
    pub fn apply(&mut self, status: MasterStatus) {
        match status {
            MasterStatus::Running => {
                self.active = true;
                self.in_use = true;
            }
            MasterStatus::WindingDown => {
                self.in_use = false;
            }
            MasterStatus::Inactive => {
                self.active = false;
                self.in_use = false;
            }
        }
    }
}
