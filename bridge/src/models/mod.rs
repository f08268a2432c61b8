//! Domain models

pub mod identity;
pub mod master;
pub mod program;
pub mod valve;

pub use identity::DeviceId;
pub use master::{MasterState, ProgramMode};
pub use program::ProgramDefinition;
pub use valve::{ValveSnapshot, ValveState};
