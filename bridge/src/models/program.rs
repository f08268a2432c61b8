//! Program definitions

use serde::Serialize;

/// A named sequence of valves run one after another
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramDefinition {
    pub name: String,

    /// Key of the program's switch control, derived from the name
    pub subtype: String,

    /// Valve indices in run order
    pub solenoids: Vec<u8>,
}

impl ProgramDefinition {
    /// Build a program from its configured name and comma separated valve list
    ///
    /// Entries that are not integers, are zero, or exceed `active_solenoids`
    /// are dropped. Order and duplicates are kept as configured.
    pub fn new(name: &str, solenoids: &str, active_solenoids: u8) -> Self {
        let solenoids = solenoids
            .split(',')
            .filter_map(|entry| entry.trim().parse::<i64>().ok())
            .filter(|index| *index > 0 && *index <= i64::from(active_solenoids))
            .filter_map(|index| u8::try_from(index).ok())
            .collect();

        Self {
            name: name.to_string(),
            subtype: program_subtype(name),
            solenoids,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.solenoids.is_empty()
    }
}

/// Switch subtype for a program name, e.g. `Front Lawn` -> `program-front_lawn`
pub fn program_subtype(name: &str) -> String {
    format!("program-{}", name.to_lowercase().replace(' ', "_"))
}
