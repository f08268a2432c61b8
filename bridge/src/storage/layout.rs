//! Storage layout configuration

use std::path::PathBuf;

use crate::filesys::file::File;

/// On-disk layout of the bridge's state directory
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Directory holding everything owned by the control surface
    pub fn accessories_dir(&self) -> PathBuf {
        self.base_dir.join("accessories")
    }

    /// Valve customizations, keyed by device name then valve index
    pub fn cache_file(&self) -> File {
        File::new(self.accessories_dir().join("esp-irrigation-controller.json"))
    }

    /// Devices announced to the control surface in earlier runs
    pub fn known_devices_file(&self) -> File {
        File::new(self.accessories_dir().join("known-devices.json"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/etc/irrigation-bridge");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".irrigation-bridge");

        Self::new(base_dir)
    }
}
