//! Devices announced to the control surface

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::BridgeError;
use crate::filesys::file::File;
use crate::models::DeviceId;

/// A device the control surface already knows about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownDevice {
    pub name: String,
    pub serial: String,
}

pub type KnownDocument = BTreeMap<DeviceId, KnownDevice>;

/// Load the known-devices file; missing or unreadable means none
pub async fn load_known_devices(file: &File) -> KnownDocument {
    if !file.exists().await {
        return KnownDocument::new();
    }
    match file.read_json::<KnownDocument>().await {
        Ok(doc) => doc,
        Err(e) => {
            warn!(
                "Ignoring unreadable known-devices file {}: {}",
                file.path().display(),
                e
            );
            KnownDocument::new()
        }
    }
}

pub async fn save_known_devices(file: &File, doc: &KnownDocument) -> Result<(), BridgeError> {
    file.write_json(doc).await
}
