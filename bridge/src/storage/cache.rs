//! Valve customization cache

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::BridgeError;
use crate::filesys::file::File;

/// User customization of one valve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValveCustomization {
    pub configured_name: String,
}

/// Persisted document: device display name -> valve index -> customization
pub type CacheDocument = BTreeMap<String, BTreeMap<String, ValveCustomization>>;

/// Name given to a valve before the user renames it
pub fn default_valve_name(relay: u8) -> String {
    format!("Zone {}", relay)
}

/// In-memory customization cache, persisted as a whole on every mutation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomizationCache {
    doc: CacheDocument,
}

impl CustomizationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(doc: CacheDocument) -> Self {
        Self { doc }
    }

    /// Load the cache file
    ///
    /// A missing or unreadable file yields an empty cache.
    pub async fn load(file: &File) -> Self {
        if !file.exists().await {
            return Self::new();
        }
        match file.read_json::<CacheDocument>().await {
            Ok(doc) => Self { doc },
            Err(e) => {
                warn!(
                    "Ignoring unreadable cache file {}: {}",
                    file.path().display(),
                    e
                );
                Self::new()
            }
        }
    }

    /// Rewrite the whole cache file
    pub async fn save(&self, file: &File) -> Result<(), BridgeError> {
        file.write_json(&self.doc).await
    }

    pub fn document(&self) -> &CacheDocument {
        &self.doc
    }

    /// Configured name of a valve, if cached
    pub fn configured_name(&self, device: &str, relay: u8) -> Option<&str> {
        self.doc
            .get(device)
            .and_then(|valves| valves.get(&relay.to_string()))
            .map(|entry| entry.configured_name.as_str())
    }

    /// Make sure a valve has an entry, seeding the default name
    ///
    /// Returns the configured name.
    pub fn ensure_valve(&mut self, device: &str, relay: u8) -> String {
        self.doc
            .entry(device.to_string())
            .or_default()
            .entry(relay.to_string())
            .or_insert_with(|| ValveCustomization {
                configured_name: default_valve_name(relay),
            })
            .configured_name
            .clone()
    }

    /// Store a user-chosen valve name
    pub fn rename(&mut self, device: &str, relay: u8, name: &str) {
        self.doc
            .entry(device.to_string())
            .or_default()
            .insert(
                relay.to_string(),
                ValveCustomization {
                    configured_name: name.to_string(),
                },
            );
    }

    /// Drop the entry of a pruned valve
    pub fn remove_valve(&mut self, device: &str, relay: u8) -> Option<ValveCustomization> {
        self.doc
            .get_mut(device)
            .and_then(|valves| valves.remove(&relay.to_string()))
    }
}
