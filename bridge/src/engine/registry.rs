//! Device registry
//!
//! Tracks started devices, devices known from earlier runs, and which of
//! them have been sighted since startup.

use std::collections::{BTreeSet, HashMap};

use crate::engine::device::DeviceRecord;
use crate::models::DeviceId;
use crate::storage::known::{KnownDevice, KnownDocument};

#[derive(Default)]
pub struct Registry {
    devices: HashMap<DeviceId, DeviceRecord>,
    known: KnownDocument,
    seen: BTreeSet<DeviceId>,
    evicted: BTreeSet<DeviceId>,
}

impl Registry {
    pub fn new(known: KnownDocument) -> Self {
        Self {
            known,
            ..Default::default()
        }
    }

    pub fn get(&self, id: &DeviceId) -> Option<&DeviceRecord> {
        self.devices.get(id)
    }

    pub fn get_mut(&mut self, id: &DeviceId) -> Option<&mut DeviceRecord> {
        self.devices.get_mut(id)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.contains_key(id)
    }

    pub fn insert(&mut self, record: DeviceRecord) {
        self.devices.insert(record.id, record);
    }

    pub fn ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.devices.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn records(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    /// Take every started device out of the registry
    pub fn drain(&mut self) -> impl Iterator<Item = DeviceRecord> + '_ {
        self.devices.drain().map(|(_, record)| record)
    }

    /// Record a device as known; returns true if it was not known before
    pub fn remember(&mut self, id: DeviceId, device: KnownDevice) -> bool {
        self.known.insert(id, device).is_none()
    }

    pub fn known(&self) -> &KnownDocument {
        &self.known
    }

    pub fn mark_seen(&mut self, id: DeviceId) {
        self.seen.insert(id);
        self.evicted.remove(&id);
    }

    /// Known or started devices not sighted since startup and not yet evicted
    pub fn unseen(&self) -> Vec<DeviceId> {
        self.known
            .keys()
            .chain(self.devices.keys())
            .filter(|id| !self.seen.contains(id) && !self.evicted.contains(id))
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Forget an unseen device
    pub fn evict(&mut self, id: DeviceId) {
        self.known.remove(&id);
        self.devices.remove(&id);
        self.evicted.insert(id);
    }
}
