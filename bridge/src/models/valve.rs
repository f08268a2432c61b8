//! Per-valve live state

use chrono::{DateTime, Duration, Utc};
use controller_proto::RelayStatus;
use serde::Serialize;

/// Run time assumed for a valve until its controller reports one
pub const DEFAULT_SET_DURATION_SECS: u32 = 300;

/// Live status and user customization of one valve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValveState {
    pub relay: u8,
    pub configured_name: String,
    pub active: bool,
    pub in_use: bool,

    /// Default run time in seconds, as stored on the controller
    pub set_duration: u32,

    /// When the controller is expected to switch this valve off
    scheduled_off: Option<DateTime<Utc>>,
}

impl ValveState {
    pub fn new(relay: u8, configured_name: impl Into<String>) -> Self {
        Self {
            relay,
            configured_name: configured_name.into(),
            active: false,
            in_use: false,
            set_duration: DEFAULT_SET_DURATION_SECS,
            scheduled_off: None,
        }
    }

    pub fn scheduled_off(&self) -> Option<DateTime<Utc>> {
        self.scheduled_off
    }

    /// Apply a relay status broadcast received at `now`
    pub fn apply_status(&mut self, status: &RelayStatus, now: DateTime<Utc>) {
        self.active = status.is_active();
        self.in_use = status.is_active();
        self.scheduled_off = if status.is_active() && status.remaining_duration > 0 {
            Some(now + Duration::seconds(status.remaining_duration))
        } else {
            None
        };
        if let Some(default_duration) = status.default_duration {
            self.set_duration = default_duration;
        }
    }

    /// Whole seconds left before the valve switches off, evaluated at `now`
    pub fn remaining_duration_at(&self, now: DateTime<Utc>) -> u32 {
        let Some(off_at) = self.scheduled_off else {
            return 0;
        };
        let remaining = (off_at - now).num_seconds();
        u32::try_from(remaining.max(0)).unwrap_or(u32::MAX)
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> ValveSnapshot {
        ValveSnapshot {
            relay: self.relay,
            configured_name: self.configured_name.clone(),
            active: self.active,
            in_use: self.in_use,
            set_duration: self.set_duration,
            remaining_duration: self.remaining_duration_at(now),
        }
    }
}

/// Point-in-time view of a valve
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValveSnapshot {
    pub relay: u8,
    pub configured_name: String,
    pub active: bool,
    pub in_use: bool,
    pub set_duration: u32,
    pub remaining_duration: u32,
}
