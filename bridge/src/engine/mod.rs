//! Device engine
//!
//! A single task owns every device: sightings, inbound frames, timer
//! expiries and control requests are all processed in order from one
//! event channel.

pub mod device;
pub mod events;
pub mod handle;
pub mod registry;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use controller_proto::models::MAX_RELAYS;
use controller_proto::OutboundCommand;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::discovery::Sighting;
use crate::engine::device::{DeviceHost, DeviceRecord};
use crate::engine::events::{ControlRequest, EngineEvent, EngineReceiver, EngineSender};
use crate::engine::registry::Registry;
use crate::errors::BridgeError;
use crate::models::{DeviceId, MasterState, ProgramDefinition, ValveState};
use crate::scheduler::ProgramScheduler;
use crate::session::frames::apply_frame;
use crate::session::{ConnectionStatus, Connector, DeviceSession, LinkTarget};
use crate::storage::cache::CustomizationCache;
use crate::storage::known::{KnownDevice, KnownDocument};
use crate::storage::settings::Settings;
use crate::surface::ControlSurface;
use crate::utils::titleize;
use crate::workers::persist::{PersistJob, PersistSender};

pub use device::{DeviceSnapshot, ProgramSnapshot};
pub use handle::EngineHandle;

/// Engine options
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Valves wired on every controller
    pub active_solenoids: u8,

    /// Programs created on every controller
    pub programs: Vec<ProgramDefinition>,

    /// Known devices not sighted within this window are removed
    pub eviction_grace: Duration,
}

impl EngineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        let programs = settings
            .programs
            .iter()
            .map(|program| {
                let definition = ProgramDefinition::new(
                    &program.name,
                    &program.solenoids,
                    settings.active_solenoids,
                );
                if definition.is_empty() {
                    warn!(
                        "Program {} has no valves within 1..={}",
                        definition.name, settings.active_solenoids
                    );
                }
                definition
            })
            .collect();

        Self {
            active_solenoids: settings.active_solenoids,
            programs,
            eviction_grace: Duration::from_secs(
                settings.discovery.eviction_grace_hours.saturating_mul(3600),
            ),
        }
    }
}

pub struct Engine<S: ControlSurface> {
    options: EngineOptions,
    registry: Registry,
    cache: CustomizationCache,
    surface: S,
    connector: Arc<dyn Connector>,
    persist: PersistSender,
    events: EngineSender,
    inbox: EngineReceiver,
}

impl<S: ControlSurface> Engine<S> {
    pub fn new(
        options: EngineOptions,
        cache: CustomizationCache,
        known: KnownDocument,
        surface: S,
        connector: Arc<dyn Connector>,
        persist: PersistSender,
    ) -> Self {
        let (events, inbox) = mpsc::unbounded_channel();
        Self {
            options,
            registry: Registry::new(known),
            cache,
            surface,
            connector,
            persist,
            events,
            inbox,
        }
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle::new(self.events.clone())
    }

    /// Process events until shutdown, then stop every running program
    pub async fn run(mut self, mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>) {
        info!("Engine starting...");
        let eviction_timer = self.arm_eviction();

        loop {
            tokio::select! {
                _ = &mut shutdown_signal => break,
                event = self.inbox.recv() => match event {
                    None => break,
                    Some(event) => self.handle_event(event),
                },
            }
        }

        eviction_timer.abort();
        self.stop_all_programs();
        self.close_sessions().await;
        info!("Engine stopped");
    }

    fn arm_eviction(&self) -> JoinHandle<()> {
        let events = self.events.clone();
        let grace = self.options.eviction_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = events.send(EngineEvent::EvictionCheck);
        })
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Sighting(sighting) => self.on_sighting(sighting),
            EngineEvent::Frame {
                device,
                link,
                frame,
            } => {
                let Some(record) = self.registry.get_mut(&device) else {
                    debug!("Dropping frame for unknown device {}", device);
                    return;
                };
                if !record.session.is_current(link) {
                    debug!("[{}] Dropping frame from a replaced link", record.name);
                    return;
                }
                let now = Utc::now();
                let effect = apply_frame(&frame, &mut record.master, &mut record.valves, now);
                if effect.master {
                    self.surface.update_master(device, &record.master);
                }
                for relay in effect.relays {
                    if let Some(valve) = record.valves.get(&relay) {
                        self.surface.update_valve(device, &valve.snapshot_at(now));
                    }
                }
            }
            EngineEvent::Connection {
                device,
                link,
                status,
            } => self.on_connection(device, link, status),
            EngineEvent::ProgramTimer {
                device,
                subtype,
                generation,
            } => {
                let result = self.with_program(device, &subtype, |program, host| {
                    program.on_timer(generation, host)
                });
                if let Err(e) = result {
                    debug!("Dropping timer: {}", e);
                }
            }
            EngineEvent::EvictionCheck => {
                self.evict_unseen();
            }
            EngineEvent::Control(request) => self.on_control(request),
        }
    }

    // ================================ DEVICES ================================== //

    fn on_sighting(&mut self, sighting: Sighting) {
        self.registry.mark_seen(sighting.id);
        if !self.registry.contains(&sighting.id) {
            self.start_device(sighting);
            return;
        }

        let connector = self.connector.clone();
        let events = self.events.clone();
        let Some(record) = self.registry.get_mut(&sighting.id) else {
            return;
        };

        let address = sighting.address();
        if record.session.address() == address {
            debug!(
                "Found existing ESP Irrigation System at {} [{}]",
                address, record.name
            );
            return;
        }

        info!(
            "ESP Irrigation System {} moved from {} to {}",
            record.name,
            record.session.address(),
            address
        );
        let target = LinkTarget::new(record.id, record.name.clone(), address);
        record.session.repoint(connector.as_ref(), target, events);
        self.surface.set_reachable(sighting.id, false);
    }

    fn start_device(&mut self, sighting: Sighting) {
        let id = sighting.id;
        let name = titleize(&sighting.name);
        let active = self.options.active_solenoids;
        info!(
            "Found new ESP Irrigation System at {} [{}]",
            sighting.address(),
            name
        );

        let valves: BTreeMap<u8, ValveState> = (1..=active)
            .map(|relay| {
                let configured_name = self.cache.ensure_valve(&name, relay);
                (relay, ValveState::new(relay, configured_name))
            })
            .collect();

        let pruned: Vec<u8> = (active.saturating_add(1)..=MAX_RELAYS).collect();
        for relay in &pruned {
            if self.cache.remove_valve(&name, *relay).is_some() {
                debug!("Removed cached valve {} of {}", relay, name);
            }
        }

        let programs: BTreeMap<String, ProgramScheduler> = self
            .options
            .programs
            .iter()
            .map(|definition| {
                (
                    definition.subtype.clone(),
                    ProgramScheduler::new(definition.clone()),
                )
            })
            .collect();

        let target = LinkTarget::new(id, name.clone(), sighting.address());
        let session = DeviceSession::open(self.connector.as_ref(), target, self.events.clone());

        let record = DeviceRecord {
            id,
            name: name.clone(),
            serial: sighting.serial.clone(),
            session,
            master: MasterState::default(),
            valves,
            programs,
        };

        let layout = record.layout(Utc::now());
        let subtypes: Vec<String> = record.programs.keys().cloned().collect();
        self.registry.insert(record);

        self.surface.configure_device(&layout);
        for relay in pruned {
            self.surface.remove_valve(id, relay);
        }
        self.surface.retain_programs(id, &subtypes);

        let known = KnownDevice {
            name,
            serial: sighting.serial,
        };
        if self.registry.remember(id, known) {
            self.surface.register_device(id);
            self.persist_known();
        } else {
            self.surface.restore_device(id);
        }
        self.persist_cache();
    }

    fn on_connection(&mut self, device: DeviceId, link: u64, status: ConnectionStatus) {
        let Some(record) = self.registry.get_mut(&device) else {
            return;
        };
        if !record.session.is_current(link) {
            debug!("[{}] Ignoring {:?} from a replaced link", record.name, status);
            return;
        }
        let was_connected = record.session.is_connected();
        record.session.set_status(&status);

        match &status {
            ConnectionStatus::Connecting { attempt } => {
                debug!("[{}] Connecting (attempt {})", record.name, attempt);
            }
            ConnectionStatus::Connected => {
                info!("[{}] Connected", record.name);
                record.session.send(OutboundCommand::get_status());
            }
            ConnectionStatus::Disconnected { reason } => {
                if was_connected {
                    warn!("[{}] Disconnected: {}", record.name, reason);
                }
            }
        }

        let connected = record.session.is_connected();
        if connected != was_connected {
            self.surface.set_reachable(device, connected);
        }
    }

    /// Remove devices not sighted since startup; each is removed once
    pub fn evict_unseen(&mut self) -> Vec<DeviceId> {
        let unseen = self.registry.unseen();
        for id in &unseen {
            info!("Removing ESP Irrigation System {}, not seen since startup", id);
            self.surface.unregister_device(*id);
            self.registry.evict(*id);
        }
        if !unseen.is_empty() {
            self.persist_known();
        }
        unseen
    }

    // ================================ PROGRAMS ================================= //

    fn with_program<R>(
        &mut self,
        device: DeviceId,
        subtype: &str,
        f: impl FnOnce(&mut ProgramScheduler, &mut DeviceHost<'_, S>) -> R,
    ) -> Result<R, BridgeError> {
        let record = self
            .registry
            .get_mut(&device)
            .ok_or_else(|| unknown_device(device))?;
        let DeviceRecord {
            id,
            session,
            valves,
            programs,
            ..
        } = &mut *record;

        let program = programs.get_mut(subtype).ok_or_else(|| {
            BridgeError::NotFound(format!("program {} on device {}", subtype, device))
        })?;
        let mut host = DeviceHost {
            id: *id,
            session,
            valves,
            surface: &mut self.surface,
            events: &self.events,
        };
        let result = f(program, &mut host);

        let mode = record.program_mode();
        if record.master.program_mode != mode {
            record.master.program_mode = mode;
            self.surface.update_master(device, &record.master);
        }
        Ok(result)
    }

    fn set_program(&mut self, device: DeviceId, subtype: &str, on: bool) -> Result<bool, BridgeError> {
        let accepted = self.with_program(device, subtype, |program, host| {
            if on {
                program.start(host)
            } else {
                program.stop(host);
                true
            }
        })?;
        if on && accepted {
            self.surface.update_program(device, subtype, true);
        }
        Ok(accepted)
    }

    fn stop_all_programs(&mut self) {
        for id in self.registry.ids() {
            let running: Vec<String> = self
                .registry
                .get(&id)
                .map(|record| {
                    record
                        .programs
                        .iter()
                        .filter(|(_, program)| program.is_running())
                        .map(|(subtype, _)| subtype.clone())
                        .collect()
                })
                .unwrap_or_default();
            for subtype in running {
                if let Err(e) = self.set_program(id, &subtype, false) {
                    warn!("Unable to stop {}: {}", subtype, e);
                }
            }
        }
    }

    /// Close every link after its queued commands went out
    async fn close_sessions(&mut self) {
        let closing: Vec<_> = self
            .registry
            .drain()
            .map(|record| record.session.close())
            .collect();
        join_all(closing).await;
    }

    // ================================ CONTROLS ================================= //

    fn on_control(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::ListDevices { reply } => {
                let now = Utc::now();
                let mut devices: Vec<DeviceSnapshot> =
                    self.registry.records().map(|r| r.snapshot(now)).collect();
                devices.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
                let _ = reply.send(Ok(devices));
            }
            ControlRequest::Device { device, reply } => {
                let result = self
                    .registry
                    .get(&device)
                    .map(|record| record.snapshot(Utc::now()))
                    .ok_or_else(|| unknown_device(device));
                let _ = reply.send(result);
            }
            ControlRequest::Valve {
                device,
                relay,
                reply,
            } => {
                let result = self
                    .valve(device, relay)
                    .map(|valve| valve.snapshot_at(Utc::now()));
                let _ = reply.send(result);
            }
            ControlRequest::SetValveActive {
                device,
                relay,
                active,
                reply,
            } => {
                let _ = reply.send(self.set_valve_active(device, relay, active));
            }
            ControlRequest::SetValveDuration {
                device,
                relay,
                seconds,
                reply,
            } => {
                let _ = reply.send(self.set_valve_duration(device, relay, seconds));
            }
            ControlRequest::RenameValve {
                device,
                relay,
                name,
                reply,
            } => {
                let _ = reply.send(self.rename_valve(device, relay, name));
            }
            ControlRequest::RemainingDuration {
                device,
                relay,
                reply,
            } => {
                let result = self
                    .valve(device, relay)
                    .map(|valve| valve.remaining_duration_at(Utc::now()));
                let _ = reply.send(result);
            }
            ControlRequest::ProgramState {
                device,
                subtype,
                reply,
            } => {
                let result = self
                    .registry
                    .get(&device)
                    .ok_or_else(|| unknown_device(device))
                    .and_then(|record| {
                        record
                            .programs
                            .get(&subtype)
                            .map(ProgramScheduler::is_running)
                            .ok_or_else(|| {
                                BridgeError::NotFound(format!("program {} on device {}", subtype, device))
                            })
                    });
                let _ = reply.send(result);
            }
            ControlRequest::SetProgram {
                device,
                subtype,
                on,
                reply,
            } => {
                let _ = reply.send(self.set_program(device, &subtype, on));
            }
            ControlRequest::RefreshStatus { device, reply } => {
                let result = self
                    .registry
                    .get(&device)
                    .map(|record| record.session.send(OutboundCommand::get_status()))
                    .ok_or_else(|| unknown_device(device));
                let _ = reply.send(result);
            }
        }
    }

    fn valve(&self, device: DeviceId, relay: u8) -> Result<&ValveState, BridgeError> {
        self.registry
            .get(&device)
            .ok_or_else(|| unknown_device(device))?
            .valves
            .get(&relay)
            .ok_or_else(|| unknown_valve(device, relay))
    }

    fn set_valve_active(&mut self, device: DeviceId, relay: u8, active: bool) -> Result<(), BridgeError> {
        let record = self
            .registry
            .get_mut(&device)
            .ok_or_else(|| unknown_device(device))?;
        let valve = record
            .valves
            .get_mut(&relay)
            .ok_or_else(|| unknown_valve(device, relay))?;

        info!("[{}] Setting {} to {}", record.name, valve.configured_name, active);
        record.session.send(OutboundCommand::set_target(relay, active));
        valve.active = active;
        self.surface.update_valve(device, &valve.snapshot_at(Utc::now()));
        Ok(())
    }

    fn set_valve_duration(&mut self, device: DeviceId, relay: u8, seconds: u32) -> Result<(), BridgeError> {
        let record = self
            .registry
            .get_mut(&device)
            .ok_or_else(|| unknown_device(device))?;
        let valve = record
            .valves
            .get_mut(&relay)
            .ok_or_else(|| unknown_valve(device, relay))?;

        info!(
            "[{}] Setting {} duration to {}s",
            record.name, valve.configured_name, seconds
        );
        record
            .session
            .send(OutboundCommand::set_default_duration(relay, seconds));
        valve.set_duration = seconds;
        self.surface.update_valve(device, &valve.snapshot_at(Utc::now()));
        Ok(())
    }

    fn rename_valve(&mut self, device: DeviceId, relay: u8, name: String) -> Result<(), BridgeError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(BridgeError::ValidationError("valve name is empty".to_string()));
        }

        let record = self
            .registry
            .get_mut(&device)
            .ok_or_else(|| unknown_device(device))?;
        let valve = record
            .valves
            .get_mut(&relay)
            .ok_or_else(|| unknown_valve(device, relay))?;

        self.cache.rename(&record.name, relay, &name);
        valve.configured_name = name;
        self.surface.update_valve(device, &valve.snapshot_at(Utc::now()));
        self.persist_cache();
        Ok(())
    }

    // =============================== PERSISTENCE =============================== //

    fn persist_cache(&self) {
        let job = PersistJob::Customizations(self.cache.document().clone());
        if self.persist.send(job).is_err() {
            warn!("Persistence worker is gone, customization changes are not saved");
        }
    }

    fn persist_known(&self) {
        let job = PersistJob::KnownDevices(self.registry.known().clone());
        if self.persist.send(job).is_err() {
            warn!("Persistence worker is gone, known devices are not saved");
        }
    }
}

fn unknown_device(device: DeviceId) -> BridgeError {
    BridgeError::NotFound(format!("device {}", device))
}

fn unknown_valve(device: DeviceId, relay: u8) -> BridgeError {
    BridgeError::NotFound(format!("valve {} on device {}", relay, device))
}
