//! Shared engine harness for integration tests

#![allow(dead_code)]

use std::future::pending;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use controller_proto::{InboundFrame, OutboundCommand};
use tokio::sync::mpsc;
use tokio::time::Instant;

use irrigation_bridge::discovery::Sighting;
use irrigation_bridge::engine::events::{EngineEvent, EngineSender};
use irrigation_bridge::engine::{Engine, EngineHandle, EngineOptions};
use irrigation_bridge::errors::BridgeError;
use irrigation_bridge::models::identity::serial_from_mac;
use irrigation_bridge::models::{DeviceId, ProgramDefinition};
use irrigation_bridge::session::{ConnectionStatus, Connector, Link, LinkTarget};
use irrigation_bridge::storage::cache::{CacheDocument, CustomizationCache};
use irrigation_bridge::storage::known::KnownDocument;
use irrigation_bridge::surface::MemorySurface;
use irrigation_bridge::workers::persist::{PersistJob, PersistReceiver};

#[derive(Default)]
pub struct LinkLog {
    pub opened: Vec<LinkTarget>,
    pub sent: Vec<(DeviceId, OutboundCommand, Instant)>,
    pub events: Option<EngineSender>,
}

pub type Links = Arc<Mutex<LinkLog>>;

struct RecordingLink {
    device: DeviceId,
    log: Links,
}

impl Link for RecordingLink {
    fn send(&self, command: OutboundCommand) -> Result<(), BridgeError> {
        self.log
            .lock()
            .unwrap()
            .sent
            .push((self.device, command, Instant::now()));
        Ok(())
    }
}

struct RecordingConnector(Links);

impl Connector for RecordingConnector {
    fn open(&self, target: LinkTarget, events: EngineSender) -> Box<dyn Link> {
        let mut log = self.0.lock().unwrap();
        log.opened.push(target.clone());
        log.events = Some(events);
        Box::new(RecordingLink {
            device: target.device,
            log: self.0.clone(),
        })
    }
}

pub struct Harness {
    pub engine: EngineHandle,
    pub surface: MemorySurface,
    pub links: Links,
    persisted: PersistReceiver,
}

impl Harness {
    pub fn start(
        active_solenoids: u8,
        programs: &[(&str, &str)],
        cache: CacheDocument,
        known: KnownDocument,
    ) -> Self {
        let links: Links = Arc::default();
        let surface = MemorySurface::new();
        let (persist, persisted) = mpsc::unbounded_channel();
        let options = EngineOptions {
            active_solenoids,
            programs: programs
                .iter()
                .map(|(name, solenoids)| ProgramDefinition::new(name, solenoids, active_solenoids))
                .collect(),
            eviction_grace: Duration::from_secs(72 * 3600),
        };

        let engine = Engine::new(
            options,
            CustomizationCache::from_document(cache),
            known,
            surface.clone(),
            Arc::new(RecordingConnector(links.clone())),
            persist,
        );
        let handle = engine.handle();
        tokio::spawn(engine.run(Box::pin(pending())));

        Self {
            engine: handle,
            surface,
            links,
            persisted,
        }
    }

    /// Report a controller sighting and wait until the engine processed it
    pub async fn sight(&self, name: &str, mac: &str, ip: &str) -> DeviceId {
        let id = DeviceId::from_hardware_token(mac);
        self.engine
            .report_sighting(Sighting {
                id,
                name: name.to_string(),
                serial: serial_from_mac(mac),
                ip: ip.parse().unwrap(),
                port: 81,
            })
            .unwrap();
        let _ = self.engine.devices().await.unwrap();
        id
    }

    /// Generation of the newest link opened for a device
    pub fn current_link(&self, device: DeviceId) -> u64 {
        self.links
            .lock()
            .unwrap()
            .opened
            .iter()
            .rev()
            .find(|target| target.device == device)
            .map(|target| target.generation)
            .unwrap()
    }

    /// Push a frame as if it arrived on the device's current link
    pub async fn push_frame(&self, device: DeviceId, json: &str) {
        let link = self.current_link(device);
        self.push(EngineEvent::Frame {
            device,
            link,
            frame: InboundFrame::from_json(json).unwrap(),
        })
        .await;
    }

    pub async fn push_status(&self, device: DeviceId, status: ConnectionStatus) {
        let link = self.current_link(device);
        self.push_link_status(device, link, status).await;
    }

    /// Push a status change as reported by a specific link
    pub async fn push_link_status(&self, device: DeviceId, link: u64, status: ConnectionStatus) {
        self.push(EngineEvent::Connection {
            device,
            link,
            status,
        })
        .await;
    }

    async fn push(&self, event: EngineEvent) {
        let events = self.links.lock().unwrap().events.clone().unwrap();
        events.send(event).unwrap();
        let _ = self.engine.devices().await.unwrap();
    }

    /// Valve switch commands sent so far, with their send time
    pub fn activations(&self) -> Vec<(u8, bool, Instant)> {
        self.links
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter_map(|(_, command, at)| match command {
                OutboundCommand::Set(set) => set
                    .target_state
                    .map(|state| (set.relay, state == 1, *at)),
                OutboundCommand::Get => None,
            })
            .collect()
    }

    /// Newest persisted documents since the last call
    pub fn drain_persisted(&mut self) -> (Option<CacheDocument>, Option<KnownDocument>) {
        let mut cache = None;
        let mut known = None;
        while let Ok(job) = self.persisted.try_recv() {
            match job {
                PersistJob::Customizations(doc) => cache = Some(doc),
                PersistJob::KnownDevices(doc) => known = Some(doc),
            }
        }
        (cache, known)
    }
}
