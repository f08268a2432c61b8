//! WebSocket links against a local controller

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use irrigation_bridge::discovery::Sighting;
use irrigation_bridge::engine::{Engine, EngineHandle, EngineOptions};
use irrigation_bridge::models::identity::serial_from_mac;
use irrigation_bridge::models::{DeviceId, ProgramDefinition};
use irrigation_bridge::session::ws::{LinkOptions, WsConnector};
use irrigation_bridge::storage::cache::{CacheDocument, CustomizationCache};
use irrigation_bridge::storage::known::KnownDocument;
use irrigation_bridge::surface::MemorySurface;
use irrigation_bridge::utils::CooldownOptions;
use irrigation_bridge::workers::persist::PersistReceiver;

const MAC: &str = "24:0a:c4:00:00:07";
const WAIT: Duration = Duration::from_secs(5);

/// A controller accepting a single connection
struct Controller {
    address: SocketAddr,
    received: mpsc::UnboundedReceiver<String>,
    frames: mpsc::UnboundedSender<String>,
}

impl Controller {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (frames, mut outgoing) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let socket = accept_async(stream).await.unwrap();
            let (mut sink, mut source) = socket.split();
            loop {
                tokio::select! {
                    Some(text) = outgoing.recv() => {
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    message = source.next() => match message {
                        Some(Ok(Message::Text(text))) => {
                            let _ = received_tx.send(text.to_string());
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                }
            }
        });

        Self {
            address,
            received,
            frames,
        }
    }

    async fn next_command(&mut self) -> Value {
        let text = timeout(WAIT, self.received.recv())
            .await
            .expect("no command from the bridge")
            .expect("controller connection ended");
        serde_json::from_str(&text).unwrap()
    }

    fn push(&self, text: &str) {
        self.frames.send(text.to_string()).unwrap();
    }
}

struct Bridge {
    engine: EngineHandle,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
    _persisted: PersistReceiver,
}

impl Bridge {
    fn start(programs: &[(&str, &str)]) -> Self {
        let (persist, persisted) = mpsc::unbounded_channel();
        let options = EngineOptions {
            active_solenoids: 2,
            programs: programs
                .iter()
                .map(|(name, solenoids)| ProgramDefinition::new(name, solenoids, 2))
                .collect(),
            eviction_grace: Duration::from_secs(72 * 3600),
        };
        let connector = WsConnector::new(LinkOptions {
            handshake_timeout: Duration::from_secs(2),
            cooldown: CooldownOptions {
                base_delay: Duration::from_millis(50),
                max_delay: Duration::from_millis(200),
                multiplier: 2.0,
            },
        });

        let engine = Engine::new(
            options,
            CustomizationCache::from_document(CacheDocument::new()),
            KnownDocument::new(),
            MemorySurface::new(),
            Arc::new(connector),
            persist,
        );
        let handle = engine.handle();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(engine.run(Box::pin(async move {
            let _ = stopped.await;
        })));

        Self {
            engine: handle,
            stop,
            task,
            _persisted: persisted,
        }
    }

    fn sight(&self, address: SocketAddr) -> DeviceId {
        let id = DeviceId::from_hardware_token(MAC);
        self.engine
            .report_sighting(Sighting {
                id,
                name: "back-yard".to_string(),
                serial: serial_from_mac(MAC),
                ip: address.ip(),
                port: address.port(),
            })
            .unwrap();
        id
    }

    async fn shutdown(self) {
        self.stop.send(()).unwrap();
        timeout(WAIT, self.task)
            .await
            .expect("engine did not stop")
            .unwrap();
    }
}

#[tokio::test]
async fn test_shutdown_switches_off_running_valve() {
    let mut controller = Controller::start().await;
    let bridge = Bridge::start(&[("Front Lawn", "1,2")]);
    let id = bridge.sight(controller.address);

    assert_eq!(controller.next_command().await, json!({"mode": "get"}));

    assert!(bridge
        .engine
        .set_program(id, "program-front_lawn", true)
        .await
        .unwrap());
    assert_eq!(
        controller.next_command().await,
        json!({"mode": "set", "relay": 1, "targetState": 1})
    );

    bridge.shutdown().await;
    assert_eq!(
        controller.next_command().await,
        json!({"mode": "set", "relay": 1, "targetState": 0})
    );
}

#[tokio::test]
async fn test_bad_frames_do_not_end_the_session() {
    let mut controller = Controller::start().await;
    let bridge = Bridge::start(&[]);
    let id = bridge.sight(controller.address);
    assert_eq!(controller.next_command().await, json!({"mode": "get"}));

    controller.push("not json");
    controller.push(r#"{"type":"heartbeat"}"#);
    controller.push(r#"{"type":"relay-status","relay":"x"}"#);
    controller.push(r#"{"type":"master-status","status":1}"#);

    let device = timeout(WAIT, async {
        loop {
            let device = bridge.engine.device(id).await.unwrap();
            if device.master.active {
                return device;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("status frame never applied");
    assert!(device.connected);

    // still the first connection; the controller accepts no other
    bridge.engine.set_valve_active(id, 2, true).await.unwrap();
    assert_eq!(
        controller.next_command().await,
        json!({"mode": "set", "relay": 2, "targetState": 1})
    );

    bridge.shutdown().await;
}
