//! WebSocket link to a controller

use std::time::Duration;

use controller_proto::{InboundFrame, OutboundCommand};
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use http::header::{HeaderValue, USER_AGENT};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::engine::events::{EngineEvent, EngineSender};
use crate::errors::BridgeError;
use crate::session::{ConnectionStatus, Connector, Link, LinkTarget};
use crate::storage::settings::SessionSettings;
use crate::utils::{calc_exp_backoff, CooldownOptions};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CLIENT_NAME: &str = "irrigation-bridge";

/// Upper bound on flushing queued commands when a link is closed
const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Link options
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// Upper bound on the opening handshake
    pub handshake_timeout: Duration,

    /// Reconnect backoff
    pub cooldown: CooldownOptions,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self::from_settings(&SessionSettings::default())
    }
}

impl LinkOptions {
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self {
            handshake_timeout: Duration::from_millis(settings.handshake_timeout_ms),
            cooldown: CooldownOptions {
                base_delay: Duration::from_millis(settings.reconnect_base_delay_ms),
                max_delay: Duration::from_millis(settings.reconnect_max_delay_ms),
                multiplier: 2.0,
            },
        }
    }
}

/// Opens [`WsLink`]s
pub struct WsConnector {
    options: LinkOptions,
}

impl WsConnector {
    pub fn new(options: LinkOptions) -> Self {
        Self { options }
    }
}

impl Connector for WsConnector {
    fn open(&self, target: LinkTarget, events: EngineSender) -> Box<dyn Link> {
        let (commands, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(self.options.clone(), target, receiver, events));
        Box::new(WsLink { commands, task })
    }
}

/// A reconnecting WebSocket link
///
/// Dropping the link stops its task once the commands already queued have
/// been written; [`Link::close`] additionally waits for that to happen.
pub struct WsLink {
    commands: mpsc::UnboundedSender<OutboundCommand>,
    task: JoinHandle<()>,
}

impl Link for WsLink {
    fn send(&self, command: OutboundCommand) -> Result<(), BridgeError> {
        self.commands
            .send(command)
            .map_err(|_| BridgeError::SessionError("link closed".to_string()))
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        let WsLink { commands, mut task } = *self;
        drop(commands);
        Box::pin(async move {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
                warn!("Link did not close within {:?}, aborting", CLOSE_TIMEOUT);
                task.abort();
            }
        })
    }
}

/// Connection loop for one controller
async fn run(
    options: LinkOptions,
    target: LinkTarget,
    mut commands: mpsc::UnboundedReceiver<OutboundCommand>,
    events: EngineSender,
) {
    let url = match build_link_url(&target) {
        Ok(url) => url,
        Err(e) => {
            warn!("[{}] {}", target.name, e);
            return;
        }
    };

    let mut attempt: u32 = 0;
    loop {
        report(&events, &target, ConnectionStatus::Connecting { attempt });
        debug!("[{}] Connecting to {}", target.name, url);

        let reason = match connect(&url, options.handshake_timeout).await {
            Ok(stream) => {
                attempt = 0;
                info!("[{}] Connected to {}", target.name, target.address);
                report(&events, &target, ConnectionStatus::Connected);
                match pump(stream, &target, &mut commands, &events).await {
                    Some(reason) => reason,
                    None => return,
                }
            }
            Err(e) => e.to_string(),
        };
        report(
            &events,
            &target,
            ConnectionStatus::Disconnected {
                reason: reason.clone(),
            },
        );

        let delay = calc_exp_backoff(&options.cooldown, attempt);
        attempt = attempt.saturating_add(1);
        warn!(
            "[{}] Link down ({}). Retrying in {:?}...",
            target.name, reason, delay
        );

        // Commands issued while disconnected are dropped
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                command = commands.recv() => match command {
                    Some(command) => {
                        debug!("[{}] Dropping {:?} while disconnected", target.name, command);
                    }
                    None => return,
                },
            }
        }
    }
}

fn build_link_url(target: &LinkTarget) -> Result<Url, BridgeError> {
    Url::parse(&format!("ws://{}/", target.address))
        .map_err(|e| BridgeError::SessionError(format!("invalid link address: {}", e)))
}

async fn connect(url: &Url, handshake_timeout: Duration) -> Result<WsStream, BridgeError> {
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| BridgeError::SessionError(e.to_string()))?;
    request
        .headers_mut()
        .insert(USER_AGENT, HeaderValue::from_static(CLIENT_NAME));

    match tokio::time::timeout(handshake_timeout, connect_async(request)).await {
        Ok(Ok((stream, _))) => Ok(stream),
        Ok(Err(e)) => Err(BridgeError::SessionError(e.to_string())),
        Err(_) => Err(BridgeError::SessionError(format!(
            "handshake timed out after {:?}",
            handshake_timeout
        ))),
    }
}

/// Pump frames until the connection drops
///
/// Returns the disconnect reason, or `None` once the link itself was closed.
async fn pump(
    stream: WsStream,
    target: &LinkTarget,
    commands: &mut mpsc::UnboundedReceiver<OutboundCommand>,
    events: &EngineSender,
) -> Option<String> {
    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    let _ = sink.close().await;
                    return None;
                };
                let text = match command.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("[{}] Unable to encode {:?}: {}", target.name, command, e);
                        continue;
                    }
                };
                debug!("[{}] Sending {}", target.name, text);
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    return Some(e.to_string());
                }
            }
            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => handle_text(text.as_str(), target, events),
                Some(Ok(Message::Close(_))) | None => {
                    return Some("closed by controller".to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Some(e.to_string()),
            },
        }
    }
}

fn handle_text(text: &str, target: &LinkTarget, events: &EngineSender) {
    match InboundFrame::from_json(text) {
        Ok(frame) => {
            let _ = events.send(EngineEvent::Frame {
                device: target.device,
                link: target.generation,
                frame,
            });
        }
        Err(e) => debug!("[{}] Ignoring frame {}: {}", target.name, text, e),
    }
}

fn report(events: &EngineSender, target: &LinkTarget, status: ConnectionStatus) {
    let _ = events.send(EngineEvent::Connection {
        device: target.device,
        link: target.generation,
        status,
    });
}
