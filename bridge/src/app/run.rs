//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::discovery::{StaticFeed, SystemResolver};
use crate::engine::{Engine, EngineHandle};
use crate::errors::BridgeError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::session::ws::WsConnector;
use crate::storage::cache::CustomizationCache;
use crate::storage::known::load_known_devices;
use crate::surface::MemorySurface;
use crate::workers::{discovery, persist};

/// Run the irrigation bridge
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), BridgeError> {
    info!("Initializing irrigation bridge...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start bridge: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), BridgeError> {
    let persist_tx = init_persist_worker(options, shutdown_manager)?;

    let surface = MemorySurface::new();
    let engine = init_engine(
        options,
        surface.clone(),
        persist_tx,
        shutdown_manager,
        shutdown_tx.subscribe(),
    )
    .await?;

    init_discovery_worker(
        options,
        engine.clone(),
        shutdown_manager,
        shutdown_tx.subscribe(),
    )?;

    if options.enable_socket_server {
        init_socket_server(
            options,
            engine,
            surface,
            shutdown_manager,
            shutdown_tx.subscribe(),
        )
        .await?;
    }

    Ok(())
}

fn init_persist_worker(
    options: &AppOptions,
    shutdown_manager: &mut ShutdownManager,
) -> Result<persist::PersistSender, BridgeError> {
    info!("Initializing persistence worker...");

    let (persist_tx, persist_rx) = mpsc::unbounded_channel();
    let persist_options = persist::Options {
        cache_file: options.storage.cache_file(),
        known_devices_file: options.storage.known_devices_file(),
    };
    let persist_handle = tokio::spawn(async move {
        persist::run(&persist_options, persist_rx).await;
    });

    shutdown_manager.with_persist_worker_handle(persist_handle)?;
    Ok(persist_tx)
}

async fn init_engine(
    options: &AppOptions,
    surface: MemorySurface,
    persist_tx: persist::PersistSender,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<EngineHandle, BridgeError> {
    info!("Initializing device engine...");

    let cache = CustomizationCache::load(&options.storage.cache_file()).await;
    let known = load_known_devices(&options.storage.known_devices_file()).await;
    info!("Restored {} known devices", known.len());

    let engine = Engine::new(
        options.engine.clone(),
        cache,
        known,
        surface,
        Arc::new(WsConnector::new(options.link.clone())),
        persist_tx,
    );
    let handle = engine.handle();

    let engine_handle = tokio::spawn(engine.run(Box::pin(async move {
        let _ = shutdown_rx.recv().await;
    })));

    shutdown_manager.with_engine_handle(engine_handle)?;
    Ok(handle)
}

fn init_discovery_worker(
    options: &AppOptions,
    engine: EngineHandle,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), BridgeError> {
    info!("Initializing discovery worker...");

    let worker_options = options.discovery.clone();
    let mut feed = StaticFeed::from_controllers(&options.controllers);

    let discovery_handle = tokio::spawn(async move {
        discovery::run(
            &worker_options,
            &mut feed,
            &SystemResolver,
            &engine,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_discovery_worker_handle(discovery_handle)?;
    Ok(())
}

async fn init_socket_server(
    options: &AppOptions,
    engine: EngineHandle,
    surface: MemorySurface,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), BridgeError> {
    info!("Initializing local HTTP server...");

    let server_state = ServerState::new(engine, surface);

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_socket_server_handle(server_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    socket_server_handle: Option<JoinHandle<Result<(), BridgeError>>>,
    discovery_worker_handle: Option<JoinHandle<()>>,
    engine_handle: Option<JoinHandle<()>>,
    persist_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            socket_server_handle: None,
            discovery_worker_handle: None,
            engine_handle: None,
            persist_worker_handle: None,
        }
    }

    pub fn with_discovery_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), BridgeError> {
        if self.discovery_worker_handle.is_some() {
            return Err(BridgeError::ShutdownError("discovery_handle already set".to_string()));
        }
        self.discovery_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_engine_handle(&mut self, handle: JoinHandle<()>) -> Result<(), BridgeError> {
        if self.engine_handle.is_some() {
            return Err(BridgeError::ShutdownError("engine_handle already set".to_string()));
        }
        self.engine_handle = Some(handle);
        Ok(())
    }

    pub fn with_persist_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), BridgeError> {
        if self.persist_worker_handle.is_some() {
            return Err(BridgeError::ShutdownError("persist_handle already set".to_string()));
        }
        self.persist_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_socket_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), BridgeError>>,
    ) -> Result<(), BridgeError> {
        if self.socket_server_handle.is_some() {
            return Err(BridgeError::ShutdownError("server_handle already set".to_string()));
        }
        self.socket_server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), BridgeError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), BridgeError> {
        info!("Shutting down irrigation bridge...");

        // 1. Discovery worker
        if let Some(handle) = self.discovery_worker_handle.take() {
            handle.await.map_err(|e| BridgeError::ShutdownError(e.to_string()))?;
        }

        // 2. Socket server
        if let Some(handle) = self.socket_server_handle.take() {
            handle.await.map_err(|e| BridgeError::ShutdownError(e.to_string()))??;
        }

        // 3. Engine, stops running programs
        if let Some(handle) = self.engine_handle.take() {
            handle.await.map_err(|e| BridgeError::ShutdownError(e.to_string()))?;
        }

        // 4. Persistence worker, drains once the engine is gone
        if let Some(handle) = self.persist_worker_handle.take() {
            handle.await.map_err(|e| BridgeError::ShutdownError(e.to_string()))?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
