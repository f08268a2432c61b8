//! Application configuration options

use std::time::Duration;

use crate::engine::EngineOptions;
use crate::session::ws::LinkOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{ServerSettings, Settings, StaticController};
use crate::workers::discovery;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub storage: StorageLayout,

    /// Device engine options
    pub engine: EngineOptions,

    /// Controller link options
    pub link: LinkOptions,

    /// Discovery worker options
    pub discovery: discovery::Options,

    /// Controllers announced by the static feed
    pub controllers: Vec<StaticController>,

    /// Enable local HTTP server
    pub enable_socket_server: bool,

    /// Server configuration
    pub server: ServerSettings,
}

impl AppOptions {
    pub fn new(settings: &Settings, storage: StorageLayout) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage,
            engine: EngineOptions::from_settings(settings),
            link: LinkOptions::from_settings(&settings.session),
            discovery: discovery::Options::from_settings(&settings.discovery),
            controllers: settings.discovery.controllers.clone(),
            enable_socket_server: settings.server.enabled,
            server: settings.server.clone(),
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}
