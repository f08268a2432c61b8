//! Error types for the irrigation bridge

use thiserror::Error;

/// Main error type for the irrigation bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Discovery error: {0}")]
    DiscoveryError(String),

    #[error("Unable to resolve {host}: {reason}")]
    ResolveError { host: String, reason: String },

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("Engine error: {0}")]
    EngineError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Read-only control: {0}")]
    ReadOnly(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}
