//! Server state

use crate::engine::EngineHandle;
use crate::surface::MemorySurface;

/// Server state shared across handlers
pub struct ServerState {
    pub engine: EngineHandle,
    pub surface: MemorySurface,
}

impl ServerState {
    pub fn new(engine: EngineHandle, surface: MemorySurface) -> Self {
        Self { engine, surface }
    }
}
