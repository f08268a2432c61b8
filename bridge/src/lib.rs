//! Irrigation Bridge Library
//!
//! Bridges networked irrigation controllers to a smart-home control surface.

pub mod app;
pub mod discovery;
pub mod engine;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod storage;
pub mod surface;
pub mod utils;
pub mod workers;
