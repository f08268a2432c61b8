//! Persistent storage

pub mod cache;
pub mod known;
pub mod layout;
pub mod settings;
