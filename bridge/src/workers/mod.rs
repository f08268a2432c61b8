//! Background workers

pub mod discovery;
pub mod persist;
