// src/lib.rs
pub mod config;
pub mod engine;
pub mod metrics;
pub mod probe;
pub mod registry;
pub mod server;
pub mod state;
