// src/registry/mod.rs
mod target;

pub use target::{Registry, Target};
