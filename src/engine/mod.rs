// src/engine/mod.rs
mod orchestrator;
mod scheduler;

pub use orchestrator::{CycleReport, CycleRun, ProbeEngine};
pub use scheduler::{Scheduler, Trigger};
