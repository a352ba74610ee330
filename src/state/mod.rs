// src/state/mod.rs
mod outcome;
mod table;

pub use outcome::{CycleId, OutcomeUpdate, ProbeOutcome, ProbeStatus, StatusView, NO_METHOD};
pub use table::ResultTable;
