// src/probe/mod.rs
mod chain;
mod error;
mod http;
mod strategy;

pub use chain::{parse_probe_url, ChainPolicy, StrategyChain};
pub use error::ProbeError;
pub use http::{build_client, create_strategies, FaviconStrategy, HttpGetStrategy, OpaqueHeadStrategy};
pub use strategy::{Attempt, FailureKind, Strategy};
