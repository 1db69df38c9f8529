//! Request interception for an offline-capable web app.
//!
//! This crate provides the network layer, the three caching strategies, the
//! per-request engine and the worker lifecycle built on `shellcache-core`.

pub mod engine;
pub mod fetch;
pub mod lifecycle;
pub mod response;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use engine::Engine;
pub use fetch::{FetchClient, FetchConfig, FetchOptions, NAVIGATION_PRELOAD_HEADER, Network};
pub use lifecycle::{ActivationReport, ControlMessage, InstallReport, Worker, WorkerState};
pub use response::{Response, ResponseSource};
pub use strategy::{NavigationFallback, Outcome, StrategyContext};
