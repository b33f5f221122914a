//! Quote cache server.
//!
//! Keeps a small set of frequently-read quotes fresh by polling an upstream source during
//! trading hours, serves cached values without blocking on the network, and falls back to
//! the last known value when a refresh fails. Building blocks, leaves first:
//!
//! - `model`: clock, entry store, watch set and trading-hours gate.
//! - `fetcher`: the blocking upstream trait and its East Money / simulated implementations.
//! - `cache`: cache-first reads, stale fallback and the single-flight refresh worker.
//! - `task`: cancellable periodic thread shared by the schedulers.
//! - `poller`: watch-set poller gated by trading hours.
//! - `aggregate`: single-slot market-breadth snapshot and its scheduler.
//! - `service`: facade wiring everything from a `ServiceConfig`.
//! - `auth`, `http`: token checks and the axum JSON boundary.
//! - `config`, `args`: TOML configuration and CLI overrides.
#![warn(missing_docs)]
pub mod aggregate;
pub mod args;
pub mod auth;
pub mod cache;
pub mod config;
pub mod fetcher;
pub mod http;
pub mod model;
pub mod poller;
pub mod service;
pub mod task;

#[cfg(test)]
mod testing;

pub use cache::{CachedPrice, PriceCache, PriceResult};
pub use config::ServiceConfig;
pub use service::MarketDataService;
