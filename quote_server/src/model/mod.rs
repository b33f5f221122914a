//! Domain models and utilities for the cache server.
//!
//! This module groups the state holders used by the cache, the poller and the schedulers:
//! - `clock`: injectable wall-clock source.
//! - `store`: the per-symbol `EntryStore` and its `CacheEntry` values.
//! - `watchset`: the swappable set of symbols the poller refreshes.
//! - `trading_window`: the trading-hours gate.

pub mod clock;
pub mod store;
pub mod trading_window;
pub mod watchset;
