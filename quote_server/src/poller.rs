//! Background poller keeping the watch set fresh.
//!
//! States are `Stopped` and `Running`. While running, every tick checks the market gate and,
//! if it is open, calls [`PriceCache::refresh_many`] with the watch set as it is at that
//! tick. The watch set can be swapped at any time without a restart.
//!
//! Control operations (`start`, `stop`) are serialized by a small control lock that is never
//! touched by cache readers. `stop` blocks until the loop thread has exited or the
//! configured timeout passes. A tick checks for a stop request before every symbol, so at
//! most the fetch already in progress completes after `stop` is called.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;
use quote_common::Result;

use crate::cache::PriceCache;
use crate::model::clock::Clock;
use crate::model::trading_window::MarketGate;
use crate::model::watchset::WatchSet;
use crate::task::{PeriodicTask, StopFlag};

/// Default time `stop` waits for the loop thread.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Market closed; nothing fetched.
    GateClosed,
    /// Watch set empty; nothing fetched.
    Idle,
    /// Symbols refreshed, with how many came back without fresh data.
    Refreshed {
        /// Number of symbols attempted.
        symbols: usize,
        /// Symbols served stale or without data.
        degraded: usize,
    },
}

/// Poller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// No loop thread.
    Stopped,
    /// Loop thread running.
    Running,
}

/// Periodic refresher of a [`WatchSet`].
pub struct Poller {
    cache: Arc<PriceCache>,
    gate: Arc<dyn MarketGate>,
    clock: Arc<dyn Clock>,
    watchset: Arc<WatchSet>,
    stop_timeout: Duration,
    task: Mutex<Option<PeriodicTask>>,
}

impl Poller {
    /// Create a stopped poller.
    pub fn new(
        cache: Arc<PriceCache>,
        gate: Arc<dyn MarketGate>,
        clock: Arc<dyn Clock>,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            gate,
            clock,
            watchset: Arc::new(WatchSet::default()),
            stop_timeout,
            task: Mutex::new(None),
        }
    }

    /// Record `symbols` as the watch set and start the loop.
    ///
    /// Returns `false` (and logs a warning) when the poller is already running; the running
    /// loop and its watch set are left untouched.
    pub fn start<S: AsRef<str>>(&self, symbols: &[S], interval: Duration) -> Result<bool> {
        let mut task = self.task.lock();
        if task.is_some() {
            warn!("Poller already running; start ignored");
            return Ok(false);
        }

        let watched = self.watchset.replace(symbols);
        let cache = Arc::clone(&self.cache);
        let gate = Arc::clone(&self.gate);
        let clock = Arc::clone(&self.clock);
        let watchset = Arc::clone(&self.watchset);

        *task = Some(PeriodicTask::spawn("quote-poller", interval, move |stop| {
            let outcome = poll_once(&cache, gate.as_ref(), clock.as_ref(), &watchset, stop);
            debug!("Poll tick: {:?}", outcome);
            Ok(())
        })?);
        info!(
            "Poller started with {} symbols every {:?}",
            watched.len(),
            interval
        );
        Ok(true)
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// Returns `false` when the poller was not running. Safe to call from any thread and
    /// any number of times.
    pub fn stop(&self) -> bool {
        let mut task = self.task.lock();
        match task.take() {
            Some(running) => {
                if !running.stop(self.stop_timeout) {
                    warn!("Poller loop still inside a refresh after {:?}", self.stop_timeout);
                }
                info!("Poller stopped");
                true
            }
            None => {
                debug!("Poller already stopped");
                false
            }
        }
    }

    /// Replace the watch set; the next tick uses it.
    pub fn update_watchset<S: AsRef<str>>(&self, symbols: &[S]) -> Arc<Vec<String>> {
        let next = self.watchset.replace(symbols);
        info!("Watch set updated: {:?}", next);
        next
    }

    /// Symbols the next tick will refresh.
    pub fn watchset(&self) -> Arc<Vec<String>> {
        self.watchset.current()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PollerState {
        if self.task.lock().is_some() {
            PollerState::Running
        } else {
            PollerState::Stopped
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One poll tick: gate check, then a refresh of the current watch set.
///
/// The refresh ends early, without starting another fetch, once `stop` is raised.
pub fn poll_once(
    cache: &PriceCache,
    gate: &dyn MarketGate,
    clock: &dyn Clock,
    watchset: &WatchSet,
    stop: &StopFlag,
) -> TickOutcome {
    if !gate.is_open(clock.now()) {
        debug!("Market closed; skipping poll");
        return TickOutcome::GateClosed;
    }

    let symbols = watchset.current();
    if symbols.is_empty() {
        return TickOutcome::Idle;
    }

    let results = cache.refresh_many_while(symbols.as_slice(), || !stop.is_raised());
    let degraded = results
        .values()
        .filter(|r| r.as_ref().map_or(true, |p| p.stale))
        .count();
    TickOutcome::Refreshed {
        symbols: results.len(),
        degraded,
    }
}
