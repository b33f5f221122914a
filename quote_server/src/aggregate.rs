//! Single-slot cache for the composite market dataset.
//!
//! The slot holds an `Arc<AggregateSnapshot>`: a refresh builds the new snapshot outside the
//! lock and swaps the pointer in, and a reader clones the pointer out. Readers therefore
//! see the old snapshot or the new one, and never wait for a fetch. A failed refresh
//! leaves the previous snapshot in place.
//!
//! [`AggregateScheduler`] drives refreshes on its own timer, independent of the per-symbol
//! poller. Whether it honours the trading-hours gate is a deployment choice.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use quote_common::Result;
use quote_common::wire::AggregateRecord;

use crate::fetcher::QuoteFetcher;
use crate::model::clock::Clock;
use crate::model::trading_window::MarketGate;
use crate::task::PeriodicTask;

/// Default refresh period of the aggregate dataset.
pub const DEFAULT_AGGREGATE_INTERVAL: Duration = Duration::from_secs(60);

/// Composite dataset and the moment it was stored.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSnapshot {
    /// Opaque records as returned by the fetcher.
    pub records: Vec<AggregateRecord>,
    /// When the snapshot was stored.
    pub fetched_at: DateTime<Utc>,
}

/// The single aggregate slot.
pub struct AggregateCache {
    slot: Mutex<Option<Arc<AggregateSnapshot>>>,
    fetcher: Arc<dyn QuoteFetcher>,
    clock: Arc<dyn Clock>,
}

impl AggregateCache {
    /// Create an empty slot.
    pub fn new(fetcher: Arc<dyn QuoteFetcher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            slot: Mutex::new(None),
            fetcher,
            clock,
        }
    }

    /// Latest snapshot, if one was ever fetched.
    pub fn get_snapshot(&self) -> Option<Arc<AggregateSnapshot>> {
        self.slot.lock().clone()
    }

    /// Fetch the dataset and replace the slot.
    pub fn refresh(&self) -> Result<Arc<AggregateSnapshot>> {
        let records = self.fetcher.fetch_aggregate()?;
        let snapshot = Arc::new(AggregateSnapshot {
            records,
            fetched_at: self.clock.now(),
        });
        *self.slot.lock() = Some(Arc::clone(&snapshot));
        info!(
            "Aggregate snapshot updated ({} records)",
            snapshot.records.len()
        );
        Ok(snapshot)
    }
}

/// Timer driving [`AggregateCache::refresh`].
pub struct AggregateScheduler {
    cache: Arc<AggregateCache>,
    gate: Option<Arc<dyn MarketGate>>,
    clock: Arc<dyn Clock>,
    stop_timeout: Duration,
    task: Mutex<Option<PeriodicTask>>,
}

impl AggregateScheduler {
    /// Create a stopped scheduler; `gate = None` refreshes around the clock.
    pub fn new(
        cache: Arc<AggregateCache>,
        gate: Option<Arc<dyn MarketGate>>,
        clock: Arc<dyn Clock>,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            gate,
            clock,
            stop_timeout,
            task: Mutex::new(None),
        }
    }

    /// Start refreshing every `interval`; returns `false` if already running.
    pub fn start(&self, interval: Duration) -> Result<bool> {
        let mut task = self.task.lock();
        if task.is_some() {
            warn!("Aggregate scheduler already running; start ignored");
            return Ok(false);
        }

        let cache = Arc::clone(&self.cache);
        let gate = self.gate.clone();
        let clock = Arc::clone(&self.clock);
        *task = Some(PeriodicTask::spawn("aggregate-refresh", interval, move |_| {
            if let Some(gate) = &gate {
                if !gate.is_open(clock.now()) {
                    debug!("Market closed; skipping aggregate refresh");
                    return Ok(());
                }
            }
            cache.refresh().map(|_| ())
        })?);
        Ok(true)
    }

    /// Stop the timer; returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        match self.task.lock().take() {
            Some(running) => {
                if !running.stop(self.stop_timeout) {
                    warn!(
                        "Aggregate scheduler still inside a refresh after {:?}",
                        self.stop_timeout
                    );
                }
                info!("Aggregate scheduler stopped");
                true
            }
            None => false,
        }
    }

    /// Whether the timer is running.
    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }
}

impl Drop for AggregateScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::clock::{ManualClock, SystemClock};
    use crate::model::trading_window::TradingWindow;
    use crate::testing::ScriptedFetcher;
    use chrono::TimeZone;
    use serde_json::json;
    use std::thread;
    use std::time::Instant;

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn empty_until_first_refresh() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let cache = AggregateCache::new(fetcher, Arc::new(SystemClock));
        assert!(cache.get_snapshot().is_none());

        let snapshot = cache.refresh().unwrap();
        assert_eq!(cache.get_snapshot().unwrap(), snapshot);
        assert_eq!(snapshot.records[0]["item"], json!("up"));
    }

    #[test]
    fn failed_refresh_keeps_previous_snapshot() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let cache = AggregateCache::new(
            Arc::clone(&fetcher) as Arc<dyn QuoteFetcher>,
            Arc::new(SystemClock),
        );
        let first = cache.refresh().unwrap();

        fetcher.fail_aggregate(true);
        assert!(cache.refresh().is_err());
        assert_eq!(cache.get_snapshot().unwrap(), first);
    }

    #[test]
    fn reads_do_not_wait_for_a_slow_refresh() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let cache = Arc::new(AggregateCache::new(
            Arc::clone(&fetcher) as Arc<dyn QuoteFetcher>,
            Arc::new(SystemClock),
        ));
        let first = cache.refresh().unwrap();

        fetcher.set_delay(Duration::from_millis(500));
        let refresher = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.refresh())
        };
        assert!(wait_for(|| fetcher.calls_for("aggregate") == 2));

        let started = Instant::now();
        let during = cache.get_snapshot().unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(during, first);

        let second = refresher.join().unwrap().unwrap();
        assert_ne!(second, first);
        assert_eq!(cache.get_snapshot().unwrap(), second);
    }

    #[test]
    fn stop_waits_out_a_slow_refresh() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.set_delay(Duration::from_millis(300));
        let cache = Arc::new(AggregateCache::new(
            Arc::clone(&fetcher) as Arc<dyn QuoteFetcher>,
            Arc::new(SystemClock),
        ));
        let scheduler = AggregateScheduler::new(
            Arc::clone(&cache),
            None,
            Arc::new(SystemClock),
            Duration::from_millis(50),
        );

        scheduler.start(Duration::from_secs(1)).unwrap();
        assert!(wait_for(|| fetcher.calls_for("aggregate") == 1));
        assert!(scheduler.stop());
        assert!(!scheduler.is_running());
        assert!(wait_for(|| cache.get_snapshot().is_some()));
    }

    #[test]
    fn scheduler_fills_slot_and_stops() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let cache = Arc::new(AggregateCache::new(
            Arc::clone(&fetcher) as Arc<dyn QuoteFetcher>,
            Arc::new(SystemClock),
        ));
        let scheduler = AggregateScheduler::new(
            Arc::clone(&cache),
            None,
            Arc::new(SystemClock),
            Duration::from_secs(2),
        );

        assert!(scheduler.start(Duration::from_millis(20)).unwrap());
        assert!(!scheduler.start(Duration::from_millis(20)).unwrap());
        assert!(wait_for(|| fetcher.calls_for("aggregate") >= 2));
        assert!(scheduler.stop());
        assert!(!scheduler.is_running());

        let calls = fetcher.calls_for("aggregate");
        thread::sleep(Duration::from_millis(60));
        assert_eq!(fetcher.calls_for("aggregate"), calls);
        assert!(cache.get_snapshot().is_some());
    }

    #[test]
    fn gated_scheduler_waits_for_open_market() {
        // 04:00 UTC is the Shanghai lunch break.
        let lunch = Utc.with_ymd_and_hms(2025, 3, 4, 4, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(lunch));
        let fetcher = Arc::new(ScriptedFetcher::new());
        let cache = Arc::new(AggregateCache::new(
            Arc::clone(&fetcher) as Arc<dyn QuoteFetcher>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));
        let scheduler = AggregateScheduler::new(
            Arc::clone(&cache),
            Some(Arc::new(TradingWindow::china_a_shares())),
            Arc::clone(&clock) as Arc<dyn Clock>,
            Duration::from_secs(2),
        );

        scheduler.start(Duration::from_millis(10)).unwrap();
        thread::sleep(Duration::from_millis(60));
        assert!(cache.get_snapshot().is_none());

        clock.advance(chrono::TimeDelta::hours(1));
        assert!(wait_for(|| cache.get_snapshot().is_some()));
        scheduler.stop();
        assert_eq!(
            cache.get_snapshot().unwrap().fetched_at,
            lunch + chrono::TimeDelta::hours(1)
        );
    }
}
