//! Market-data service facade.
//!
//! `MarketDataService` owns one price cache, one watch-set poller and one aggregate
//! scheduler, built from a [`ServiceConfig`]. It exposes:
//!
//! - the Read API: `get_price`, `refresh_many`, `get_snapshot`, plus wire-shaped views of
//!   the cache (`quotes`, `screen`, `market_activity`) that never touch the network;
//! - the Control API: `start_polling`, `stop_polling`, `update_watchset`;
//! - `start` / `shutdown` for the whole set of background threads.
//!
//! Nothing here is global: a process may run several services side by side.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};
use quote_common::screen::QuoteFilter;
use quote_common::symbols::normalize_symbol;
use quote_common::wire::{
    CachedQuote, DataStatus, MarketActivityResponse, NO_DATA_MESSAGE, QuotesResponse,
};
use quote_common::{QuoteError, Result};

use crate::aggregate::{AggregateCache, AggregateScheduler, AggregateSnapshot};
use crate::cache::{PriceCache, PriceResult};
use crate::config::ServiceConfig;
use crate::fetcher::QuoteFetcher;
use crate::model::clock::Clock;
use crate::model::store::CacheEntry;
use crate::model::trading_window::{AlwaysOpen, MarketGate};
use crate::poller::{Poller, PollerState};

/// Cache, poller and aggregate scheduler wired together.
pub struct MarketDataService {
    cache: Arc<PriceCache>,
    poller: Poller,
    aggregate: Arc<AggregateCache>,
    scheduler: AggregateScheduler,
    settings: ServiceConfig,
}

impl MarketDataService {
    /// Build a stopped service; call [`start`](Self::start) or the Control API to run it.
    pub fn new(
        config: &ServiceConfig,
        fetcher: Arc<dyn QuoteFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let window = Arc::new(config.trading_window()?);

        let poll_gate: Arc<dyn MarketGate> = if config.trading_window.enabled {
            window.clone()
        } else {
            Arc::new(AlwaysOpen)
        };
        let aggregate_gate: Option<Arc<dyn MarketGate>> = if config.aggregate.gated {
            Some(window)
        } else {
            None
        };

        let cache = Arc::new(PriceCache::new(
            Arc::clone(&fetcher),
            Arc::clone(&clock),
            config.cache_settings(),
        )?);
        let poller = Poller::new(
            Arc::clone(&cache),
            poll_gate,
            Arc::clone(&clock),
            config.stop_timeout(),
        );
        let aggregate = Arc::new(AggregateCache::new(fetcher, Arc::clone(&clock)));
        let scheduler = AggregateScheduler::new(
            Arc::clone(&aggregate),
            aggregate_gate,
            clock,
            config.stop_timeout(),
        );

        Ok(Self {
            cache,
            poller,
            aggregate,
            scheduler,
            settings: config.clone(),
        })
    }

    /// Start the configured background work: the poller (when `autostart` is set) with the
    /// configured watchlist, and the aggregate scheduler (when enabled).
    pub fn start(&self) -> Result<()> {
        if self.settings.poller.autostart {
            self.poller
                .start(self.settings.poller.watchlist.as_slice(), self.settings.poll_interval())?;
        }
        if self.settings.aggregate.enabled {
            self.scheduler.start(self.settings.aggregate_interval())?;
        }
        Ok(())
    }

    /// Stop every background loop. Idempotent.
    pub fn shutdown(&self) {
        let poller = self.poller.stop();
        let aggregate = self.scheduler.stop();
        info!(
            "Service shut down (poller was running: {}, aggregate was running: {})",
            poller, aggregate
        );
    }

    // ----- Read API -----

    /// Cache-first price read; see [`PriceCache::get_price`].
    pub fn get_price(&self, symbol: &str, force_refresh: bool) -> PriceResult {
        self.cache.get_price(symbol, force_refresh)
    }

    /// Synchronous refresh of several symbols, each independently.
    pub fn refresh_many<S: AsRef<str>>(&self, symbols: &[S]) -> BTreeMap<String, PriceResult> {
        self.cache.refresh_many(symbols)
    }

    /// Latest aggregate snapshot, without waiting for an in-flight refresh.
    pub fn get_snapshot(&self) -> Option<Arc<AggregateSnapshot>> {
        self.aggregate.get_snapshot()
    }

    /// Refresh the aggregate snapshot now.
    pub fn refresh_aggregate(&self) -> Result<Arc<AggregateSnapshot>> {
        self.aggregate.refresh()
    }

    /// Cached quotes, optionally restricted to `symbols`.
    ///
    /// Requested symbols without a cached entry (or that cannot be normalized) are listed in
    /// `missing`. No fetch is made.
    pub fn quotes(&self, symbols: Option<&[String]>) -> QuotesResponse {
        let snapshot = self.cache.snapshot();
        let now = self.cache.now();

        let mut data = BTreeMap::new();
        let mut missing = Vec::new();
        match symbols {
            Some(requested) => {
                for raw in requested {
                    match normalize_symbol(raw) {
                        Ok(code) => match snapshot.get(&code) {
                            Some(entry) => {
                                data.insert(code, self.to_wire(entry, now));
                            }
                            None => push_unique(&mut missing, code),
                        },
                        Err(_) => push_unique(&mut missing, raw.trim().to_string()),
                    }
                }
            }
            None => {
                for (code, entry) in &snapshot {
                    data.insert(code.clone(), self.to_wire(entry, now));
                }
            }
        }
        quotes_response(data, missing)
    }

    /// Cached quotes passing `filter`. No fetch is made.
    pub fn screen(&self, filter: &QuoteFilter) -> QuotesResponse {
        let now = self.cache.now();
        let data = self
            .cache
            .snapshot()
            .into_iter()
            .filter(|(_, entry)| filter.matches(&entry.quote))
            .map(|(code, entry)| {
                let wire = self.to_wire(&entry, now);
                (code, wire)
            })
            .collect();
        quotes_response(data, Vec::new())
    }

    /// Aggregate snapshot in wire form, or the "no data yet" body.
    pub fn market_activity(&self) -> MarketActivityResponse {
        match self.get_snapshot() {
            Some(snapshot) => MarketActivityResponse {
                status: DataStatus::Ok,
                timestamp: Some(snapshot.fetched_at),
                data: Some(snapshot.records.clone()),
                message: None,
            },
            None => MarketActivityResponse {
                status: DataStatus::NoData,
                timestamp: None,
                data: None,
                message: Some(NO_DATA_MESSAGE.to_string()),
            },
        }
    }

    // ----- Control API -----

    /// Start the poller with `symbols` every `interval_secs`; `false` if already running.
    pub fn start_polling<S: AsRef<str>>(&self, symbols: &[S], interval_secs: u64) -> Result<bool> {
        if interval_secs == 0 {
            return Err(QuoteError::Config("poll interval must be > 0".into()));
        }
        self.poller.start(symbols, Duration::from_secs(interval_secs))
    }

    /// Stop the poller; `false` if it was not running.
    pub fn stop_polling(&self) -> bool {
        self.poller.stop()
    }

    /// Replace the watch set; the running poller picks it up on its next tick.
    pub fn update_watchset<S: AsRef<str>>(&self, symbols: &[S]) -> Arc<Vec<String>> {
        let next = self.poller.update_watchset(symbols);
        if next.is_empty() && symbols.iter().any(|s| !s.as_ref().trim().is_empty()) {
            warn!("Watch set update kept no valid symbols");
        }
        next
    }

    /// Symbols the poller refreshes.
    pub fn watchset(&self) -> Arc<Vec<String>> {
        self.poller.watchset()
    }

    /// Poller lifecycle state.
    pub fn polling_state(&self) -> PollerState {
        self.poller.state()
    }

    /// Whether the aggregate scheduler is running.
    pub fn aggregate_running(&self) -> bool {
        self.scheduler.is_running()
    }

    fn to_wire(&self, entry: &CacheEntry, now: DateTime<Utc>) -> CachedQuote {
        CachedQuote {
            quote: entry.quote.clone(),
            fetched_at: entry.fetched_at,
            age_ms: entry.age(now).num_milliseconds(),
            stale: !self.cache.is_fresh(entry, now),
        }
    }
}

impl Drop for MarketDataService {
    fn drop(&mut self) {
        self.poller.stop();
        self.scheduler.stop();
    }
}

/// Append `code` unless already listed, keeping first-seen order.
fn push_unique(missing: &mut Vec<String>, code: String) {
    if !missing.contains(&code) {
        missing.push(code);
    }
}

fn quotes_response(data: BTreeMap<String, CachedQuote>, missing: Vec<String>) -> QuotesResponse {
    if data.is_empty() {
        return QuotesResponse {
            status: DataStatus::NoData,
            timestamp: None,
            data,
            missing,
            message: Some(NO_DATA_MESSAGE.to_string()),
        };
    }
    let timestamp = data.values().map(|q| q.fetched_at).max();
    QuotesResponse {
        status: DataStatus::Ok,
        timestamp,
        data,
        missing,
        message: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::clock::ManualClock;
    use crate::testing::ScriptedFetcher;
    use chrono::{TimeDelta, TimeZone};

    fn service(fetcher: &Arc<ScriptedFetcher>, clock: &Arc<ManualClock>) -> MarketDataService {
        let mut config = ServiceConfig::default();
        config.trading_window.enabled = false;
        MarketDataService::new(
            &config,
            Arc::clone(fetcher) as Arc<dyn QuoteFetcher>,
            Arc::clone(clock) as Arc<dyn Clock>,
        )
        .unwrap()
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 4, 2, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn empty_cache_reports_no_data() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let svc = service(&fetcher, &clock());

        let quotes = svc.quotes(None);
        assert_eq!(quotes.status, DataStatus::NoData);
        assert_eq!(quotes.message.as_deref(), Some(NO_DATA_MESSAGE));

        let activity = svc.market_activity();
        assert_eq!(activity.status, DataStatus::NoData);
        assert_eq!(fetcher.call_count(), 0);
    }

    #[test]
    fn quotes_view_marks_missing_and_stale() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let clock = clock();
        let svc = service(&fetcher, &clock);

        svc.refresh_many(&["600519"]);
        clock.advance(TimeDelta::seconds(20));
        svc.refresh_many(&["000001"]);

        let requested = vec!["sh600519".to_string(), "000001".to_string(), "300750".to_string()];
        let quotes = svc.quotes(Some(&requested));
        assert_eq!(quotes.status, DataStatus::Ok);
        assert!(quotes.data["600519"].stale);
        assert_eq!(quotes.data["600519"].age_ms, 20_000);
        assert!(!quotes.data["000001"].stale);
        assert_eq!(quotes.missing, vec!["300750"]);
        assert_eq!(quotes.timestamp, Some(clock.now()));
        assert_eq!(fetcher.call_count(), 2);
    }

    #[test]
    fn missing_symbols_are_listed_once() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let svc = service(&fetcher, &clock());
        svc.refresh_many(&["000001"]);

        let requested: Vec<String> = ["300750", "000001", "sz300750", "?!", "601318", "?!"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let quotes = svc.quotes(Some(&requested));
        assert_eq!(quotes.missing, vec!["300750", "?!", "601318"]);
        assert!(quotes.data.contains_key("000001"));
    }

    #[test]
    fn screen_filters_snapshot_without_fetching() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let svc = service(&fetcher, &clock());

        // Scripted quotes carry turnover 1.0 and 2.0.
        svc.refresh_many(&["A", "B"]);
        let filter = QuoteFilter {
            min_turnover: Some(1.5),
            ..Default::default()
        };
        let screened = svc.screen(&filter);
        assert_eq!(screened.data.keys().collect::<Vec<_>>(), vec!["B"]);
        assert_eq!(fetcher.call_count(), 2);

        let none = svc.screen(&QuoteFilter {
            min_turnover: Some(100.0),
            ..Default::default()
        });
        assert_eq!(none.status, DataStatus::NoData);
    }

    #[test]
    fn market_activity_after_refresh() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let clock = clock();
        let svc = service(&fetcher, &clock);

        svc.refresh_aggregate().unwrap();
        let activity = svc.market_activity();
        assert_eq!(activity.status, DataStatus::Ok);
        assert_eq!(activity.timestamp, Some(clock.now()));
        assert_eq!(activity.data.unwrap().len(), 1);
    }

    #[test]
    fn control_api_round_trip() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let svc = service(&fetcher, &clock());

        assert!(svc.start_polling(&["X"], 0).is_err());
        assert!(svc.start_polling(&["X"], 60).unwrap());
        assert_eq!(svc.polling_state(), PollerState::Running);
        assert_eq!(*svc.update_watchset(&["sz000001", "bad symbol!"]), vec!["000001"]);
        assert!(svc.stop_polling());
        assert!(!svc.stop_polling());
        svc.shutdown();
        assert_eq!(svc.polling_state(), PollerState::Stopped);
    }

    #[test]
    fn start_uses_configured_watchlist() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let mut config = ServiceConfig::default();
        config.trading_window.enabled = false;
        config.poller.watchlist = vec!["600519".to_string()];
        config.aggregate.interval_secs = 3600;
        let svc = MarketDataService::new(
            &config,
            Arc::clone(&fetcher) as Arc<dyn QuoteFetcher>,
            clock() as Arc<dyn Clock>,
        )
        .unwrap();

        svc.start().unwrap();
        assert_eq!(*svc.watchset(), vec!["600519"]);
        assert!(svc.aggregate_running());
        svc.shutdown();
        assert!(!svc.aggregate_running());
    }
}
