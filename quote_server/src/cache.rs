//! Cache-first price reads with stale fallback.
//!
//! `PriceCache` wraps the [`EntryStore`] and decides, per read, whether the cached entry is
//! good enough or the fetcher has to be called:
//!
//! - A cached entry is always served immediately. If it is older than the freshness
//!   threshold, one background refresh of that symbol is queued as well.
//! - A missing entry (or a forced refresh) calls the fetcher synchronously. On failure the
//!   previous entry, if any, is served with `stale = true`; only a symbol that was never
//!   cached produces [`QuoteError::NoDataAvailable`].
//!
//! Background refreshes go through a bounded queue drained by one worker thread. A symbol
//! that is already queued or being fetched is not queued again, so a burst of stale reads
//! for one symbol costs a single upstream call. When the queue is full the refresh is
//! skipped; the next stale read will try again.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, info, warn};
use parking_lot::Mutex;
use quote_common::symbols::normalize_symbol;
use quote_common::{QuoteError, Result};

use crate::fetcher::QuoteFetcher;
use crate::model::clock::Clock;
use crate::model::store::{CacheEntry, EntryStore};

/// Default freshness threshold.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(10);
/// Default capacity of the background refresh queue.
pub const DEFAULT_REFRESH_QUEUE: usize = 64;

/// Outcome of a successful price read.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPrice {
    /// Quote and its store timestamp.
    pub entry: CacheEntry,
    /// Served from the store rather than fetched for this call.
    pub from_cache: bool,
    /// A refresh failed and this entry is the last known value.
    pub stale: bool,
    /// Age of the entry at read time.
    pub age: TimeDelta,
}

/// Per-symbol read result: data (possibly stale) or an explicit error.
pub type PriceResult = Result<CachedPrice>;

/// Tuning knobs of a [`PriceCache`].
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    /// Entries older than this trigger a background refresh when read.
    pub freshness: Duration,
    /// Capacity of the background refresh queue.
    pub refresh_queue: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            freshness: DEFAULT_FRESHNESS,
            refresh_queue: DEFAULT_REFRESH_QUEUE,
        }
    }
}

/// State shared between the cache handle and its refresh worker.
struct CacheCore {
    store: EntryStore,
    fetcher: Arc<dyn QuoteFetcher>,
    clock: Arc<dyn Clock>,
    in_flight: Mutex<HashSet<String>>,
}

impl CacheCore {
    /// Call the fetcher without holding any lock, then store the result.
    ///
    /// A panicking fetcher is reported as a fetch failure.
    fn fetch_and_store(&self, symbol: &str) -> Result<CacheEntry> {
        let fetched = panic::catch_unwind(AssertUnwindSafe(|| self.fetcher.fetch_quote(symbol)))
            .unwrap_or_else(|_| Err(QuoteError::fetch(symbol, "fetcher panicked")))?;
        Ok(self.store.put(symbol, fetched, self.clock.now()))
    }
}

/// Cache-first quote reader.
pub struct PriceCache {
    core: Arc<CacheCore>,
    freshness: TimeDelta,
    refresh_tx: Sender<String>,
}

impl PriceCache {
    /// Create an empty cache and start its refresh worker.
    ///
    /// The worker exits once the cache is dropped.
    pub fn new(
        fetcher: Arc<dyn QuoteFetcher>,
        clock: Arc<dyn Clock>,
        settings: CacheSettings,
    ) -> Result<Self> {
        let freshness = TimeDelta::from_std(settings.freshness)
            .map_err(|e| QuoteError::Config(format!("freshness threshold: {}", e)))?;
        let core = Arc::new(CacheCore {
            store: EntryStore::new(),
            fetcher,
            clock,
            in_flight: Mutex::new(HashSet::new()),
        });

        let (refresh_tx, refresh_rx) = bounded::<String>(settings.refresh_queue.max(1));
        let worker_core = Arc::clone(&core);
        thread::Builder::new()
            .name("quote-refresh".to_string())
            .spawn(move || run_refresh_worker(worker_core, refresh_rx))?;

        Ok(Self {
            core,
            freshness,
            refresh_tx,
        })
    }

    /// Read a price, preferring the cache.
    ///
    /// With `force_refresh` the fetcher is always called; otherwise it is only called when
    /// nothing is cached for the symbol.
    pub fn get_price(&self, symbol: &str, force_refresh: bool) -> PriceResult {
        let symbol = normalize_symbol(symbol)?;

        if !force_refresh {
            if let Some(entry) = self.core.store.get(&symbol) {
                let age = entry.age(self.core.clock.now());
                if age > self.freshness {
                    debug!(
                        "{} is {}ms old; refreshing in background",
                        symbol,
                        age.num_milliseconds()
                    );
                    self.schedule_refresh(&symbol);
                }
                return Ok(CachedPrice {
                    entry,
                    from_cache: true,
                    stale: false,
                    age,
                });
            }
        }

        self.refresh_canonical(&symbol)
    }

    /// Fetch one symbol now, falling back to the cached entry on failure.
    pub fn refresh(&self, symbol: &str) -> PriceResult {
        let symbol = normalize_symbol(symbol)?;
        self.refresh_canonical(&symbol)
    }

    /// Refresh each symbol independently.
    ///
    /// Results are keyed by canonical symbol, so equivalent spellings are fetched once.
    /// Symbols that cannot be normalized are reported under their trimmed input.
    pub fn refresh_many<S: AsRef<str>>(&self, symbols: &[S]) -> BTreeMap<String, PriceResult> {
        self.refresh_many_while(symbols, || true)
    }

    /// Like [`refresh_many`](Self::refresh_many), but checks `keep_going` before each fetch
    /// and returns what was refreshed so far once it yields `false`.
    pub fn refresh_many_while<S, F>(
        &self,
        symbols: &[S],
        keep_going: F,
    ) -> BTreeMap<String, PriceResult>
    where
        S: AsRef<str>,
        F: Fn() -> bool,
    {
        let mut results = BTreeMap::new();

        for raw in symbols {
            if !keep_going() {
                debug!(
                    "Batch refresh interrupted after {} of {} symbols",
                    results.len(),
                    symbols.len()
                );
                break;
            }
            match normalize_symbol(raw.as_ref()) {
                Ok(code) => {
                    if results.contains_key(&code) {
                        continue;
                    }
                    let result = self.refresh_canonical(&code);
                    results.insert(code, result);
                }
                Err(e) => {
                    results.insert(raw.as_ref().trim().to_string(), Err(e));
                }
            }
        }

        let failed = results.values().filter(|r| r.is_err()).count();
        let stale = results
            .values()
            .filter(|r| matches!(r, Ok(p) if p.stale))
            .count();
        info!(
            "Refreshed {} symbols ({} stale, {} without data)",
            results.len(),
            stale,
            failed
        );
        results
    }

    /// Cached entry for a symbol, without any fetch.
    pub fn cached(&self, symbol: &str) -> Option<CacheEntry> {
        let symbol = normalize_symbol(symbol).ok()?;
        self.core.store.get(&symbol)
    }

    /// Copy of every cached entry.
    pub fn snapshot(&self) -> HashMap<String, CacheEntry> {
        self.core.store.snapshot()
    }

    /// Whether an entry is within the freshness threshold at `now`.
    pub fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        entry.age(now) <= self.freshness
    }

    /// Current time according to the cache's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.core.clock.now()
    }

    fn refresh_canonical(&self, symbol: &str) -> PriceResult {
        match self.core.fetch_and_store(symbol) {
            Ok(entry) => Ok(CachedPrice {
                entry,
                from_cache: false,
                stale: false,
                age: TimeDelta::zero(),
            }),
            Err(err) => match self.core.store.get(symbol) {
                Some(entry) => {
                    warn!("Serving stale {} after fetch failure: {}", symbol, err);
                    let age = entry.age(self.core.clock.now());
                    Ok(CachedPrice {
                        entry,
                        from_cache: true,
                        stale: true,
                        age,
                    })
                }
                None => {
                    warn!("No data for {}: {}", symbol, err);
                    Err(QuoteError::NoDataAvailable {
                        symbol: symbol.to_string(),
                        reason: err.to_string(),
                    })
                }
            },
        }
    }

    /// Queue a background refresh unless one is already pending for `symbol`.
    fn schedule_refresh(&self, symbol: &str) {
        if !self.core.in_flight.lock().insert(symbol.to_string()) {
            debug!("Refresh of {} already in flight", symbol);
            return;
        }
        if let Err(e) = self.refresh_tx.try_send(symbol.to_string()) {
            self.core.in_flight.lock().remove(symbol);
            debug!("Skipping background refresh of {}: {}", symbol, e);
        }
    }
}

fn run_refresh_worker(core: Arc<CacheCore>, refresh_rx: Receiver<String>) {
    for symbol in refresh_rx.iter() {
        match core.fetch_and_store(&symbol) {
            Ok(entry) => debug!("Background refresh of {} -> {:.2}", symbol, entry.quote.price),
            Err(e) => warn!("Background refresh of {} failed: {}", symbol, e),
        }
        core.in_flight.lock().remove(&symbol);
    }
    debug!("Refresh worker exiting");
}
