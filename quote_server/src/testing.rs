//! In-process fetcher used by unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use quote_common::wire::AggregateRecord;
use quote_common::{Quote, QuoteError, Result};
use serde_json::json;

use crate::fetcher::QuoteFetcher;

/// Fetcher whose failures and latency are set by the test.
///
/// Every successful quote carries the same value `n` in all numeric fields, where `n` grows
/// by one per successful fetch, so a torn read would show mismatching fields.
#[derive(Default)]
pub struct ScriptedFetcher {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    fail_all: AtomicBool,
    fail_aggregate: AtomicBool,
    delay: Mutex<Duration>,
    counter: AtomicU64,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, symbol: &str) {
        self.failing.lock().insert(symbol.to_string());
    }

    pub fn recover(&self, symbol: &str) {
        self.failing.lock().remove(symbol);
    }

    pub fn fail_everything(&self, on: bool) {
        self.fail_all.store(on, Ordering::SeqCst);
    }

    pub fn fail_aggregate(&self, on: bool) {
        self.fail_aggregate.store(on, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, symbol: &str) -> usize {
        self.calls.lock().iter().filter(|s| *s == symbol).count()
    }

    fn pause(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

impl QuoteFetcher for ScriptedFetcher {
    fn fetch_quote(&self, symbol: &str) -> Result<Quote> {
        self.calls.lock().push(symbol.to_string());
        self.pause();
        if self.fail_all.load(Ordering::SeqCst) || self.failing.lock().contains(symbol) {
            return Err(QuoteError::fetch(symbol, "scripted failure"));
        }

        let n = (self.counter.fetch_add(1, Ordering::SeqCst) + 1) as f64;
        Ok(Quote::new(symbol, format!("name-{}", symbol), n, n)
            .with_session(n, n, n)
            .with_activity(n, n))
    }

    fn fetch_aggregate(&self) -> Result<Vec<AggregateRecord>> {
        self.calls.lock().push("aggregate".to_string());
        self.pause();
        if self.fail_aggregate.load(Ordering::SeqCst) {
            return Err(QuoteError::fetch("aggregate", "scripted failure"));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let mut record = AggregateRecord::new();
        record.insert("item".to_string(), json!("up"));
        record.insert("value".to_string(), json!(n));
        Ok(vec![record])
    }
}
