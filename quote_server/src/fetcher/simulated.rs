//! Offline quote source.
//!
//! Produces a small random walk around the last generated price of each symbol, so all
//! consumers observe a plausible sequence without network access. Liquid large caps get a
//! higher volume baseline than everything else.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use quote_common::wire::AggregateRecord;
use quote_common::{Quote, Result};
use rand::Rng;
use serde_json::json;

use super::QuoteFetcher;

/// Symbols simulated with a large-cap volume profile.
const LIQUID: [&str; 4] = ["600519", "300750", "601318", "000858"];

#[derive(Debug, Clone, Copy)]
struct Walk {
    last_close: f64,
    price: f64,
    open: f64,
    high: f64,
    low: f64,
}

/// Random-walk fetcher.
#[derive(Debug)]
pub struct SimulatedFetcher {
    initial_price: f64,
    walks: Mutex<HashMap<String, Walk>>,
}

impl SimulatedFetcher {
    /// Create a fetcher whose symbols all start at `initial_price`.
    pub fn new(initial_price: f64) -> Self {
        Self {
            initial_price: initial_price.max(0.01),
            walks: Mutex::new(HashMap::new()),
        }
    }

    /// Calculate the next price using a step sampled uniformly from `[-1%, +1%]`.
    ///
    /// The result is clamped to a minimum positive value to avoid zero/negative prices.
    pub fn next_price(current_price: f64) -> f64 {
        let mut rng = rand::rng();
        let change: f64 = rng.random_range(-0.01..0.01);
        let new_price = current_price * (1.0 + change);
        new_price.max(0.01)
    }
}

impl QuoteFetcher for SimulatedFetcher {
    fn fetch_quote(&self, symbol: &str) -> Result<Quote> {
        let walk = {
            let mut walks = self.walks.lock();
            let initial = self.initial_price;
            let walk = walks.entry(symbol.to_string()).or_insert(Walk {
                last_close: initial,
                price: initial,
                open: initial,
                high: initial,
                low: initial,
            });
            walk.price = Self::next_price(walk.price);
            walk.high = walk.high.max(walk.price);
            walk.low = walk.low.min(walk.price);
            *walk
        };

        let mut rng = rand::rng();
        let volume = if LIQUID.contains(&symbol) {
            100_000.0 + f64::from(rng.random_range(0..500_000u32))
        } else {
            10_000.0 + f64::from(rng.random_range(0..100_000u32))
        };
        let turnover: f64 = rng.random_range(0.5..15.0);

        Ok(Quote::new(symbol, format!("SIM-{}", symbol), walk.price, walk.last_close)
            .with_session(walk.open, walk.high, walk.low)
            .with_activity(volume, (turnover * 100.0).round() / 100.0)
            .captured_at(Utc::now()))
    }

    fn fetch_aggregate(&self) -> Result<Vec<AggregateRecord>> {
        let mut rng = rand::rng();
        let up: u32 = rng.random_range(500..4500);
        let down: u32 = rng.random_range(500..(5000 - up).max(501));
        let flat: u32 = rng.random_range(50..300);
        let activity = f64::from(up) / f64::from(up + down + flat) * 100.0;

        Ok([
            ("up", json!(up)),
            ("down", json!(down)),
            ("flat", json!(flat)),
            ("limit_up", json!(up / 50)),
            ("limit_down", json!(down / 80)),
            ("activity", json!((activity * 100.0).round() / 100.0)),
            ("as_of", json!(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string())),
        ]
        .into_iter()
        .map(|(item, value)| {
            let mut record = AggregateRecord::new();
            record.insert("item".to_string(), json!(item));
            record.insert("value".to_string(), value);
            record
        })
        .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_stays_within_one_percent_per_step() {
        let fetcher = SimulatedFetcher::new(100.0);
        let mut last = 100.0;
        for _ in 0..50 {
            let q = fetcher.fetch_quote("600519").unwrap();
            assert!((q.price - last).abs() <= last * 0.01 + 1e-9);
            assert!(q.low <= q.price && q.price <= q.high);
            assert_eq!(q.last_close, 100.0);
            last = q.price;
        }
    }

    #[test]
    fn symbols_walk_independently() {
        let fetcher = SimulatedFetcher::new(50.0);
        fetcher.fetch_quote("A").unwrap();
        let b = fetcher.fetch_quote("B").unwrap();
        assert!((b.price - 50.0).abs() <= 0.5 + 1e-9);
    }

    #[test]
    fn aggregate_has_breadth_items() {
        let records = SimulatedFetcher::new(10.0).fetch_aggregate().unwrap();
        let items: Vec<_> = records.iter().map(|r| r["item"].clone()).collect();
        assert!(items.contains(&json!("up")));
        assert!(items.contains(&json!("activity")));
    }
}
