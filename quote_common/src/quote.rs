//! Quote data model.
//!
//! A `Quote` is one symbol's latest known state as delivered by a data source. The change
//! and percent-change fields are always derived from `price` and `last_close` at
//! construction time, so a quote never carries inconsistent arithmetic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Market quote for a single symbol.
///
/// Quotes are immutable values: a refresh replaces the whole quote rather than patching
/// individual fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Canonical symbol code (see [`crate::symbols::normalize_symbol`]).
    pub symbol: String,
    /// Display name.
    pub name: String,
    /// Last traded price.
    pub price: f64,
    /// Previous session close.
    pub last_close: f64,
    /// `price - last_close`.
    pub change: f64,
    /// Change relative to `last_close`, in percent.
    pub change_percent: f64,
    /// Traded volume (shares).
    pub volume: f64,
    /// Turnover rate, in percent.
    pub turnover_rate: f64,
    /// Session open.
    pub open: f64,
    /// Session high.
    pub high: f64,
    /// Session low.
    pub low: f64,
    /// Moment the data source captured this quote.
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Build a quote from price and previous close; change fields are computed here.
    ///
    /// Session and activity fields start at zero and the capture time at `Utc::now()`;
    /// use the `with_*` builders to fill them in.
    pub fn new(
        symbol: impl Into<String>,
        name: impl Into<String>,
        price: f64,
        last_close: f64,
    ) -> Self {
        let (change, change_percent) = Self::compute_change(price, last_close);
        Quote {
            symbol: symbol.into(),
            name: name.into(),
            price,
            last_close,
            change,
            change_percent,
            volume: 0.0,
            turnover_rate: 0.0,
            open: 0.0,
            high: 0.0,
            low: 0.0,
            timestamp: Utc::now(),
        }
    }

    /// Set open/high/low.
    pub fn with_session(mut self, open: f64, high: f64, low: f64) -> Self {
        self.open = open;
        self.high = high;
        self.low = low;
        self
    }

    /// Set volume and turnover rate.
    pub fn with_activity(mut self, volume: f64, turnover_rate: f64) -> Self {
        self.volume = volume;
        self.turnover_rate = turnover_rate;
        self
    }

    /// Set the capture timestamp.
    pub fn captured_at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Absolute and percent change of `price` against `last_close`.
    ///
    /// A non-positive close (new listing, missing data) yields a zero percent change
    /// instead of an infinite one.
    pub fn compute_change(price: f64, last_close: f64) -> (f64, f64) {
        let change = price - last_close;
        let percent = if last_close > 0.0 {
            change / last_close * 100.0
        } else {
            0.0
        };
        (change, percent)
    }
}
