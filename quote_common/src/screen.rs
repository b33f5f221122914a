//! Structured screening criteria applied to cached quotes.

use serde::{Deserialize, Serialize};

use crate::quote::Quote;

/// Optional bounds on quote fields; an unset bound does not filter.
///
/// Bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteFilter {
    /// Minimum turnover rate, percent.
    #[serde(default)]
    pub min_turnover: Option<f64>,
    /// Maximum turnover rate, percent.
    #[serde(default)]
    pub max_turnover: Option<f64>,
    /// Minimum change, percent.
    #[serde(default)]
    pub min_change_percent: Option<f64>,
    /// Maximum change, percent.
    #[serde(default)]
    pub max_change_percent: Option<f64>,
}

impl QuoteFilter {
    /// Whether `quote` satisfies every set bound.
    pub fn matches(&self, quote: &Quote) -> bool {
        within(quote.turnover_rate, self.min_turnover, self.max_turnover)
            && within(quote.change_percent, self.min_change_percent, self.max_change_percent)
    }
}

fn within(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.is_none_or(|m| value >= m) && max.is_none_or(|m| value <= m)
}
