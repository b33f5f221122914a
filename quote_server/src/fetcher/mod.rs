//! Upstream data sources.
//!
//! A [`QuoteFetcher`] performs one blocking call per request and keeps no state that the
//! cache relies on. Implementations must tolerate concurrent calls for different symbols:
//! the poller, the stale-read refresh worker and on-demand HTTP requests all share one
//! fetcher.
//!
//! - `eastmoney`: live quotes and market breadth from the East Money push2 API.
//! - `simulated`: offline random-walk quotes for demos and local development.

use std::sync::Arc;

use quote_common::wire::AggregateRecord;
use quote_common::{Quote, Result};
use serde::Deserialize;
use strum_macros::{Display, EnumString};

use crate::config::FetcherConfig;

pub mod eastmoney;
pub mod simulated;

pub use eastmoney::EastMoneyFetcher;
pub use simulated::SimulatedFetcher;

/// Blocking market-data source.
pub trait QuoteFetcher: Send + Sync {
    /// Fetch the latest quote for a canonical symbol.
    fn fetch_quote(&self, symbol: &str) -> Result<Quote>;

    /// Fetch the composite market dataset as a list of opaque records.
    fn fetch_aggregate(&self) -> Result<Vec<AggregateRecord>>;
}

/// Which fetcher implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FetchSource {
    /// East Money push2 HTTP API.
    #[default]
    EastMoney,
    /// Offline random walk.
    Simulated,
}

/// Build the configured fetcher.
pub fn build_fetcher(config: &FetcherConfig) -> Result<Arc<dyn QuoteFetcher>> {
    Ok(match config.source {
        FetchSource::EastMoney => Arc::new(EastMoneyFetcher::new(config)?),
        FetchSource::Simulated => Arc::new(SimulatedFetcher::new(config.initial_price)),
    })
}
