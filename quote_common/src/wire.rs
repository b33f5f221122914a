//! JSON payloads exchanged over the HTTP boundary.
//!
//! Every read endpoint answers with a `status` field. An empty cache right after startup is
//! an expected transient state, so it is reported as [`DataStatus::NoData`] with a message
//! instead of an HTTP error.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::quote::Quote;

/// One record of the aggregate dataset; the cache treats it as opaque.
pub type AggregateRecord = serde_json::Map<String, serde_json::Value>;

/// Message sent alongside [`DataStatus::NoData`].
pub const NO_DATA_MESSAGE: &str = "no data yet";

/// Whether a read found anything in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataStatus {
    /// Cached data is attached.
    Ok,
    /// Nothing cached yet.
    NoData,
}

/// A cached quote with its freshness metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedQuote {
    /// The quote itself.
    pub quote: Quote,
    /// When the cache stored it.
    pub fetched_at: DateTime<Utc>,
    /// Age at the moment the response was built, in milliseconds.
    pub age_ms: i64,
    /// Older than the freshness threshold.
    pub stale: bool,
}

/// Body of `/api/v1/quotes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotesResponse {
    /// `ok` or `no_data`.
    pub status: DataStatus,
    /// Most recent `fetched_at` among the returned entries.
    pub timestamp: Option<DateTime<Utc>>,
    /// Cached entries keyed by canonical symbol.
    pub data: BTreeMap<String, CachedQuote>,
    /// Requested symbols with no cached entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
    /// Human-readable note, set for `no_data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body of `/api/v1/data/market-activity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketActivityResponse {
    /// `ok` or `no_data`.
    pub status: DataStatus,
    /// When the snapshot was fetched.
    pub timestamp: Option<DateTime<Utc>>,
    /// Aggregate records.
    pub data: Option<Vec<AggregateRecord>>,
    /// Human-readable note, set for `no_data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body of `/api/v1/price/{symbol}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceResponse {
    /// Canonical symbol.
    pub symbol: String,
    /// Quote, absent when nothing is available.
    pub quote: Option<Quote>,
    /// When the quote was stored.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Served from the cache rather than a fetch made for this request.
    pub from_cache: bool,
    /// A refresh failed and this is older data.
    pub stale: bool,
    /// Age of the served quote in milliseconds.
    pub age_ms: Option<i64>,
    /// Set when no data could be served at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// JSON body accepted by the POST variants of the read endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotesRequest {
    /// Caller token checked by the access gate.
    pub token: String,
    /// Symbols to return; all cached symbols when absent.
    #[serde(default)]
    pub symbols: Option<Vec<String>>,
}

/// JSON body of `POST /api/v1/watchset`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchsetRequest {
    /// Caller token checked by the access gate.
    pub token: String,
    /// Replacement watch set.
    pub symbols: Vec<String>,
}

/// Error body for non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error description.
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_data_status_is_snake_case() {
        let body = MarketActivityResponse {
            status: DataStatus::NoData,
            timestamp: None,
            data: None,
            message: Some(NO_DATA_MESSAGE.to_string()),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], "no_data");
        assert_eq!(json["message"], "no data yet");
        assert!(json["data"].is_null());
    }

    #[test]
    fn quotes_request_symbols_are_optional() {
        let req: QuotesRequest = serde_json::from_str(r#"{"token":"t"}"#).unwrap();
        assert_eq!(req.token, "t");
        assert!(req.symbols.is_none());
    }
}
