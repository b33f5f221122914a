//! Error types shared between the cache server and the client.
//!
//! The `QuoteError` enum unifies the failure cases of fetching, caching, configuration and
//! serialization, allowing every crate in the workspace to propagate a single error type.
use std::io;

use thiserror::Error;

/// Unified error type shared by server and client.
#[derive(Error, Debug)]
pub enum QuoteError {
    /// I/O error originating from the standard library or sockets/files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// The upstream data source could not deliver a quote (network, status or payload).
    #[error("Fetch failed for {target}: {reason}")]
    Fetch {
        /// Symbol (or `aggregate`) the fetch was issued for.
        target: String,
        /// Human-readable cause reported by the fetcher.
        reason: String,
    },

    /// Nothing was ever cached for this key and a fresh fetch was not possible.
    #[error("No data available for {symbol}: {reason}")]
    NoDataAvailable {
        /// Canonical symbol code.
        symbol: String,
        /// Why the on-demand fetch failed.
        reason: String,
    },

    /// The symbol could not be normalized to a canonical code.
    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    /// Upstream payload did not have the expected shape.
    #[error("Unexpected response format: {0}")]
    Parse(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error while parsing a watchlist file into symbols.
    #[error("Parse watchlist file error: {0}")]
    ParseWatchlist(String),

    /// Caller token was rejected by the access gate.
    #[error("Access denied: {0}")]
    Auth(String),
}

impl QuoteError {
    /// Shorthand for a [`QuoteError::Fetch`] with any displayable cause.
    pub fn fetch(target: impl Into<String>, reason: impl ToString) -> Self {
        QuoteError::Fetch {
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}
