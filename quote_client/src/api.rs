//! Blocking HTTP client for the quote cache server.
use std::time::Duration;

use log::debug;
use quote_common::net::api_url;
use quote_common::wire::{ErrorBody, MarketActivityResponse, QuotesRequest, QuotesResponse};
use quote_common::{QuoteError, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;

/// Connection to one server with one token.
pub struct QuoteApi {
    client: Client,
    base: String,
    token: String,
}

impl QuoteApi {
    /// Build the HTTP client.
    pub fn new(base: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QuoteError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base: base.trim().to_string(),
            token: token.to_string(),
        })
    }

    /// Cached quotes for `symbols`, or for everything cached when `None`.
    pub fn quotes(&self, symbols: Option<&[String]>) -> Result<QuotesResponse> {
        let body = QuotesRequest {
            token: self.token.clone(),
            symbols: symbols.map(<[String]>::to_vec),
        };
        self.post("/quotes", &body)
    }

    /// Market-breadth snapshot.
    pub fn market_activity(&self) -> Result<MarketActivityResponse> {
        let body = QuotesRequest {
            token: self.token.clone(),
            symbols: None,
        };
        self.post("/data/market-activity", &body)
    }

    fn post<T: DeserializeOwned>(&self, route: &str, body: &QuotesRequest) -> Result<T> {
        let url = api_url(&self.base, route);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| QuoteError::fetch(&url, e))?;
        let status = response.status();
        let text = response.text().map_err(|e| QuoteError::fetch(&url, e))?;
        decode(&url, status, &text)
    }
}

/// Turn a response into its payload, or into the matching error.
fn decode<T: DeserializeOwned>(url: &str, status: StatusCode, text: &str) -> Result<T> {
    if status.is_success() {
        return Ok(serde_json::from_str(text)?);
    }
    let reason = serde_json::from_str::<ErrorBody>(text)
        .map(|b| b.error)
        .unwrap_or_else(|_| text.to_string());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(QuoteError::Auth(format!("{} ({})", reason, status)))
        }
        _ => Err(QuoteError::fetch(url, format!("{}: {}", status, reason))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote_common::wire::DataStatus;

    #[test]
    fn decodes_no_data_body() {
        let body = r#"{"status":"no_data","timestamp":null,"data":{},"message":"no data yet"}"#;
        let parsed: QuotesResponse = decode("u", StatusCode::OK, body).unwrap();
        assert_eq!(parsed.status, DataStatus::NoData);
        assert!(parsed.data.is_empty());
    }

    #[test]
    fn token_rejection_is_auth_error() {
        let err = decode::<QuotesResponse>(
            "u",
            StatusCode::FORBIDDEN,
            r#"{"error":"token is inactive"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, QuoteError::Auth(ref m) if m.contains("token is inactive")));
    }

    #[test]
    fn other_failures_are_fetch_errors() {
        let err = decode::<QuotesResponse>("u", StatusCode::BAD_GATEWAY, "upstream").unwrap_err();
        assert!(matches!(err, QuoteError::Fetch { .. }));
    }
}
