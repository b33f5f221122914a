//! HTTP/JSON boundary over the [`MarketDataService`].
//!
//! Every `/api/v1` route takes a caller `token` (query string for GET, JSON body for POST)
//! checked by the configured [`TokenValidator`]. Read routes answer from the cache; an empty
//! cache is reported with `status = "no_data"` and HTTP 200. Only the price route may reach
//! the fetcher, and it does so on the blocking pool.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use log::{debug, error, info};
use quote_common::QuoteError;
use quote_common::net::API_PREFIX;
use quote_common::screen::QuoteFilter;
use quote_common::symbols::split_symbols;
use quote_common::wire::{
    ErrorBody, MarketActivityResponse, PriceResponse, QuotesRequest, QuotesResponse,
    WatchsetRequest,
};
use serde::{Deserialize, Serialize};

use crate::auth::{AccessError, TokenValidator};
use crate::cache::PriceResult;
use crate::service::MarketDataService;

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    service: Arc<MarketDataService>,
    tokens: Arc<dyn TokenValidator>,
}

impl AppState {
    /// Bundle the service with its access gate.
    pub fn new(service: Arc<MarketDataService>, tokens: Arc<dyn TokenValidator>) -> Self {
        Self { service, tokens }
    }

    fn authorize(&self, token: &str) -> Result<(), ApiError> {
        self.tokens.validate(token).map_err(ApiError::Access)
    }
}

/// Create the router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            &format!("{}/quotes", API_PREFIX),
            get(quotes_query).post(quotes_body),
        )
        .route(&format!("{}/price/{{symbol}}", API_PREFIX), get(price))
        .route(
            &format!("{}/data/market-activity", API_PREFIX),
            get(market_activity_query).post(market_activity_body),
        )
        .route(&format!("{}/screen", API_PREFIX), get(screen))
        .route(&format!("{}/watchset", API_PREFIX), post(update_watchset))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

/// Query string of the GET read routes.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    /// Caller token.
    #[serde(default)]
    pub token: String,
    /// Comma-separated symbols; all cached symbols when absent.
    #[serde(default)]
    pub symbols: Option<String>,
}

/// Query string of the price route.
#[derive(Debug, Default, Deserialize)]
pub struct PriceQuery {
    /// Caller token.
    #[serde(default)]
    pub token: String,
    /// Bypass the cache and fetch now.
    #[serde(default)]
    pub force: bool,
}

/// Query string of the screening route: a token plus [`QuoteFilter`] bounds.
#[derive(Debug, Default, Deserialize)]
pub struct ScreenQuery {
    /// Caller token.
    #[serde(default)]
    pub token: String,
    /// Minimum turnover rate, percent.
    pub min_turnover: Option<f64>,
    /// Maximum turnover rate, percent.
    pub max_turnover: Option<f64>,
    /// Minimum change, percent.
    pub min_change_percent: Option<f64>,
    /// Maximum change, percent.
    pub max_change_percent: Option<f64>,
}

impl ScreenQuery {
    fn filter(&self) -> QuoteFilter {
        QuoteFilter {
            min_turnover: self.min_turnover,
            max_turnover: self.max_turnover,
            min_change_percent: self.min_change_percent,
            max_change_percent: self.max_change_percent,
        }
    }
}

/// Body of a successful watch-set update.
#[derive(Debug, Serialize, Deserialize)]
pub struct WatchsetResponse {
    /// Canonical symbols now being polled.
    pub symbols: Vec<String>,
}

async fn quotes_query(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<QuotesResponse>, ApiError> {
    state.authorize(&query.token)?;
    let symbols: Option<Vec<String>> = query
        .symbols
        .as_deref()
        .map(|s| split_symbols(s).map(str::to_string).collect());
    Ok(Json(state.service.quotes(symbols.as_deref())))
}

async fn quotes_body(
    State(state): State<AppState>,
    Json(req): Json<QuotesRequest>,
) -> Result<Json<QuotesResponse>, ApiError> {
    state.authorize(&req.token)?;
    Ok(Json(state.service.quotes(req.symbols.as_deref())))
}

async fn price(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<PriceQuery>,
) -> Result<Json<PriceResponse>, ApiError> {
    state.authorize(&query.token)?;
    debug!("Price request for {} (force = {})", symbol, query.force);

    let service = Arc::clone(&state.service);
    let requested = symbol.clone();
    let result = tokio::task::spawn_blocking(move || service.get_price(&requested, query.force))
        .await
        .map_err(|e| ApiError::Internal(format!("price lookup task failed: {}", e)))?;
    price_response(&symbol, result).map(Json)
}

async fn market_activity_query(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<MarketActivityResponse>, ApiError> {
    state.authorize(&query.token)?;
    Ok(Json(state.service.market_activity()))
}

async fn market_activity_body(
    State(state): State<AppState>,
    Json(req): Json<QuotesRequest>,
) -> Result<Json<MarketActivityResponse>, ApiError> {
    state.authorize(&req.token)?;
    Ok(Json(state.service.market_activity()))
}

async fn screen(
    State(state): State<AppState>,
    Query(query): Query<ScreenQuery>,
) -> Result<Json<QuotesResponse>, ApiError> {
    state.authorize(&query.token)?;
    Ok(Json(state.service.screen(&query.filter())))
}

async fn update_watchset(
    State(state): State<AppState>,
    Json(req): Json<WatchsetRequest>,
) -> Result<Json<WatchsetResponse>, ApiError> {
    state.authorize(&req.token)?;
    let symbols = state.service.update_watchset(&req.symbols);
    info!("Watch set replaced over HTTP ({} symbols)", symbols.len());
    Ok(Json(WatchsetResponse {
        symbols: symbols.as_ref().clone(),
    }))
}

/// A symbol with nothing cached and a failed fetch is a regular answer, not an HTTP error.
fn price_response(requested: &str, result: PriceResult) -> Result<PriceResponse, ApiError> {
    match result {
        Ok(price) => Ok(PriceResponse {
            symbol: price.entry.quote.symbol.clone(),
            fetched_at: Some(price.entry.fetched_at),
            from_cache: price.from_cache,
            stale: price.stale,
            age_ms: Some(price.age.num_milliseconds()),
            quote: Some(price.entry.quote),
            error: None,
        }),
        Err(QuoteError::NoDataAvailable { symbol, reason }) => Ok(PriceResponse {
            symbol,
            quote: None,
            fetched_at: None,
            from_cache: false,
            stale: false,
            age_ms: None,
            error: Some(reason),
        }),
        Err(e) => {
            debug!("Price request for {:?} rejected: {}", requested, e);
            Err(ApiError::Quote(e))
        }
    }
}

/// Error answered by a handler.
#[derive(Debug)]
pub enum ApiError {
    /// Token refused.
    Access(AccessError),
    /// Request could not be served.
    Quote(QuoteError),
    /// Handler infrastructure failed.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Access(AccessError::Invalid) => {
                (StatusCode::UNAUTHORIZED, AccessError::Invalid.to_string())
            }
            ApiError::Access(e) => (StatusCode::FORBIDDEN, e.to_string()),
            ApiError::Quote(e @ QuoteError::InvalidSymbol(_)) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            ApiError::Quote(e) => {
                error!("Request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            ApiError::Internal(message) => {
                error!("Request failed: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
