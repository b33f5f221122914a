//! East Money push2 data provider.
//!
//! Single quotes come from `/api/qt/stock/get`; the market-breadth aggregate is computed
//! from the paginated A-share list at `/api/qt/clist/get`. Both endpoints are queried with
//! `fltt=2`, which makes the API return prices as decimals instead of scaled integers.
//! Suspended or unlisted fields are reported as `"-"` and treated as missing.

use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Asia::Shanghai;
use log::{debug, warn};
use quote_common::symbols::Market;
use quote_common::wire::AggregateRecord;
use quote_common::{Quote, QuoteError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};

use super::QuoteFetcher;
use crate::config::FetcherConfig;

const QUOTE_FIELDS: &str = "f43,f44,f45,f46,f47,f57,f58,f60,f86,f168";
const LIST_FIELDS: &str = "f2,f3,f12";
/// Shanghai main board + STAR, Shenzhen main board + ChiNext, Beijing.
const A_SHARE_FILTER: &str = "m:0+t:6,m:0+t:80,m:1+t:2,m:1+t:23,m:0+t:81+s:2048";
/// One lot on Chinese exchanges.
const SHARES_PER_LOT: f64 = 100.0;

#[derive(Debug, Deserialize)]
struct StockResponse {
    data: Option<StockData>,
}

#[derive(Debug, Deserialize)]
struct StockData {
    #[serde(rename = "f43", default, deserialize_with = "lenient_f64")]
    price: Option<f64>,
    #[serde(rename = "f44", default, deserialize_with = "lenient_f64")]
    high: Option<f64>,
    #[serde(rename = "f45", default, deserialize_with = "lenient_f64")]
    low: Option<f64>,
    #[serde(rename = "f46", default, deserialize_with = "lenient_f64")]
    open: Option<f64>,
    #[serde(rename = "f47", default, deserialize_with = "lenient_f64")]
    volume_lots: Option<f64>,
    #[serde(rename = "f57", default)]
    code: Option<String>,
    #[serde(rename = "f58", default)]
    name: Option<String>,
    #[serde(rename = "f60", default, deserialize_with = "lenient_f64")]
    last_close: Option<f64>,
    #[serde(rename = "f86", default, deserialize_with = "lenient_f64")]
    updated_at: Option<f64>,
    #[serde(rename = "f168", default, deserialize_with = "lenient_f64")]
    turnover_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    data: Option<ListData>,
}

#[derive(Debug, Deserialize)]
struct ListData {
    total: usize,
    #[serde(default)]
    diff: Vec<ListRow>,
}

/// One row of the A-share list.
#[derive(Debug, Clone, Deserialize)]
pub struct ListRow {
    /// Last price; missing for suspended stocks.
    #[serde(rename = "f2", default, deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    /// Percent change; missing for suspended stocks.
    #[serde(rename = "f3", default, deserialize_with = "lenient_f64")]
    pub change_percent: Option<f64>,
    /// Stock code.
    #[serde(rename = "f12")]
    pub code: String,
}

/// Accept numbers, numeric strings, and `"-"` placeholders.
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Live East Money fetcher.
pub struct EastMoneyFetcher {
    client: reqwest::blocking::Client,
    base_url: String,
    page_size: usize,
    max_retries: u32,
    retry_delay: Duration,
}

impl EastMoneyFetcher {
    /// Build the HTTP client from configuration.
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| QuoteError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size.max(1),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    fn quote_url(&self, symbol: &str) -> String {
        let secid = Market::for_code(symbol).secid_prefix();
        format!(
            "{}/api/qt/stock/get?secid={}.{}&fltt=2&invt=2&fields={}",
            self.base_url, secid, symbol, QUOTE_FIELDS
        )
    }

    fn list_url(&self, page: usize) -> String {
        format!(
            "{}/api/qt/clist/get?pn={}&pz={}&po=1&np=1&fltt=2&invt=2&fid=f3&fs={}&fields={}",
            self.base_url, page, self.page_size, A_SHARE_FILTER, LIST_FIELDS
        )
    }

    /// GET `url` and decode the JSON body, retrying transport and status failures.
    fn get_json<T: DeserializeOwned>(&self, target: &str, url: &str) -> Result<T> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                thread::sleep(self.retry_delay * attempt);
            }
            debug!("GET {} (attempt {})", url, attempt + 1);

            let response = self
                .client
                .get(url)
                .send()
                .and_then(|r| r.error_for_status());
            match response {
                Ok(resp) => {
                    return resp
                        .json::<T>()
                        .map_err(|e| QuoteError::Parse(format!("{}: {}", target, e)));
                }
                Err(e) => {
                    warn!("Request for {} failed (attempt {}): {}", target, attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(QuoteError::fetch(
            target,
            last_error.map_or_else(|| "no attempt made".to_string(), |e| e.to_string()),
        ))
    }
}

impl QuoteFetcher for EastMoneyFetcher {
    fn fetch_quote(&self, symbol: &str) -> Result<Quote> {
        let response: StockResponse = self.get_json(symbol, &self.quote_url(symbol))?;
        parse_quote(symbol, response, Utc::now())
    }

    fn fetch_aggregate(&self) -> Result<Vec<AggregateRecord>> {
        let mut rows: Vec<ListRow> = Vec::new();
        let mut page = 1;

        loop {
            let response: ListResponse = self.get_json("aggregate", &self.list_url(page))?;
            let data = response
                .data
                .ok_or_else(|| QuoteError::Parse("aggregate: list response without data".into()))?;
            let received = data.diff.len();
            rows.extend(data.diff);
            if received == 0 || rows.len() >= data.total {
                break;
            }
            page += 1;
        }

        debug!("Collected {} list rows over {} pages", rows.len(), page);
        Ok(breadth_records(&rows, Utc::now()))
    }
}

fn parse_quote(symbol: &str, response: StockResponse, now: DateTime<Utc>) -> Result<Quote> {
    let data = response
        .data
        .ok_or_else(|| QuoteError::fetch(symbol, "unknown symbol (empty data)"))?;
    let price = data
        .price
        .ok_or_else(|| QuoteError::fetch(symbol, "no last price (suspended?)"))?;
    let last_close = data.last_close.unwrap_or(price);
    let captured = data
        .updated_at
        .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
        .unwrap_or(now);

    if let Some(code) = data.code.as_deref() {
        if code != symbol {
            return Err(QuoteError::Parse(format!(
                "asked for {} but upstream answered {}",
                symbol, code
            )));
        }
    }

    Ok(Quote::new(symbol, data.name.unwrap_or_default(), price, last_close)
        .with_session(
            data.open.unwrap_or(price),
            data.high.unwrap_or(price),
            data.low.unwrap_or(price),
        )
        .with_activity(
            data.volume_lots.unwrap_or(0.0) * SHARES_PER_LOT,
            data.turnover_rate.unwrap_or(0.0),
        )
        .captured_at(captured))
}

/// Daily price limit, in percent, of the board a code trades on.
///
/// Special-treatment (ST) stocks trade with a 5% limit; the list API does not flag them,
/// so they count as limit moves only when they reach the board limit.
fn limit_percent(code: &str) -> f64 {
    match Market::for_code(code) {
        Market::BJ => 30.0,
        _ if code.starts_with("30") || code.starts_with("68") => 20.0,
        _ => 10.0,
    }
}

/// Market breadth: advancing/declining/flat counts, limit moves and an activity ratio.
pub fn breadth_records(rows: &[ListRow], now: DateTime<Utc>) -> Vec<AggregateRecord> {
    let (mut up, mut down, mut flat, mut limit_up, mut limit_down, mut suspended) =
        (0u64, 0u64, 0u64, 0u64, 0u64, 0u64);

    for row in rows {
        let Some(pct) = row.change_percent.filter(|_| row.price.is_some()) else {
            suspended += 1;
            continue;
        };
        let limit = limit_percent(&row.code) - 0.1;
        if pct > 0.0 {
            up += 1;
            if pct >= limit {
                limit_up += 1;
            }
        } else if pct < 0.0 {
            down += 1;
            if pct <= -limit {
                limit_down += 1;
            }
        } else {
            flat += 1;
        }
    }

    let traded = up + down + flat;
    let activity = if traded > 0 {
        (up as f64 / traded as f64 * 10_000.0).round() / 100.0
    } else {
        0.0
    };
    let as_of = now.with_timezone(&Shanghai).format("%Y-%m-%d %H:%M:%S").to_string();

    [
        ("up", json!(up)),
        ("down", json!(down)),
        ("flat", json!(flat)),
        ("limit_up", json!(limit_up)),
        ("limit_down", json!(limit_down)),
        ("suspended", json!(suspended)),
        ("activity", json!(activity)),
        ("as_of", json!(as_of)),
    ]
    .into_iter()
    .map(|(item, value)| {
        let mut record = AggregateRecord::new();
        record.insert("item".to_string(), json!(item));
        record.insert("value".to_string(), value);
        record
    })
    .collect()
}
