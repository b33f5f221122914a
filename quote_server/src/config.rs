//! Service configuration.
//!
//! Every field has a default, so an empty (or absent) TOML file yields a working setup:
//!
//! ```toml
//! [cache]
//! freshness_secs = 10
//!
//! [poller]
//! interval_secs = 10
//! watchlist = ["600519", "sz000001"]
//!
//! [aggregate]
//! interval_secs = 60
//! gated = false
//!
//! [trading_window]
//! timezone = "Asia/Shanghai"
//! sessions = [{ start = "09:30", end = "11:30" }, { start = "13:00", end = "15:00" }]
//!
//! [[auth.tokens]]
//! token = "demo-token"
//! expires_at = "2027-01-01T00:00:00Z"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use quote_common::net::{HTTP_PORT, addr};
use quote_common::{QuoteError, Result};
use serde::Deserialize;

use crate::cache::CacheSettings;
use crate::fetcher::FetchSource;
use crate::model::trading_window::{Session, TradingWindow};

/// Root of the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Price cache.
    pub cache: CacheConfig,
    /// Watch-set poller.
    pub poller: PollerConfig,
    /// Aggregate snapshot scheduler.
    pub aggregate: AggregateConfig,
    /// Trading-hours gate.
    pub trading_window: TradingWindowConfig,
    /// HTTP boundary.
    pub http: HttpConfig,
    /// Upstream data source.
    pub fetcher: FetcherConfig,
    /// Accepted caller tokens.
    pub auth: AuthConfig,
}

/// `[cache]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries older than this are refreshed in the background when read.
    pub freshness_secs: u64,
    /// Capacity of the background refresh queue.
    pub refresh_queue: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_secs: 10,
            refresh_queue: 64,
        }
    }
}

/// `[poller]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Seconds between ticks.
    pub interval_secs: u64,
    /// How long `stop` waits for the loop thread.
    pub stop_timeout_ms: u64,
    /// Initial watch set.
    pub watchlist: Vec<String>,
    /// Start polling when the service starts.
    pub autostart: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            stop_timeout_ms: 2000,
            watchlist: Vec::new(),
            autostart: true,
        }
    }
}

/// `[aggregate]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    /// Run the aggregate scheduler at all.
    pub enabled: bool,
    /// Seconds between refreshes.
    pub interval_secs: u64,
    /// Skip refreshes outside trading hours.
    pub gated: bool,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            gated: false,
        }
    }
}

/// One `HH:MM`-`HH:MM` session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session start, inclusive.
    pub start: String,
    /// Session end, exclusive.
    pub end: String,
}

/// `[trading_window]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingWindowConfig {
    /// Apply the gate to the poller; when `false` the poller runs around the clock.
    pub enabled: bool,
    /// IANA time zone of the exchange.
    pub timezone: String,
    /// Trading sessions in exchange time.
    pub sessions: Vec<SessionConfig>,
}

impl Default for TradingWindowConfig {
    fn default() -> Self {
        let session = |start: &str, end: &str| SessionConfig {
            start: start.to_string(),
            end: end.to_string(),
        };
        Self {
            enabled: true,
            timezone: "Asia/Shanghai".to_string(),
            sessions: vec![session("09:30", "11:30"), session("13:00", "15:00")],
        }
    }
}

/// `[http]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen address.
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: addr("0.0.0.0", HTTP_PORT),
        }
    }
}

/// `[fetcher]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Which implementation to use.
    pub source: FetchSource,
    /// East Money API root.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Base delay between retries; multiplied by the attempt number.
    pub retry_delay_ms: u64,
    /// Rows per page when listing the whole market.
    pub page_size: usize,
    /// Starting price of simulated symbols.
    pub initial_price: f64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            source: FetchSource::EastMoney,
            base_url: "https://push2.eastmoney.com".to_string(),
            timeout_secs: 5,
            max_retries: 1,
            retry_delay_ms: 300,
            page_size: 100,
            initial_price: 100.0,
        }
    }
}

/// `[auth]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Accepted tokens.
    pub tokens: Vec<TokenConfig>,
}

/// One `[[auth.tokens]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Secret presented by callers.
    pub token: String,
    /// Inactive tokens are rejected with 403.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Expired tokens are rejected with 403; no expiry when absent.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl ServiceConfig {
    /// Read and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| QuoteError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ServiceConfig =
            toml::from_str(text).map_err(|e| QuoteError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poller.interval_secs == 0 {
            return Err(QuoteError::Config("poller.interval_secs must be > 0".into()));
        }
        if self.aggregate.enabled && self.aggregate.interval_secs == 0 {
            return Err(QuoteError::Config("aggregate.interval_secs must be > 0".into()));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(QuoteError::Config("fetcher.timeout_secs must be > 0".into()));
        }
        self.trading_window()?;
        Ok(())
    }

    /// Cache tuning derived from `[cache]`.
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            freshness: Duration::from_secs(self.cache.freshness_secs),
            refresh_queue: self.cache.refresh_queue,
        }
    }

    /// Poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poller.interval_secs)
    }

    /// Bounded wait used when stopping background loops.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.poller.stop_timeout_ms)
    }

    /// Aggregate refresh interval.
    pub fn aggregate_interval(&self) -> Duration {
        Duration::from_secs(self.aggregate.interval_secs)
    }

    /// Build the trading-hours gate.
    pub fn trading_window(&self) -> Result<TradingWindow> {
        let timezone: Tz = self.trading_window.timezone.parse().map_err(|e| {
            QuoteError::Config(format!(
                "unknown time zone {:?}: {}",
                self.trading_window.timezone, e
            ))
        })?;
        let sessions = self
            .trading_window
            .sessions
            .iter()
            .map(|s| Session::parse(&s.start, &s.end))
            .collect::<Result<Vec<_>>>()?;
        Ok(TradingWindow::new(sessions, timezone))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ServiceConfig::from_toml_str("").unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.cache_settings().freshness, Duration::from_secs(10));
        assert_eq!(config.aggregate_interval(), Duration::from_secs(60));
        assert!(!config.aggregate.gated);
        assert_eq!(config.http.bind, "0.0.0.0:8080");
        assert_eq!(config.fetcher.source, FetchSource::EastMoney);

        let window = config.trading_window().unwrap();
        assert_eq!(window.sessions().len(), 2);
        assert_eq!(window.timezone(), chrono_tz::Asia::Shanghai);
    }

    #[test]
    fn loads_file_with_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[poller]
interval_secs = 30
watchlist = ["sh600519", "000001"]

[aggregate]
gated = true

[fetcher]
source = "simulated"

[trading_window]
timezone = "America/New_York"
sessions = [{{ start = "09:30", end = "16:00" }}]

[[auth.tokens]]
token = "abc"
expires_at = "2027-01-01T00:00:00Z"

[[auth.tokens]]
token = "old"
active = false
"#
        )
        .unwrap();

        let config = ServiceConfig::load(file.path()).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.poller.watchlist, vec!["sh600519", "000001"]);
        assert!(config.aggregate.gated);
        assert_eq!(config.fetcher.source, FetchSource::Simulated);
        assert_eq!(config.auth.tokens.len(), 2);
        assert!(config.auth.tokens[0].active);
        assert!(!config.auth.tokens[1].active);

        let window = config.trading_window().unwrap();
        assert!(window.contains(NaiveTime::from_hms_opt(15, 0, 0).unwrap()));
    }

    #[test]
    fn rejects_zero_interval_and_bad_zone() {
        assert!(matches!(
            ServiceConfig::from_toml_str("[poller]\ninterval_secs = 0"),
            Err(QuoteError::Config(_))
        ));
        assert!(matches!(
            ServiceConfig::from_toml_str("[trading_window]\ntimezone = \"Mars/Olympus\""),
            Err(QuoteError::Config(_))
        ));
    }
}
