//! Quote Client: polls the quote cache server over HTTP and logs what it returns.
//!
//! In `quotes` mode it reads a list of symbols from a text file (or asks for everything
//! cached when no file is given) and logs every quote on each poll, flagging entries older
//! than the server's freshness threshold. In `activity` mode it logs the market-breadth
//! snapshot instead. Ctrl+C stops the loop.
//!
//! Usage example (CLI):
//! ```bash
//! quote_client --server http://192.168.0.10:8080 --token demo-token --path ./watchlist.txt
//! ```
//!
//! The watchlist file should contain symbols separated by commas, spaces, or new lines.
#![warn(missing_docs)]
mod api;
mod args;

use crate::api::QuoteApi;
use crate::args::{Args, Mode};
use clap::Parser;
use log::{error, info, warn};
use quote_common::symbols::{SymbolParser, Watchlist};
use quote_common::wire::{CachedQuote, DataStatus, MarketActivityResponse, QuotesResponse};
use quote_common::{QuoteError, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

/// Granularity at which the wait between polls checks for Ctrl+C.
const SHUTDOWN_CHECK: Duration = Duration::from_millis(100);
/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("Ctrl+C received. Shutting down client...");
            shutdown.store(true, Ordering::SeqCst);
        })
        .map_err(|e| QuoteError::Config(format!("failed to set Ctrl+C handler: {}", e)))?;
    }

    let symbols = match &args.path {
        Some(raw) => Some(load_watchlist(&normalize_path(raw))?),
        None => None,
    };
    if let Some(symbols) = &symbols {
        info!("Symbols: {:?}", symbols);
    }

    let api = QuoteApi::new(&args.server, &args.token, REQUEST_TIMEOUT)?;
    info!(
        "Polling {} every {}s. Press Ctrl+C to exit.",
        args.server, args.interval
    );

    let interval = Duration::from_secs(args.interval);
    while !shutdown.load(Ordering::SeqCst) {
        let outcome = match args.mode {
            Mode::Quotes => api.quotes(symbols.as_deref()).map(|r| log_quotes(&r)),
            Mode::Activity => api.market_activity().map(|r| log_activity(&r)),
        };
        match outcome {
            Ok(()) => {}
            Err(e @ QuoteError::Auth(_)) => {
                error!("Server refused the token: {}", e);
                return Err(e);
            }
            Err(e) => warn!("Request failed: {}", e),
        }
        wait(interval, &shutdown);
    }

    info!("Client stopped");
    Ok(())
}

fn load_watchlist(path: &Path) -> Result<Vec<String>> {
    if !is_file_exist(path) {
        return Err(QuoteError::ParseWatchlist(format!(
            "{} is not a file",
            path.display()
        )));
    }
    let file = File::open(path)?;
    Watchlist::parse_watchlist(BufReader::new(file))
}

/// Sleep for `interval`, returning early once `shutdown` is set.
fn wait(interval: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + interval;
    while !shutdown.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(SHUTDOWN_CHECK.min(deadline - now));
    }
}

fn log_quotes(response: &QuotesResponse) {
    if response.status == DataStatus::NoData {
        info!(
            "No quotes yet: {}",
            response.message.as_deref().unwrap_or("no data")
        );
    }
    for line in response.data.values().map(format_quote) {
        info!("{}", line);
    }
    if !response.missing.is_empty() {
        warn!("Not cached yet: {}", response.missing.join(", "));
    }
}

fn format_quote(entry: &CachedQuote) -> String {
    let q = &entry.quote;
    format!(
        "QUOTE: {} {} Price={:.2} Change={:+.2} ({:+.2}%) Turnover={:.2}% Time={}{}",
        q.symbol,
        q.name,
        q.price,
        q.change,
        q.change_percent,
        q.turnover_rate,
        entry.fetched_at.format("%H:%M:%S"),
        if entry.stale {
            format!(" [stale, {}s old]", entry.age_ms / 1000)
        } else {
            String::new()
        }
    )
}

fn log_activity(response: &MarketActivityResponse) {
    match (&response.data, response.timestamp) {
        (Some(records), Some(at)) => {
            info!("Market activity at {}:", at.format("%H:%M:%S"));
            for record in records {
                info!("  {}", serde_json::Value::Object(record.clone()));
            }
        }
        _ => info!(
            "No market activity yet: {}",
            response.message.as_deref().unwrap_or("no data")
        ),
    }
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

/// Normalize a CLI-provided path string by trimming whitespace and matching quotes.
///
/// This allows passing Windows paths in quotes without breaking parsing.
fn normalize_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    let no_quotes = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    PathBuf::from(no_quotes)
}

/// Returns `true` if the provided path exists and is a regular file.
fn is_file_exist(path: &Path) -> bool {
    path.exists() && path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use quote_common::Quote;

    #[test]
    fn strips_quotes_around_paths() {
        assert_eq!(normalize_path(" \"C:\\list.txt\" "), PathBuf::from("C:\\list.txt"));
        assert_eq!(normalize_path("list.txt"), PathBuf::from("list.txt"));
    }

    #[test]
    fn stale_quotes_are_flagged() {
        let at = Utc.with_ymd_and_hms(2025, 3, 4, 2, 0, 0).unwrap();
        let mut entry = CachedQuote {
            quote: Quote::new("600519", "Moutai", 110.0, 100.0),
            fetched_at: at,
            age_ms: 25_000,
            stale: true,
        };
        let line = format_quote(&entry);
        assert!(line.contains("Price=110.00"));
        assert!(line.contains("(+10.00%)"));
        assert!(line.ends_with("[stale, 25s old]"));

        entry.stale = false;
        assert!(!format_quote(&entry).contains("stale"));
    }

    #[test]
    fn missing_watchlist_file_is_an_error() {
        let err = load_watchlist(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(matches!(err, QuoteError::ParseWatchlist(_)));
    }

    #[test]
    fn wait_returns_early_on_shutdown() {
        let flag = AtomicBool::new(true);
        let started = Instant::now();
        wait(Duration::from_secs(5), &flag);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
