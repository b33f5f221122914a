//! Command-line arguments for the quote cache server.
//!
//! Flags override the matching values of the TOML file given with `--config`; every flag
//! also reads an environment variable so the server can be configured in containers.
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use clap::Parser;
use log::info;
use quote_common::Result;
use quote_common::symbols::{SymbolParser, Watchlist};

use crate::config::ServiceConfig;
use crate::fetcher::FetchSource;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to a TOML configuration file; built-in defaults are used when absent.
    #[arg(long, env = "QUOTE_SERVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// HTTP listen address, e.g. `0.0.0.0:8080`.
    #[arg(long, env = "QUOTE_SERVER_BIND")]
    pub bind: Option<String>,

    /// Upstream data source: `eastmoney` or `simulated`.
    #[arg(long, env = "QUOTE_SERVER_SOURCE")]
    pub source: Option<FetchSource>,

    /// Path to a text file with the initial watch set.
    /// Symbols may be separated by commas, spaces, or new lines.
    #[arg(long, env = "QUOTE_SERVER_WATCHLIST")]
    pub watchlist: Option<PathBuf>,

    /// Poll interval in seconds.
    #[arg(long, env = "QUOTE_SERVER_INTERVAL")]
    pub interval: Option<u64>,
}

impl Args {
    /// Load the configuration file (if any) and apply the flags on top of it.
    pub fn load_config(&self) -> Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                ServiceConfig::load(path)?
            }
            None => ServiceConfig::default(),
        };
        self.apply(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the flags to `config`.
    pub fn apply(&self, config: &mut ServiceConfig) -> Result<()> {
        if let Some(bind) = &self.bind {
            config.http.bind = bind.clone();
        }
        if let Some(source) = self.source {
            config.fetcher.source = source;
        }
        if let Some(interval) = self.interval {
            config.poller.interval_secs = interval;
        }
        if let Some(path) = &self.watchlist {
            let file = File::open(path)?;
            config.poller.watchlist = Watchlist::parse_watchlist(BufReader::new(file))?;
            info!(
                "Watch set of {} symbols loaded from {}",
                config.poller.watchlist.len(),
                path.display()
            );
        }
        Ok(())
    }
}
