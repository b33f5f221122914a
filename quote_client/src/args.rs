//! Command-line arguments for the Quote Client.
//!
//! This module defines the CLI interface using `clap`. See `main` for end-to-end usage.
use clap::{Parser, ValueEnum};

/// What the client polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Cached quotes of the watchlist.
    Quotes,
    /// Market-breadth snapshot.
    Activity,
}

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Base URL of the quote cache server.
    #[arg(long, env = "QUOTE_SERVER_URL", default_value = "http://127.0.0.1:8080")]
    pub server: String,

    /// Access token sent with every request.
    #[arg(long, env = "QUOTE_TOKEN")]
    pub token: String,

    /// Path to a text file with symbols to request; all cached symbols when absent.
    /// Symbols may be separated by commas, spaces, or new lines.
    #[arg(long)]
    pub path: Option<String>,

    /// Seconds between requests.
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// What to poll.
    #[arg(long, value_enum, default_value_t = Mode::Quotes)]
    pub mode: Mode,
}
