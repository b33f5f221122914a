//! Quote cache server.
//!
//! Wires the building blocks of the `quote_server` library into one process:
//!
//! - `Args` / `ServiceConfig`: CLI flags layered over an optional TOML file.
//! - `MarketDataService`: price cache, watch-set poller and aggregate scheduler. Its
//!   background loops are plain threads, started before the HTTP runtime exists.
//! - `http::create_router`: the axum JSON boundary, served on a multi-threaded tokio
//!   runtime until Ctrl+C.
//!
//! Shutdown: Ctrl+C ends the HTTP server gracefully, then the poller and scheduler are
//! stopped with a bounded wait. The upstream client is blocking and is therefore created
//! and dropped outside the async runtime.
#![warn(missing_docs)]
use std::sync::Arc;

use clap::Parser;
use log::{error, info};
use quote_common::{QuoteError, Result};
use quote_server::args::Args;
use quote_server::auth::{StaticTokens, TokenValidator};
use quote_server::fetcher::build_fetcher;
use quote_server::http::{AppState, create_router};
use quote_server::model::clock::{Clock, SystemClock};
use quote_server::{MarketDataService, ServiceConfig};

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();
    let config = args.load_config()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let fetcher = build_fetcher(&config.fetcher)?;
    info!("Using {} data source", config.fetcher.source);

    let service = Arc::new(MarketDataService::new(&config, fetcher, Arc::clone(&clock))?);
    let tokens = StaticTokens::new(&config.auth.tokens, clock);
    if tokens.is_empty() {
        error!("No tokens configured; every /api request will be refused");
    }
    service.start()?;

    let served = serve(&config, Arc::clone(&service), Arc::new(tokens));
    service.shutdown();
    if let Err(e) = &served {
        error!("HTTP server failed: {}", e);
    }
    served
}

fn serve(
    config: &ServiceConfig,
    service: Arc<MarketDataService>,
    tokens: Arc<dyn TokenValidator>,
) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(config.http.bind.as_str()).await?;
        info!("HTTP server listening on {}", listener.local_addr()?);

        let app = create_router(AppState::new(service, tokens));
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(QuoteError::Io)
    })
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, shutting down..."),
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

fn init_logger() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
