//!
//! Common types and utilities shared by the quote cache server and client.
//!
//! This crate aggregates:
//! - `error`: unified error type `QuoteError` used across the workspace.
//! - `result`: handy `Result<T, QuoteError>` alias.
//! - `quote`: the `Quote` record served by the cache.
//! - `symbols`: symbol normalization and watchlist parsing shared by both sides.
//! - `screen`: structured screening criteria over cached quotes.
//! - `wire`: JSON payloads of the HTTP boundary.
//! - `net`: networking constants and small helpers.
#![warn(missing_docs)]
pub mod error;
pub mod net;
pub mod quote;
pub mod result;
pub mod screen;
pub mod symbols;
pub mod wire;

pub use error::QuoteError;
pub use quote::Quote;
pub use result::Result;
