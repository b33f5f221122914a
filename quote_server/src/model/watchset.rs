//! The set of symbols the poller keeps fresh.
//!
//! Replacement is a pointer swap under a dedicated lock: a reader takes an `Arc` to the
//! current list and iterates it without holding the lock, so it sees either the old set or
//! the new one in full.

use std::sync::Arc;

use log::warn;
use parking_lot::RwLock;
use quote_common::symbols::normalize_symbol;

/// Swappable watch set of canonical symbols.
#[derive(Debug, Default)]
pub struct WatchSet {
    symbols: RwLock<Arc<Vec<String>>>,
}

impl WatchSet {
    /// Create a watch set from raw symbols.
    pub fn new<S: AsRef<str>>(symbols: &[S]) -> Self {
        Self {
            symbols: RwLock::new(Arc::new(canonicalize(symbols))),
        }
    }

    /// Current symbols.
    pub fn current(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.symbols.read())
    }

    /// Atomically replace the watch set; returns the canonical list now in effect.
    pub fn replace<S: AsRef<str>>(&self, symbols: &[S]) -> Arc<Vec<String>> {
        let next = Arc::new(canonicalize(symbols));
        *self.symbols.write() = Arc::clone(&next);
        next
    }
}

/// Normalize and de-duplicate, preserving first-seen order; invalid entries are dropped.
fn canonicalize<S: AsRef<str>>(symbols: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(symbols.len());
    for raw in symbols {
        match normalize_symbol(raw.as_ref()) {
            Ok(code) if !out.contains(&code) => out.push(code),
            Ok(_) => {}
            Err(e) => warn!("Dropping watch set entry: {}", e),
        }
    }
    out
}
