//! Entry store: the per-symbol quote map behind the price cache.
//!
//! The store owns every [`CacheEntry`]; callers only ever receive clones, so a reader can
//! never observe a half-written entry. All operations take the lock for the duration of a
//! hash lookup and a small copy, never for a network call.
//!
//! Design notes:
//! - Entries are replaced wholesale on `put` and never deleted.
//! - `fetched_at` never moves backwards for a symbol: a write carrying an older timestamp
//!   (a slow refresh finishing after a faster one) keeps the newer timestamp.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use quote_common::Quote;

/// A quote together with the moment the cache stored it.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Latest known quote.
    pub quote: Quote,
    /// When the cache stored the quote.
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Age of the entry relative to `now`; negative ages (clock skew) clamp to zero.
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        (now - self.fetched_at).max(TimeDelta::zero())
    }
}

/// Thread-safe symbol -> entry map.
#[derive(Debug, Default)]
pub struct EntryStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl EntryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the entry for `symbol`, if any.
    pub fn get(&self, symbol: &str) -> Option<CacheEntry> {
        self.entries.lock().get(symbol).cloned()
    }

    /// Replace the entry for `symbol` and return a copy of what was stored.
    pub fn put(&self, symbol: &str, quote: Quote, fetched_at: DateTime<Utc>) -> CacheEntry {
        let mut entries = self.entries.lock();
        let fetched_at = match entries.get(symbol) {
            Some(existing) if existing.fetched_at > fetched_at => existing.fetched_at,
            _ => fetched_at,
        };
        let entry = CacheEntry { quote, fetched_at };
        entries.insert(symbol.to_string(), entry.clone());
        entry
    }

    /// Copy of the whole map.
    pub fn snapshot(&self) -> HashMap<String, CacheEntry> {
        self.entries.lock().clone()
    }

    /// Number of cached symbols.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn get_returns_none_for_unknown_symbol() {
        let store = EntryStore::new();
        assert!(store.get("600519").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn put_replaces_whole_entry() {
        let store = EntryStore::new();
        store.put("600519", Quote::new("600519", "Moutai", 1500.0, 1490.0), ts(0));
        store.put("600519", Quote::new("600519", "Moutai", 1510.0, 1490.0), ts(5));

        let entry = store.get("600519").unwrap();
        assert_eq!(entry.quote.price, 1510.0);
        assert_eq!(entry.fetched_at, ts(5));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn fetched_at_never_moves_backwards() {
        let store = EntryStore::new();
        store.put("000001", Quote::new("000001", "PAB", 10.0, 10.0), ts(10));
        let stored = store.put("000001", Quote::new("000001", "PAB", 11.0, 10.0), ts(3));

        assert_eq!(stored.fetched_at, ts(10));
        assert_eq!(stored.quote.price, 11.0);
    }

    #[test]
    fn snapshot_is_a_detached_copy() {
        let store = EntryStore::new();
        store.put("A", Quote::new("A", "a", 1.0, 1.0), ts(0));
        let snapshot = store.snapshot();
        store.put("B", Quote::new("B", "b", 2.0, 2.0), ts(1));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn age_clamps_negative_skew() {
        let entry = CacheEntry {
            quote: Quote::new("A", "a", 1.0, 1.0),
            fetched_at: ts(10),
        };
        assert_eq!(entry.age(ts(4)), TimeDelta::zero());
        assert_eq!(entry.age(ts(12)), TimeDelta::seconds(2));
    }

    #[test]
    fn concurrent_writers_leave_one_complete_quote() {
        let store = Arc::new(EntryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..200 {
                        let v = f64::from(n * 1000 + i);
                        let quote = Quote::new("X", "x", v, v).with_session(v, v, v);
                        store.put("X", quote, ts(i64::from(i)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let q = store.get("X").unwrap().quote;
        assert_eq!(q.price, q.last_close);
        assert_eq!(q.open, q.price);
        assert_eq!(q.high, q.price);
    }
}
