//! TTL Read Cache
//!
//! Time-boxed cache for store reads, keyed by (tab, range). Concurrent misses
//! for the same key coalesce through a refill lock with a double-check, so at
//! most one fetch is in flight per cache at a time. Writes invalidate every
//! cached read covering the written tab.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};

type Rows = Vec<Vec<String>>;

struct Entry {
    rows: Rows,
    fetched_at: Instant,
}

/// Shared TTL cache for (tab, range) reads
pub struct TtlCache {
    ttl: Duration,
    entries: Mutex<HashMap<(String, String), Entry>>,
    refill: Mutex<()>,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            refill: Mutex::new(()),
        }
    }

    /// Fresh cached rows for the key, if any
    pub async fn get(&self, tab: &str, range: &str) -> Option<Rows> {
        let entries = self.entries.lock().await;
        let entry = entries.get(&(tab.to_string(), range.to_string()))?;
        if entry.fetched_at.elapsed() < self.ttl {
            Some(entry.rows.clone())
        } else {
            None
        }
    }

    /// Serialize refills. The caller re-checks `get` after acquiring the
    /// guard; a concurrent requester that lost the race finds the entry
    /// populated and never issues its own fetch.
    pub async fn refill_lock(&self) -> MutexGuard<'_, ()> {
        self.refill.lock().await
    }

    /// Store rows fetched for the key
    pub async fn insert(&self, tab: &str, range: &str, rows: Rows) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            (tab.to_string(), range.to_string()),
            Entry {
                rows,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Drop every cached read covering the tab (called on any write to it)
    pub async fn invalidate_tab(&self, tab: &str) {
        let mut entries = self.entries.lock().await;
        entries.retain(|(cached_tab, _), _| cached_tab != tab);
    }
}
