//! Result cache: TTL-bounded store of previously resolved queries.
//!
//! Readers treat an entry older than the TTL as absent (lazy expiry); an
//! explicit sweep removes expired entries in bulk. The store is best-effort
//! on the write side: a failed `put` must never fail the resolution that
//! produced the payload, so the trait surfaces no errors at all.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{CacheEntry, SourceLabel};

/// Default TTL for cached search results (30 minutes).
pub const DEFAULT_SEARCH_TTL: Duration = Duration::from_secs(30 * 60);

/// Default bound on entry count before oldest-first eviction.
pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// Maximum entries returned by a similarity scan.
const SIMILAR_LIMIT: usize = 5;

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// Storage boundary for resolved queries.
///
/// The pipeline is agnostic to the medium (in-memory map, browser storage, a
/// remote KV store) as long as these semantics hold: `get` returns absent for
/// missing, expired, and errored reads alike, and `put` swallows storage
/// failures.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up an unexpired entry by exact key.
    async fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Store a payload, overwriting any existing entry for `key`.
    async fn put(&self, key: &str, payload: Value, source: SourceLabel);

    /// Unexpired entries whose key contains `key`, newest first.
    async fn find_similar(&self, key: &str) -> Vec<CacheEntry>;

    /// Remove all entries older than the TTL.
    async fn sweep_expired(&self);

    /// Remove every entry immediately (sign-out / explicit reset).
    async fn clear_all(&self);

    /// Point-in-time statistics.
    async fn stats(&self) -> CacheStats;
}

/// Spawn a background task that sweeps expired entries at a fixed interval.
///
/// Readers already treat expired entries as absent; the sweep just reclaims
/// their memory. Abort the returned handle to stop sweeping.
pub fn spawn_sweeper(
    cache: std::sync::Arc<dyn CacheStore>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            cache.sweep_expired().await;
        }
    })
}

struct Inner {
    entries: HashMap<String, CacheEntry>,
    /// Insertion order for oldest-first eviction. An overwrite re-inserts the
    /// key at the back: a refreshed entry is no longer the oldest.
    order: VecDeque<String>,
}

/// Bounded in-memory [`CacheStore`].
pub struct MemoryCache {
    inner: RwLock<Inner>,
    ttl: Duration,
    max_entries: usize,
}

impl MemoryCache {
    /// Create a cache with the default TTL and size bound.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_SEARCH_TTL, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache with a custom TTL and the default size bound.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_limits(ttl, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache with custom TTL and size bound.
    pub fn with_limits(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            ttl,
            max_entries,
        }
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        let age = Utc::now().signed_duration_since(entry.created_at);
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => age > ttl,
            Err(_) => false,
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let guard = match self.inner.read() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("cache lock poisoned, treating read as miss");
                return None;
            }
        };
        guard
            .entries
            .get(key)
            .filter(|entry| !self.is_expired(entry))
            .cloned()
    }

    async fn put(&self, key: &str, payload: Value, source: SourceLabel) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(key, "cache lock poisoned, dropping write");
                return;
            }
        };

        // created_at is monotonically non-decreasing per key across
        // overwrites even if the wall clock steps backwards.
        let now = Utc::now();
        let created_at = match guard.entries.get(key) {
            Some(prev) if prev.created_at > now => prev.created_at,
            _ => now,
        };

        if guard.entries.contains_key(key) {
            guard.order.retain(|k| k != key);
        } else {
            while guard.entries.len() >= self.max_entries {
                match guard.order.pop_front() {
                    Some(oldest) => {
                        debug!(key = %oldest, "evicting oldest cache entry");
                        guard.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }

        guard.order.push_back(key.to_string());
        guard.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                payload,
                created_at,
                source,
            },
        );
    }

    async fn find_similar(&self, key: &str) -> Vec<CacheEntry> {
        let guard = match self.inner.read() {
            Ok(guard) => guard,
            Err(_) => return Vec::new(),
        };
        let mut matches: Vec<CacheEntry> = guard
            .entries
            .values()
            .filter(|entry| !self.is_expired(entry) && entry.key.contains(key))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matches.truncate(SIMILAR_LIMIT);
        matches
    }

    async fn sweep_expired(&self) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        let expired: Vec<String> = guard
            .entries
            .values()
            .filter(|entry| self.is_expired(entry))
            .map(|entry| entry.key.clone())
            .collect();
        if expired.is_empty() {
            return;
        }
        debug!(count = expired.len(), "sweeping expired cache entries");
        let inner = &mut *guard;
        for key in &expired {
            inner.entries.remove(key);
        }
        let entries = &inner.entries;
        inner.order.retain(|k| entries.contains_key(k));
    }

    async fn clear_all(&self) {
        if let Ok(mut guard) = self.inner.write() {
            guard.entries.clear();
            guard.order.clear();
        }
    }

    async fn stats(&self) -> CacheStats {
        let guard = match self.inner.read() {
            Ok(guard) => guard,
            Err(_) => {
                return CacheStats {
                    total: 0,
                    active: 0,
                    expired: 0,
                    oldest: None,
                    newest: None,
                }
            }
        };
        let total = guard.entries.len();
        let expired = guard
            .entries
            .values()
            .filter(|entry| self.is_expired(entry))
            .count();
        CacheStats {
            total,
            active: total - expired,
            expired,
            oldest: guard.entries.values().map(|e| e.created_at).min(),
            newest: guard.entries.values().map(|e| e.created_at).max(),
        }
    }
}
