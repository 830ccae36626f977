//! Time-bounded result cache with single-flight execution.
//!
//! Entries are keyed by the full query identity (template, predicate and
//! parameters) and stay fresh for a fixed TTL. Concurrent misses on the same
//! key serialize on a per-key lock so the warehouse sees one execution;
//! waiters pick up the stored result once the leader finishes. Failures are
//! never stored, so the next request retries.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use super::types::ResultTable;

/// Default freshness window for cached query results.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Cache statistics for monitoring performance.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    /// Fetches actually run against the warehouse.
    pub executions: AtomicU64,
    /// Entries dropped because their TTL elapsed.
    pub expirations: AtomicU64,
}

impl CacheStats {
    /// Current stats as (hits, misses, executions, expirations).
    pub fn get(&self) -> (u64, u64, u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.executions.load(Ordering::Relaxed),
            self.expirations.load(Ordering::Relaxed),
        )
    }

    /// Hit rate in `0.0..=1.0`.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

struct Entry {
    table: Arc<ResultTable>,
    fetched_at: Instant,
}

pub struct ResultCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    stats: CacheStats,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            stats: CacheStats::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn fresh(&self, key: &str) -> Option<Arc<ResultTable>> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|e| e.fetched_at.elapsed() < self.ttl)
            .map(|e| Arc::clone(&e.table))
    }

    /// Return the cached table for `key`, or run `fetch` and store its
    /// result.
    ///
    /// At most one `fetch` per key runs at a time; callers arriving while it
    /// runs wait and then read the stored table. An `Err` from `fetch` is
    /// returned to its caller only and leaves the cache untouched.
    pub fn get_or_fetch<F, E>(&self, key: &str, fetch: F) -> Result<Arc<ResultTable>, E>
    where
        F: FnOnce() -> Result<ResultTable, E>,
    {
        if let Some(hit) = self.fresh(key) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }

        let lock = {
            let mut inflight = self.inflight.lock();
            Arc::clone(
                inflight
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };

        let result = {
            let _guard = lock.lock();
            // A leader may have filled the entry while we waited.
            if let Some(hit) = self.fresh(key) {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Ok(hit)
            } else {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                self.stats.executions.fetch_add(1, Ordering::Relaxed);
                fetch().map(|table| self.insert(key, table))
            }
        };

        {
            let mut inflight = self.inflight.lock();
            drop(lock);
            // Only the map's handle left: nobody else is queued on this key.
            if inflight.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
                inflight.remove(key);
            }
        }

        result
    }

    fn insert(&self, key: &str, table: ResultTable) -> Arc<ResultTable> {
        let arc = Arc::new(table);
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|k, e| k == key || e.fetched_at.elapsed() < self.ttl);
        let expired = before - entries.len();
        if expired > 0 {
            self.stats
                .expirations
                .fetch_add(expired as u64, Ordering::Relaxed);
        }
        entries.insert(
            key.to_string(),
            Entry {
                table: Arc::clone(&arc),
                fetched_at: Instant::now(),
            },
        );
        arc
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Entries currently held, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Log cache statistics at debug level.
    pub fn log_stats(&self) {
        let (hits, misses, executions, expirations) = self.stats.get();
        tracing::debug!(
            target: "staffing::perf::result_cache",
            hits,
            misses,
            executions,
            expirations,
            hit_rate = format!("{:.1}%", self.stats.hit_rate() * 100.0),
            cached_count = self.len(),
            "Result cache statistics"
        );
    }
}
