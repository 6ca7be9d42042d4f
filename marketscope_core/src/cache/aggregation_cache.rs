use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use dashmap::DashMap;
use log::{debug, trace};
use moka::sync::Cache;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use crate::core::aggregation::AggregationResult;

use super::clock::{Clock, SystemClock};

struct CacheEntry {
    data: Arc<AggregationResult>,
    stored_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
}

/// Process-wide store of computed aggregations.
///
/// Entries expire lazily: a read older than the TTL (by the injected clock) is a miss
/// and the entry is dropped. Concurrent misses on one key share a single computation.
pub struct AggregationCache {
    entries: Cache<String, Arc<CacheEntry>>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AggregationCache {
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        Self::with_clock(ttl, capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, capacity: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Cache::builder().max_capacity(capacity).build(),
            in_flight: DashMap::new(),
            clock,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache key: aggregation identity plus the canonical filter string.
    pub fn key(table: &str, aggregation: &str, canonical_filters: &str) -> String {
        format!("{}|{}|{}", aggregation, table, canonical_filters)
    }

    pub fn get(&self, key: &str) -> Option<Arc<AggregationResult>> {
        let Some(entry) = self.entries.get(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if self.clock.now().saturating_duration_since(entry.stored_at) > self.ttl {
            trace!("Cache entry {} expired", key);
            self.entries.invalidate(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(Arc::clone(&entry.data))
    }

    pub fn put(&self, key: String, data: Arc<AggregationResult>) {
        let entry = CacheEntry {
            data,
            stored_at: self.clock.now(),
        };
        self.entries.insert(key, Arc::new(entry));
    }

    pub fn clear(&self) {
        debug!("Clearing {} cached aggregations", self.entries.entry_count());
        self.entries.invalidate_all();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.entry_count(),
        }
    }

    /// Returns the cached value for `key`, computing it at most once across
    /// concurrent callers. Errors are returned to every caller that ran `compute`
    /// and are never stored.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: String, compute: F) -> Result<Arc<AggregationResult>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AggregationResult, E>>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }

        let gate = InFlight::enter(&self.in_flight, &key);
        let _lock = gate.lock().await;

        // Another caller may have filled the entry while we waited.
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }

        let result = compute().await.map(Arc::new);

        if let Ok(data) = &result {
            self.put(key.clone(), Arc::clone(data));
        }

        result
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }
}

/// One caller's hold on a key's computation gate. The last holder to leave removes
/// the gate, including when its future is dropped mid-computation.
struct InFlight<'a> {
    gates: &'a DashMap<String, Arc<Mutex<()>>>,
    key: &'a str,
    gate: Option<Arc<Mutex<()>>>,
}

impl<'a> InFlight<'a> {
    fn enter(gates: &'a DashMap<String, Arc<Mutex<()>>>, key: &'a str) -> Self {
        let gate = Arc::clone(
            gates
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );

        Self { gates, key, gate: Some(gate) }
    }

    async fn lock(&self) -> Option<MutexGuard<'_, ()>> {
        match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(gate) = self.gate.take() {
            let ours = Arc::as_ptr(&gate);
            drop(gate);

            // Only the map's own reference left means nobody else waits on it.
            self.gates
                .remove_if(self.key, |_, gate| Arc::as_ptr(gate) == ours && Arc::strong_count(gate) == 1);
        }
    }
}
