//! Fingerprint-keyed cache in front of the request matcher.
//!
//! Only outcomes the matcher marked cacheable are stored (see
//! [`crate::matching::match_request`]), so a cached value never depends on
//! headers or process state the fingerprint cannot see.
//!
//! Lookups take the read lock; the LRU clock lives in atomics so concurrent
//! hits do not serialize. Inserts, rekeying and flushes take the write lock.
//!
//! Every flush or scheme change starts a new generation. An outcome computed
//! against an older simulation or scheme is refused by [`MatchCache::set_if_current`].

use crate::config::CacheConfig;
use crate::matching::ClosestMiss;
use crate::metrics;
use crate::models::{Fingerprint, RequestDetails, RequestMatcherResponsePair};
use crate::template::CompiledTemplate;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

/// A memoized match outcome. Exactly one of `matching_pair` and
/// `closest_miss` is set; the constructors enforce it.
#[derive(Debug)]
pub struct CachedResponse {
    pub request: RequestDetails,
    pub matching_pair: Option<RequestMatcherResponsePair>,
    pub closest_miss: Option<ClosestMiss>,
    compiled_template: OnceLock<Arc<CompiledTemplate>>,
}

impl CachedResponse {
    pub fn matched(request: RequestDetails, pair: RequestMatcherResponsePair) -> Self {
        Self {
            request,
            matching_pair: Some(pair),
            closest_miss: None,
            compiled_template: OnceLock::new(),
        }
    }

    pub fn missed(request: RequestDetails, closest_miss: ClosestMiss) -> Self {
        Self {
            request,
            matching_pair: None,
            closest_miss: Some(closest_miss),
            compiled_template: OnceLock::new(),
        }
    }

    /// Compiled template for the matched response, compiled on first use.
    pub fn compiled_template<E>(
        &self,
        compile: impl FnOnce() -> Result<CompiledTemplate, E>,
    ) -> Result<Arc<CompiledTemplate>, E> {
        if let Some(compiled) = self.compiled_template.get() {
            return Ok(Arc::clone(compiled));
        }
        let compiled = Arc::new(compile()?);
        // A concurrent caller may have won the race; either value is equivalent.
        let _ = self.compiled_template.set(Arc::clone(&compiled));
        Ok(compiled)
    }

    pub fn has_compiled_template(&self) -> bool {
        self.compiled_template.get().is_some()
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: Arc<CachedResponse>,
    last_accessed: AtomicU64,
}

/// Snapshot of cache counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub size: usize,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
}

/// Entries and the fingerprint scheme they are keyed under, behind one lock so
/// a rekey is never observed half done.
#[derive(Debug)]
struct CacheState {
    entries: HashMap<Fingerprint, CacheEntry>,
    webserver: bool,
    generation: u64,
}

impl CacheState {
    fn fingerprint(&self, request: &RequestDetails) -> Fingerprint {
        request.fingerprint(!self.webserver)
    }
}

pub struct MatchCache {
    config: CacheConfig,
    state: RwLock<CacheState>,
    clock: AtomicU64,
    counters: Counters,
}

impl MatchCache {
    pub fn new(config: CacheConfig) -> Self {
        debug!(
            "Creating match cache: enabled={}, capacity={}",
            config.enabled, config.capacity
        );
        Self {
            config,
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
                webserver: false,
                generation: 0,
            }),
            clock: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Fingerprint of `request` under the current scheme.
    pub fn fingerprint(&self, request: &RequestDetails) -> Fingerprint {
        self.state.read().fingerprint(request)
    }

    /// Look up the cached outcome for `request`. An absent key is a miss.
    pub fn get(&self, request: &RequestDetails) -> Option<Arc<CachedResponse>> {
        if !self.config.enabled {
            return None;
        }

        let state = self.state.read();
        let key = state.fingerprint(request);
        match state.entries.get(&key) {
            Some(entry) => {
                entry.last_accessed.store(self.tick(), Ordering::Relaxed);
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_lookup(true);
                trace!(fingerprint = %key, "cache hit");
                Some(Arc::clone(&entry.value))
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_lookup(false);
                trace!(fingerprint = %key, "cache miss");
                None
            }
        }
    }

    /// Current generation. Capture it before reading the simulation an
    /// outcome is computed from.
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Store an outcome under its request's fingerprint, evicting the least
    /// recently used entry at capacity. Returns the stored value.
    pub fn set(&self, value: CachedResponse) -> Arc<CachedResponse> {
        let value = Arc::new(value);
        if self.config.enabled {
            let mut state = self.state.write();
            self.insert(&mut state, Arc::clone(&value));
        }
        value
    }

    /// Store an outcome only if no flush or scheme change happened since
    /// `generation` was read. Returns `None` when the outcome is stale or the
    /// cache is disabled.
    pub fn set_if_current(
        &self,
        value: CachedResponse,
        generation: u64,
    ) -> Option<Arc<CachedResponse>> {
        if !self.config.enabled {
            return None;
        }
        let mut state = self.state.write();
        if state.generation != generation {
            debug!(
                read = generation,
                current = state.generation,
                "discarding outcome computed before a cache reset"
            );
            return None;
        }
        let value = Arc::new(value);
        self.insert(&mut state, Arc::clone(&value));
        Some(value)
    }

    fn insert(&self, state: &mut CacheState, value: Arc<CachedResponse>) {
        let key = state.fingerprint(&value.request);
        if state.entries.len() >= self.config.capacity && !state.entries.contains_key(&key) {
            self.evict_lru(state);
        }
        state.entries.insert(
            key,
            CacheEntry {
                value,
                last_accessed: AtomicU64::new(self.tick()),
            },
        );
        self.counters.inserts.fetch_add(1, Ordering::Relaxed);
        trace!(fingerprint = %key, "cache insert");
    }

    fn evict_lru(&self, state: &mut CacheState) {
        if let Some(key_to_evict) = state
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed.load(Ordering::Relaxed))
            .map(|(k, _)| *k)
        {
            state.entries.remove(&key_to_evict);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(fingerprint = %key_to_evict, "evicted LRU entry");
        }
    }

    /// Switch between host-inclusive (proxy) and host-exclusive (standalone
    /// server) fingerprints, rekeying every entry in place. Entries that
    /// collide under the new scheme keep the most recently used value.
    pub fn set_webserver(&self, webserver: bool) {
        let mut state = self.state.write();
        if state.webserver == webserver {
            return;
        }
        state.webserver = webserver;
        state.generation += 1;

        let old = std::mem::take(&mut state.entries);
        let before = old.len();
        for (_, entry) in old {
            let key = state.fingerprint(&entry.value.request);
            let keep = match state.entries.get(&key) {
                Some(existing) => {
                    existing.last_accessed.load(Ordering::Relaxed)
                        < entry.last_accessed.load(Ordering::Relaxed)
                }
                None => true,
            };
            if keep {
                state.entries.insert(key, entry);
            }
        }
        debug!(
            webserver,
            before,
            after = state.entries.len(),
            "cache rekeyed"
        );
    }

    /// Switch the fingerprint scheme and drop every entry. Used instead of
    /// [`MatchCache::set_webserver`] when cached outcomes depend on the
    /// destination and would not survive the switch.
    pub fn reset_webserver(&self, webserver: bool) {
        let mut state = self.state.write();
        if state.webserver == webserver {
            return;
        }
        state.webserver = webserver;
        state.generation += 1;
        debug!(webserver, dropped = state.entries.len(), "cache reset for scheme change");
        state.entries.clear();
    }

    pub fn is_webserver(&self) -> bool {
        self.state.read().webserver
    }

    /// Drop every entry. Called whenever the simulation changes.
    pub fn flush(&self) {
        let mut state = self.state.write();
        if !state.entries.is_empty() {
            debug!(entries = state.entries.len(), "cache flushed");
        }
        state.entries.clear();
        state.generation += 1;
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.state.read().entries.contains_key(fingerprint)
    }

    /// Every cached value, in no particular order.
    pub fn entries(&self) -> Vec<(Fingerprint, Arc<CachedResponse>)> {
        self.state
            .read()
            .entries
            .iter()
            .map(|(k, e)| (*k, Arc::clone(&e.value)))
            .collect()
    }

    pub fn size(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            inserts: self.counters.inserts.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            size: self.size(),
        }
    }
}
