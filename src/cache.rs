//! Fingerprint & Cache Manager
//!
//! Two cache tiers share one backing store: the research tier, keyed by (company, year),
//! and the artifact tier, keyed by the full request fingerprint. Entries are hits only while
//! younger than the configured TTL. Undecodable entries are logged, evicted and treated as
//! misses; cache failures never fail a pipeline run.

pub mod clock;
pub mod fingerprint;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use fingerprint::Fingerprint;
pub use store::{CacheEntry, CacheStore, MemoryCacheStore, SledCacheStore};

use crate::config::{CacheBackend, CacheSettings};
use crate::error::PipelineError;
use crate::model::{ResearchOutput, TestArtifact};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const RESEARCH_PREFIX: &str = "research:";
const ARTIFACT_PREFIX: &str = "test:";

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub corrupt_evictions: u64,
}

/// Entries currently held by one tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntryCounts {
    pub live: usize,
    /// Expired or undecodable, removed by the next purge
    pub stale: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    corrupt: AtomicU64,
}

/// One typed TTL tier over a [`CacheStore`]
pub struct TtlCache<V> {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    counters: Counters,
    _value: PhantomData<fn() -> V>,
}

impl<V> TtlCache<V>
where
    V: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            counters: Counters::default(),
            _value: PhantomData,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh value for `key`, if any
    pub fn get(&self, key: &str) -> Option<V> {
        let entry = match self.store.get(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return self.miss(),
            Err(PipelineError::CacheCorruption { key, reason }) => {
                self.evict_corrupt(&key, &reason);
                return self.miss();
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                return self.miss();
            }
        };

        if !self.is_fresh(&entry) {
            debug!(key = %key, created_at = %entry.created_at, "Cache entry expired");
            return self.miss();
        }

        match serde_json::from_slice::<V>(&entry.payload) {
            Ok(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Err(e) => {
                self.evict_corrupt(key, &e.to_string());
                self.miss()
            }
        }
    }

    /// Store `value` stamped with the current time, overwriting any previous entry
    pub fn put(&self, key: &str, value: &V) -> Result<(), PipelineError> {
        let payload = serde_json::to_vec(value).map_err(|e| {
            PipelineError::Internal(format!("Failed to encode cache payload: {}", e))
        })?;
        self.store.put(CacheEntry {
            key: key.to_string(),
            payload,
            created_at: self.clock.now(),
        })
    }

    pub fn invalidate(&self, key: &str) -> Result<bool, PipelineError> {
        self.store.invalidate(key)
    }

    /// Remove expired or corrupt entries under `prefix`; returns how many were removed
    pub fn purge_expired(&self, prefix: &str) -> Result<usize, PipelineError> {
        let mut removed = 0;
        for key in self.store.keys()? {
            if !key.starts_with(prefix) {
                continue;
            }
            let stale = match self.store.get(&key) {
                Ok(Some(entry)) => !self.is_fresh(&entry),
                Ok(None) => false,
                Err(PipelineError::CacheCorruption { .. }) => true,
                Err(e) => return Err(e),
            };
            if stale && self.store.invalidate(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Live and stale entry counts under `prefix`
    pub fn entry_counts(&self, prefix: &str) -> Result<EntryCounts, PipelineError> {
        let mut counts = EntryCounts::default();
        for key in self.store.keys()? {
            if !key.starts_with(prefix) {
                continue;
            }
            match self.store.get(&key) {
                Ok(Some(entry)) if self.is_fresh(&entry) => counts.live += 1,
                Ok(Some(_)) | Err(PipelineError::CacheCorruption { .. }) => counts.stale += 1,
                Ok(None) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(counts)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            corrupt_evictions: self.counters.corrupt.load(Ordering::Relaxed),
        }
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        // Entries stamped in the future (clock skew) count as age zero
        let age = (self.clock.now() - entry.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        age < self.ttl
    }

    fn miss(&self) -> Option<V> {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn evict_corrupt(&self, key: &str, reason: &str) {
        self.counters.corrupt.fetch_add(1, Ordering::Relaxed);
        warn!(key = %key, reason = %reason, "Evicting corrupt cache entry");
        if let Err(e) = self.store.invalidate(key) {
            warn!(key = %key, error = %e, "Failed to evict corrupt cache entry");
        }
    }
}

/// Research tier plus artifact tier over a shared store
pub struct TieredCache {
    research: TtlCache<ResearchOutput>,
    artifacts: TtlCache<TestArtifact>,
}

impl TieredCache {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            research: TtlCache::new(Arc::clone(&store), Arc::clone(&clock), ttl),
            artifacts: TtlCache::new(store, clock, ttl),
        }
    }

    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(
            Arc::new(MemoryCacheStore::new()),
            Arc::new(SystemClock),
            ttl,
        )
    }

    /// Build the cache described by configuration
    pub fn from_settings(settings: &CacheSettings) -> Result<Self, PipelineError> {
        let store: Arc<dyn CacheStore> = match settings.backend {
            CacheBackend::Memory => Arc::new(MemoryCacheStore::new()),
            CacheBackend::Sled => Arc::new(SledCacheStore::open(&settings.path)?),
        };
        Ok(Self::new(
            store,
            Arc::new(SystemClock),
            Duration::from_secs(settings.ttl_secs),
        ))
    }

    pub fn research_key(normalized_company: &str, year: u16) -> String {
        format!("{}{}:{}", RESEARCH_PREFIX, normalized_company, year)
    }

    pub fn artifact_key(fingerprint: &Fingerprint) -> String {
        format!("{}{}", ARTIFACT_PREFIX, fingerprint.to_hex())
    }

    pub fn get_research(&self, normalized_company: &str, year: u16) -> Option<ResearchOutput> {
        self.research
            .get(&Self::research_key(normalized_company, year))
    }

    pub fn put_research(
        &self,
        normalized_company: &str,
        year: u16,
        research: &ResearchOutput,
    ) -> Result<(), PipelineError> {
        self.research
            .put(&Self::research_key(normalized_company, year), research)
    }

    pub fn get_artifact(&self, fingerprint: &Fingerprint) -> Option<TestArtifact> {
        self.artifacts.get(&Self::artifact_key(fingerprint))
    }

    pub fn put_artifact(
        &self,
        fingerprint: &Fingerprint,
        artifact: &TestArtifact,
    ) -> Result<(), PipelineError> {
        self.artifacts
            .put(&Self::artifact_key(fingerprint), artifact)
    }

    pub fn invalidate_artifact(&self, fingerprint: &Fingerprint) -> Result<bool, PipelineError> {
        self.artifacts.invalidate(&Self::artifact_key(fingerprint))
    }

    pub fn invalidate_research(
        &self,
        normalized_company: &str,
        year: u16,
    ) -> Result<bool, PipelineError> {
        self.research
            .invalidate(&Self::research_key(normalized_company, year))
    }

    /// Sweep both tiers
    pub fn purge_expired(&self) -> Result<usize, PipelineError> {
        Ok(self.research.purge_expired(RESEARCH_PREFIX)?
            + self.artifacts.purge_expired(ARTIFACT_PREFIX)?)
    }

    pub fn research_stats(&self) -> CacheStats {
        self.research.stats()
    }

    pub fn artifact_stats(&self) -> CacheStats {
        self.artifacts.stats()
    }

    pub fn research_entries(&self) -> Result<EntryCounts, PipelineError> {
        self.research.entry_counts(RESEARCH_PREFIX)
    }

    pub fn artifact_entries(&self) -> Result<EntryCounts, PipelineError> {
        self.artifacts.entry_counts(ARTIFACT_PREFIX)
    }
}
