//! Response cache for aggregate search results.
//!
//! Caches final [`AggregateResponse`]s keyed by a stable hash of every
//! request parameter that changes the output (normalised query, limit,
//! offset and feature flags). Entries are immutable once written and are
//! treated as absent once `now - created_at >= ttl`.
//!
//! The backing store is pluggable through [`CacheStore`]:
//! [`MemoryCacheStore`] (mutex-guarded map, the default) or
//! [`MokaCacheStore`]. Both evict the single oldest entry before inserting
//! into a full cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::config::{CacheBackend, CacheConfig};
use crate::types::AggregateResponse;

/// Stable cache key: BLAKE3 hash of the normalised request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key for one request.
    ///
    /// The query is trimmed, lowercased and whitespace-collapsed, so
    /// `"  Crowd   Counting "` and `"crowd counting"` share a key.
    pub fn new(
        query: &str,
        limit: usize,
        offset: usize,
        include_code_sources: bool,
        enable_cross_reference: bool,
    ) -> Self {
        let normalised = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ");

        let mut hasher = blake3::Hasher::new();
        hasher.update(normalised.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(limit as u64).to_le_bytes());
        hasher.update(&(offset as u64).to_le_bytes());
        hasher.update(&[u8::from(include_code_sources), u8::from(enable_cross_reference)]);
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A cached response with its creation time and lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cached payload.
    pub response: Arc<AggregateResponse>,
    /// When the entry was written.
    pub created_at: Instant,
    /// How long the entry stays valid.
    pub ttl: Duration,
}

impl CacheEntry {
    /// A fresh entry.
    pub fn new(response: AggregateResponse, ttl: Duration) -> Self {
        Self {
            response: Arc::new(response),
            created_at: Instant::now(),
            ttl,
        }
    }

    /// Whether the entry must no longer be served.
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

/// Backing store for [`ResponseCache`].
///
/// Implementations must make each call atomic with respect to concurrent
/// callers: a reader never observes a partially written entry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up an entry, expired or not.
    async fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

    /// Insert or replace an entry, evicting the oldest one first when the
    /// store is full.
    async fn put(&self, key: CacheKey, entry: CacheEntry);

    /// Remove the entry under `key` only if it was created at or before
    /// `created_at`. A newer entry written concurrently is kept.
    ///
    /// Returns whether an entry was removed.
    async fn remove_if_older(&self, key: &CacheKey, created_at: Instant) -> bool;

    /// Evict the entry with the oldest creation time, returning its key.
    async fn evict_oldest(&self) -> Option<CacheKey>;

    /// Number of stored entries.
    async fn len(&self) -> usize;

    /// Whether the store is empty.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn oldest_key<'a>(
    entries: impl Iterator<Item = (&'a CacheKey, &'a CacheEntry)>,
) -> Option<CacheKey> {
    entries
        .min_by_key(|(_, entry)| entry.created_at)
        .map(|(key, _)| key.clone())
}

// ── In-process map ────────────────────────────────────────────

/// Mutex-guarded in-process map.
#[derive(Debug)]
pub struct MemoryCacheStore {
    max_entries: usize,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryCacheStore {
    /// A store holding at most `max_entries` responses.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        // Entries are replaced whole, so a poisoned map is still consistent.
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.lock().get(key).cloned()
    }

    async fn put(&self, key: CacheKey, entry: CacheEntry) {
        let mut entries = self.lock();
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            if let Some(oldest) = oldest_key(entries.iter()) {
                entries.remove(&oldest);
                tracing::debug!(key = oldest.as_str(), "evicted oldest cache entry");
            }
        }
        entries.insert(key, entry);
    }

    async fn remove_if_older(&self, key: &CacheKey, created_at: Instant) -> bool {
        let mut entries = self.lock();
        if entries.get(key).is_some_and(|e| e.created_at <= created_at) {
            entries.remove(key);
            return true;
        }
        false
    }

    async fn evict_oldest(&self) -> Option<CacheKey> {
        let mut entries = self.lock();
        let oldest = oldest_key(entries.iter())?;
        entries.remove(&oldest);
        Some(oldest)
    }

    async fn len(&self) -> usize {
        self.lock().len()
    }
}

// ── moka ──────────────────────────────────────────────────────

/// [`moka`]-backed store.
///
/// moka's own TTL expires entries in the background; oldest-first eviction
/// on insert is layered on top so both stores behave the same.
pub struct MokaCacheStore {
    max_entries: usize,
    cache: moka::future::Cache<CacheKey, CacheEntry>,
    /// Serialises the capacity check with the insert.
    write_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for MokaCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaCacheStore")
            .field("max_entries", &self.max_entries)
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl MokaCacheStore {
    /// A store holding at most `max_entries` responses for at most `ttl`.
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let max_entries = max_entries.max(1);
        let mut builder = moka::future::Cache::builder().max_capacity(max_entries as u64 + 1);
        if !ttl.is_zero() {
            builder = builder.time_to_live(ttl);
        }
        Self {
            max_entries,
            cache: builder.build(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn oldest(&self) -> Option<CacheKey> {
        self.cache
            .iter()
            .min_by_key(|(_, entry)| entry.created_at)
            .map(|(key, _)| (*key).clone())
    }
}

#[async_trait]
impl CacheStore for MokaCacheStore {
    async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.cache.get(key).await
    }

    async fn put(&self, key: CacheKey, entry: CacheEntry) {
        let _guard = self.write_lock.lock().await;
        self.cache.run_pending_tasks().await;
        if !self.cache.contains_key(&key) && self.cache.entry_count() >= self.max_entries as u64 {
            if let Some(oldest) = self.oldest() {
                self.cache.invalidate(&oldest).await;
                tracing::debug!(key = oldest.as_str(), "evicted oldest cache entry");
            }
        }
        self.cache.insert(key, entry).await;
    }

    async fn remove_if_older(&self, key: &CacheKey, created_at: Instant) -> bool {
        let _guard = self.write_lock.lock().await;
        let stale = self
            .cache
            .get(key)
            .await
            .is_some_and(|e| e.created_at <= created_at);
        if stale {
            self.cache.invalidate(key).await;
        }
        stale
    }

    async fn evict_oldest(&self) -> Option<CacheKey> {
        let _guard = self.write_lock.lock().await;
        let oldest = self.oldest()?;
        self.cache.invalidate(&oldest).await;
        Some(oldest)
    }

    async fn len(&self) -> usize {
        self.cache.run_pending_tasks().await;
        usize::try_from(self.cache.entry_count()).unwrap_or(usize::MAX)
    }
}

// ── Response cache ────────────────────────────────────────────

/// TTL cache of aggregate responses over a pluggable [`CacheStore`].
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache").field("ttl", &self.ttl).finish()
    }
}

impl ResponseCache {
    /// A cache over `store` whose entries live for `ttl`. A zero TTL
    /// disables caching.
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Build the configured backend.
    pub fn from_config(config: &CacheConfig) -> Self {
        let ttl = Duration::from_secs(config.ttl_seconds);
        let store: Arc<dyn CacheStore> = match config.backend {
            CacheBackend::Memory => Arc::new(MemoryCacheStore::new(config.max_entries)),
            CacheBackend::Moka => Arc::new(MokaCacheStore::new(config.max_entries, ttl)),
        };
        Self::new(store, ttl)
    }

    /// Whether caching is active.
    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// The cached response for `key`, unless missing or expired.
    pub async fn get(&self, key: &CacheKey) -> Option<AggregateResponse> {
        if !self.is_enabled() {
            return None;
        }
        let entry = self.store.get(key).await?;
        if entry.is_expired() {
            tracing::debug!(key = key.as_str(), "cache entry expired");
            self.store.remove_if_older(key, entry.created_at).await;
            return None;
        }
        tracing::debug!(key = key.as_str(), "cache hit");
        Some(entry.response.as_ref().clone())
    }

    /// Store `response` under `key`.
    pub async fn put(&self, key: CacheKey, response: AggregateResponse) {
        if !self.is_enabled() {
            return;
        }
        self.store.put(key, CacheEntry::new(response, self.ttl)).await;
    }

    /// Number of stored entries, including expired ones not yet removed.
    pub async fn len(&self) -> usize {
        self.store.len().await
    }

    /// Whether the cache holds nothing.
    pub async fn is_empty(&self) -> bool {
        self.store.is_empty().await
    }
}
