//! Result caches.
//!
//! Both caches share one [`BoundedTtlCache`] implementation and differ only in
//! how the lookup key is derived, which is injected as a [`KeyStrategy`]:
//!
//! - [`SemanticResultCache`]: the model's free-form semantic key, canonicalized
//!   by [`KeyNormalizer`]; one-day sliding TTL; can be switched off.
//! - [`StrategyCache`]: [`fingerprint`] of the structured strategy; no LLM call,
//!   no expiry, disk payloads compacted.
//!
//! Each store sits behind a mutex so a cache can be shared between tasks.

mod normalizer;
mod store;

pub use normalizer::KeyNormalizer;
pub use store::{BoundedTtlCache, CacheEntry, CacheStats, DEFAULT_SAVE_INTERVAL, unix_now};

use crate::Result;
use crate::pipeline::QueryOutcome;
use crate::strategy::{SearchStrategy, fingerprint};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Derives the storage key for a cache input.
#[async_trait]
pub trait KeyStrategy: Send + Sync {
    /// What callers look up by.
    type Input: ?Sized + Sync;

    /// Storage key for `input`.
    async fn derive(&self, input: &Self::Input) -> Result<String>;
}

/// Keys canonicalized by the model.
pub struct SemanticKeys {
    normalizer: Arc<KeyNormalizer>,
}

impl SemanticKeys {
    /// Derive keys through `normalizer`.
    pub const fn new(normalizer: Arc<KeyNormalizer>) -> Self {
        Self { normalizer }
    }

    /// The normalizer in use.
    pub const fn normalizer(&self) -> &Arc<KeyNormalizer> {
        &self.normalizer
    }
}

#[async_trait]
impl KeyStrategy for SemanticKeys {
    type Input = str;

    async fn derive(&self, input: &str) -> Result<String> {
        self.normalizer.normalize(input).await
    }
}

/// Keys computed from the strategy itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyFingerprints;

#[async_trait]
impl KeyStrategy for StrategyFingerprints {
    type Input = SearchStrategy;

    async fn derive(&self, input: &SearchStrategy) -> Result<String> {
        Ok(fingerprint(input))
    }
}

/// A [`BoundedTtlCache`] addressed through a [`KeyStrategy`].
pub struct KeyedCache<K, V> {
    keys: K,
    store: Mutex<BoundedTtlCache<V>>,
    enabled: bool,
    sliding_ttl: bool,
}

/// Query outcomes keyed by normalized semantic key.
pub type SemanticResultCache = KeyedCache<SemanticKeys, QueryOutcome>;

/// Query outcomes keyed by strategy fingerprint.
pub type StrategyCache = KeyedCache<StrategyFingerprints, QueryOutcome>;

impl<V> KeyedCache<SemanticKeys, V>
where
    V: Clone + Serialize + DeserializeOwned + Send,
{
    /// Semantic cache over `store`. When `enabled`, the store's file is loaded.
    pub fn semantic(normalizer: Arc<KeyNormalizer>, store: BoundedTtlCache<V>, enabled: bool) -> Self {
        Self::with_policy(SemanticKeys::new(normalizer), store, enabled, true)
    }
}

impl<V> KeyedCache<StrategyFingerprints, V>
where
    V: Clone + Serialize + DeserializeOwned + Send,
{
    /// Fingerprint cache over `store`, loading its file.
    pub fn strategy(store: BoundedTtlCache<V>) -> Self {
        Self::with_policy(StrategyFingerprints, store, true, false)
    }
}

impl<K, V> KeyedCache<K, V>
where
    K: KeyStrategy,
    V: Clone + Serialize + DeserializeOwned + Send,
{
    /// Cache with an explicit policy.
    ///
    /// A sliding TTL refreshes an entry's freshness on every hit.
    pub fn with_policy(keys: K, mut store: BoundedTtlCache<V>, enabled: bool, sliding_ttl: bool) -> Self {
        if enabled {
            store.load();
        }
        Self {
            keys,
            store: Mutex::new(store),
            enabled,
            sliding_ttl,
        }
    }

    /// Whether lookups consult storage.
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Key derivation in use.
    pub const fn keys(&self) -> &K {
        &self.keys
    }

    /// Look up `input`.
    ///
    /// A disabled cache records a miss and returns `None`. A key-derivation
    /// failure also records a miss before the error is returned.
    pub async fn get(&self, input: &K::Input) -> Result<Option<V>> {
        if !self.enabled {
            self.store.lock().await.record_miss();
            return Ok(None);
        }

        let key = match self.keys.derive(input).await {
            Ok(key) => key,
            Err(e) => {
                self.store.lock().await.record_miss();
                return Err(e);
            },
        };

        let mut store = self.store.lock().await;
        let now = unix_now();
        let hit = store.get_at(&key, now);
        if hit.is_some() && self.sliding_ttl {
            store.touch_at(&key, now);
        }
        debug!(key = %key, hit = hit.is_some(), "cache lookup");
        Ok(hit)
    }

    /// Store `value` under `input`'s key. A disabled cache ignores the call.
    ///
    /// Persistence happens opportunistically once the save interval elapses.
    pub async fn set(&self, input: &K::Input, value: V) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let key = self.keys.derive(input).await?;
        let mut store = self.store.lock().await;
        if let Some(evicted) = store.set(key.clone(), value) {
            debug!(key = %key, evicted = %evicted, "cache full; evicted oldest entry");
        }
        store.maybe_save();
        Ok(())
    }

    /// Hit/miss snapshot.
    pub async fn stats(&self) -> CacheStats {
        self.store.lock().await.stats()
    }

    /// Save now. Returns `false` when disabled or when the write fails.
    pub async fn flush(&self) -> bool {
        self.enabled && self.store.lock().await.try_save()
    }

    /// Drop every entry, reset counters and delete the file.
    pub async fn clear(&self) {
        self.store.lock().await.clear();
    }
}
