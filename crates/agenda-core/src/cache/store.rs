//! Size-bounded key/value store with optional TTL and JSON persistence.
//!
//! Keys must be normalized by the caller. Eviction is FIFO: once `max_size`
//! entries are held, inserting a new key drops the oldest-inserted entry.
//! Reads do not promote entries (this is not an LRU), and overwriting an
//! existing key keeps its eviction position.
//!
//! Expiry is lazy. With a TTL configured, an entry whose last refresh is older
//! than the TTL is dropped when it is looked up and when the file is loaded;
//! nothing sweeps in the background.
//!
//! ## On-disk format
//!
//! ```json
//! {
//!   "metadata": {"version": "1.0", "timestamp": 1700000000.0, "hits": 3,
//!                "misses": 1, "size": 2, "max_size": 100, "ttl": 86400},
//!   "entries": {"key": {"data": {...}, "timestamp": 1700000000.0,
//!                       "inserted_at": 1699990000.0}}
//! }
//! ```
//!
//! Loading also accepts `"cache"` in place of `"entries"`, a bare
//! `{key: payload}` mapping without metadata, and entries stored as bare
//! payloads without the `data`/`timestamp` wrapper.

use crate::{Error, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const FORMAT_VERSION: &str = "1.0";

/// Default interval between opportunistic saves.
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(300);

/// Current wall-clock time as fractional Unix seconds.
#[must_use]
pub fn unix_now() -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let millis = Utc::now().timestamp_millis() as f64;
    millis / 1000.0
}

/// A stored value with its timestamps (fractional Unix seconds).
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    /// Cached value.
    pub payload: V,
    /// When the key was first written. Overwrites leave it unchanged.
    pub inserted_at: f64,
    /// Last refresh; expiry is measured from here.
    pub touched_at: f64,
}

/// Hit/miss accounting snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries currently held.
    pub size: usize,
    /// Capacity.
    pub max_size: usize,
    /// Lookups that returned a value.
    pub hits: u64,
    /// Lookups that returned nothing.
    pub misses: u64,
    /// `hits / (hits + misses)` formatted as `"75.00%"`.
    pub hit_rate: String,
}

impl CacheStats {
    fn new(size: usize, max_size: usize, hits: u64, misses: u64) -> Self {
        let total = hits + misses;
        #[allow(clippy::cast_precision_loss)]
        let rate = if total > 0 {
            hits as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            size,
            max_size,
            hits,
            misses,
            hit_rate: format!("{rate:.2}%"),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct CacheMetadata {
    version: String,
    timestamp: f64,
    hits: u64,
    misses: u64,
    size: usize,
    max_size: usize,
    ttl: Option<u64>,
}

#[derive(Serialize)]
struct EntryRecord<'a, V> {
    data: &'a V,
    timestamp: f64,
    inserted_at: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry<V> {
    Wrapped {
        data: V,
        timestamp: Option<f64>,
        inserted_at: Option<f64>,
    },
    Bare(V),
}

struct Persistence<V> {
    path: PathBuf,
    save_interval: Duration,
    last_save: f64,
    compact: Option<fn(&V) -> V>,
}

/// Bounded FIFO cache with optional TTL, hit/miss counters and disk persistence.
pub struct BoundedTtlCache<V> {
    entries: HashMap<String, CacheEntry<V>>,
    order: VecDeque<String>,
    max_size: usize,
    ttl: Option<Duration>,
    hits: u64,
    misses: u64,
    persistence: Option<Persistence<V>>,
}

impl<V> BoundedTtlCache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    /// Create an in-memory cache.
    #[must_use]
    pub fn new(max_size: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            max_size,
            ttl,
            hits: 0,
            misses: 0,
            persistence: None,
        }
    }

    /// Back the cache with a JSON file, saved at most once per `save_interval`
    /// by [`maybe_save`](Self::maybe_save).
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>, save_interval: Duration) -> Self {
        self.persistence = Some(Persistence {
            path: path.into(),
            save_interval,
            last_save: unix_now(),
            compact: None,
        });
        self
    }

    /// Shrink payloads before they are written to disk. Memory keeps the full value.
    #[must_use]
    pub fn with_disk_compaction(mut self, compact: fn(&V) -> V) -> Self {
        if let Some(persistence) = self.persistence.as_mut() {
            persistence.compact = Some(compact);
        }
        self
    }

    /// Backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.persistence.as_ref().map(|p| p.path.as_path())
    }

    /// Capacity fixed at construction.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Configured TTL.
    #[must_use]
    pub const fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Number of entries held, expired ones included until they are touched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `key` is present, without touching counters or expiry.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in eviction order, oldest first.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Look up `key` now. See [`get_at`](Self::get_at).
    pub fn get(&mut self, key: &str) -> Option<V> {
        self.get_at(key, unix_now())
    }

    /// Look up `key` as of `now`.
    ///
    /// An expired entry is removed and counted as a miss.
    pub fn get_at(&mut self, key: &str, now: f64) -> Option<V> {
        let expired = match self.entries.get(key) {
            None => {
                self.misses += 1;
                return None;
            },
            Some(entry) => self.is_expired(entry, now),
        };

        if expired {
            debug!(key, "cache entry expired");
            self.remove(key);
            self.misses += 1;
            return None;
        }

        self.hits += 1;
        self.entries.get(key).map(|entry| entry.payload.clone())
    }

    /// Refresh the freshness timestamp of `key`. Returns `false` if absent.
    pub fn touch_at(&mut self, key: &str, now: f64) -> bool {
        self.entries.get_mut(key).is_some_and(|entry| {
            entry.touched_at = now;
            true
        })
    }

    /// Count a lookup that was answered without consulting storage.
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Insert `value` under `key` now. See [`set_at`](Self::set_at).
    pub fn set(&mut self, key: impl Into<String>, value: V) -> Option<String> {
        self.set_at(key, value, unix_now())
    }

    /// Insert `value` under `key` as of `now`.
    ///
    /// Inserting a new key into a full cache evicts exactly one entry, the
    /// oldest inserted, and returns its key. Overwriting keeps the position.
    pub fn set_at(&mut self, key: impl Into<String>, value: V, now: f64) -> Option<String> {
        let key = key.into();
        if self.max_size == 0 {
            return None;
        }

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.payload = value;
            entry.touched_at = now;
            return None;
        }

        // FIFO: reads never promote.
        let evicted = if self.entries.len() >= self.max_size {
            self.evict_oldest()
        } else {
            None
        };

        self.entries.insert(
            key.clone(),
            CacheEntry {
                payload: value,
                inserted_at: now,
                touched_at: now,
            },
        );
        self.order.push_back(key);
        evicted
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(entry.payload)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep_expired_at(&mut self, now: f64) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let ttl = ttl.as_secs_f64();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now - entry.touched_at <= ttl);
        let entries = &self.entries;
        self.order.retain(|key| entries.contains_key(key));
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "dropped expired cache entries");
        }
        removed
    }

    /// Hit/miss snapshot.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats::new(self.entries.len(), self.max_size, self.hits, self.misses)
    }

    /// Empty the cache, reset counters and delete the backing file.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.hits = 0;
        self.misses = 0;

        if let Some(path) = self.path() {
            if path.exists() {
                match fs::remove_file(path) {
                    Ok(()) => debug!(path = %path.display(), "removed cache file"),
                    Err(e) => warn!(path = %path.display(), error = %e, "failed to remove cache file"),
                }
            }
        }
    }

    /// Write the cache to its backing file.
    ///
    /// Creates the parent directory if needed and replaces the file atomically.
    pub fn save(&mut self) -> Result<()> {
        let Some(persistence) = self.persistence.as_ref() else {
            return Err(Error::Storage("cache has no backing file".into()));
        };

        let document = self.to_document(persistence.compact)?;
        let path = persistence.path.clone();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| Error::Storage(format!("Failed to create cache directory: {e}")))?;
            }
        }

        let json = serde_json::to_string_pretty(&document)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .map_err(|e| Error::Storage(format!("Failed to write temp cache file: {e}")))?;

        #[cfg(target_os = "windows")]
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| Error::Storage(format!("Failed to replace cache file: {e}")))?;
        }

        fs::rename(&tmp_path, &path)
            .map_err(|e| Error::Storage(format!("Failed to commit cache file: {e}")))?;

        if let Some(persistence) = self.persistence.as_mut() {
            persistence.last_save = unix_now();
        }
        debug!(path = %path.display(), entries = self.entries.len(), "saved cache");
        Ok(())
    }

    /// [`save`](Self::save), logging and swallowing any failure.
    pub fn try_save(&mut self) -> bool {
        match self.save() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "cache save failed; continuing in memory");
                false
            },
        }
    }

    /// Save if the save interval has elapsed since the last save.
    pub fn maybe_save_at(&mut self, now: f64) -> bool {
        let due = self
            .persistence
            .as_ref()
            .is_some_and(|p| now - p.last_save > p.save_interval.as_secs_f64());
        due && self.try_save()
    }

    /// [`maybe_save_at`](Self::maybe_save_at) using the current time.
    pub fn maybe_save(&mut self) -> bool {
        self.maybe_save_at(unix_now())
    }

    /// Replace the contents with the backing file. See [`load_at`](Self::load_at).
    pub fn load(&mut self) -> bool {
        self.load_at(unix_now())
    }

    /// Replace the contents with the backing file as of `now`.
    ///
    /// Returns `false`, leaving the cache empty, if the file is missing or
    /// unparsable. Expired entries are dropped after loading.
    pub fn load_at(&mut self, now: f64) -> bool {
        let Some(path) = self.path().map(Path::to_path_buf) else {
            return false;
        };
        if !path.exists() {
            debug!(path = %path.display(), "no cache file to load");
            return false;
        }

        match self.read_document(&path, now) {
            Ok(loaded) => {
                info!(path = %path.display(), entries = loaded, "loaded cache");
                true
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load cache; starting empty");
                self.entries.clear();
                self.order.clear();
                false
            },
        }
    }

    fn is_expired(&self, entry: &CacheEntry<V>, now: f64) -> bool {
        self.ttl
            .is_some_and(|ttl| now - entry.touched_at > ttl.as_secs_f64())
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let oldest = self.order.pop_front()?;
        self.entries.remove(&oldest);
        debug!(key = %oldest, "evicted oldest cache entry");
        Some(oldest)
    }

    fn to_document(&self, compact: Option<fn(&V) -> V>) -> Result<serde_json::Value> {
        let mut entries = serde_json::Map::new();
        for key in &self.order {
            let Some(entry) = self.entries.get(key) else {
                continue;
            };
            let compacted;
            let data = match compact {
                Some(f) => {
                    compacted = f(&entry.payload);
                    &compacted
                },
                None => &entry.payload,
            };
            let record = EntryRecord {
                data,
                timestamp: entry.touched_at,
                inserted_at: entry.inserted_at,
            };
            entries.insert(key.clone(), serde_json::to_value(record)?);
        }

        let metadata = CacheMetadata {
            version: FORMAT_VERSION.to_string(),
            timestamp: unix_now(),
            hits: self.hits,
            misses: self.misses,
            size: self.entries.len(),
            max_size: self.max_size,
            ttl: self.ttl.map(|ttl| ttl.as_secs()),
        };

        Ok(serde_json::json!({
            "metadata": serde_json::to_value(metadata)?,
            "entries": entries,
        }))
    }

    fn read_document(&mut self, path: &Path, now: f64) -> Result<usize> {
        let contents = fs::read_to_string(path)?;
        let document: serde_json::Value = serde_json::from_str(&contents)?;
        let serde_json::Value::Object(mut root) = document else {
            return Err(Error::Storage("cache file is not a JSON object".into()));
        };

        let wrapped = root
            .get("entries")
            .or_else(|| root.get("cache"))
            .is_some_and(serde_json::Value::is_object);

        let (raw_entries, metadata) = if wrapped {
            let entries = root
                .remove("entries")
                .or_else(|| root.remove("cache"))
                .unwrap_or_default();
            let metadata = root
                .remove("metadata")
                .map(serde_json::from_value::<CacheMetadata>)
                .transpose()?;
            let serde_json::Value::Object(entries) = entries else {
                return Err(Error::Storage("cache entries are not a JSON object".into()));
            };
            (entries, metadata)
        } else {
            debug!("loading legacy cache file without metadata");
            (root, None)
        };

        let mut loaded: Vec<(String, CacheEntry<V>)> = Vec::with_capacity(raw_entries.len());
        for (key, value) in raw_entries {
            match serde_json::from_value::<StoredEntry<V>>(value) {
                Ok(StoredEntry::Wrapped {
                    data,
                    timestamp,
                    inserted_at,
                }) => {
                    let touched_at = timestamp.unwrap_or(now);
                    loaded.push((
                        key,
                        CacheEntry {
                            payload: data,
                            inserted_at: inserted_at.unwrap_or(touched_at),
                            touched_at,
                        },
                    ));
                },
                Ok(StoredEntry::Bare(payload)) => loaded.push((
                    key,
                    CacheEntry {
                        payload,
                        inserted_at: now,
                        touched_at: now,
                    },
                )),
                Err(e) => warn!(key = %key, error = %e, "skipping unreadable cache entry"),
            }
        }

        // JSON objects do not keep insertion order; rebuild it from timestamps.
        loaded.sort_by(|a, b| a.1.inserted_at.total_cmp(&b.1.inserted_at));

        self.entries.clear();
        self.order.clear();
        for (key, entry) in loaded {
            self.order.push_back(key.clone());
            self.entries.insert(key, entry);
        }
        while self.entries.len() > self.max_size {
            self.evict_oldest();
        }

        if let Some(metadata) = metadata {
            self.hits = metadata.hits;
            self.misses = metadata.misses;
        }

        self.sweep_expired_at(now);
        Ok(self.entries.len())
    }
}
