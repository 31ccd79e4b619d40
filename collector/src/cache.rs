//! TTL-bounded event cache
//!
//! Pull-based outputs are served from this cache instead of the push
//! stream: inputs write each decoded batch under its (subscription,
//! target) key and a scrape reads everything still fresh. Reads are
//! non-destructive, the same entry is served until it either expires or
//! is replaced by a newer batch for the same key.
//!
//! Event entries and per-key metadata expire on independent TTLs; a
//! target that stopped updating drops out of scrapes once its entries
//! age past the event TTL even if its metadata lingers.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Deserialize;
use virta_core::EventMsg;

/// Per-key metadata attached at write time (source, subscription name)
pub type Meta = HashMap<String, String>;

const DEFAULT_TTL: Duration = Duration::from_secs(60);
const DEFAULT_SHARDS: usize = 16;

/// Cache tuning knobs
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheConfig {
    /// How long a written batch stays readable
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// How long per-key metadata stays readable; defaults to `ttl`
    #[serde(with = "humantime_serde::option")]
    pub meta_ttl: Option<Duration>,

    /// Number of lock shards
    pub shards: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            meta_ttl: None,
            shards: DEFAULT_SHARDS,
        }
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct Key {
    subscription: String,
    target: String,
}

#[derive(Debug)]
struct Entry {
    events: Vec<EventMsg>,
    written: Instant,
}

#[derive(Debug)]
struct MetaEntry {
    meta: Meta,
    written: Instant,
}

/// One unexpired cached batch with its key
#[derive(Debug, Clone)]
pub struct CachedBatch {
    /// Subscription the batch was written under
    pub subscription: String,
    /// Target the batch was written under
    pub target: String,
    /// The cached events
    pub events: Vec<EventMsg>,
}

/// Sharded TTL cache keyed by (subscription, target)
///
/// Events and metadata live in separate shard sets so metadata lookups
/// never contend with batch writes.
#[derive(Debug)]
pub struct TtlCache {
    ttl: Duration,
    meta_ttl: Duration,
    shards: Vec<RwLock<HashMap<Key, Entry>>>,
    meta_shards: Vec<RwLock<HashMap<Key, MetaEntry>>>,
}

impl TtlCache {
    /// Build a cache from its configuration
    pub fn new(cfg: CacheConfig) -> Self {
        let shard_count = cfg.shards.max(1);
        Self {
            ttl: cfg.ttl,
            meta_ttl: cfg.meta_ttl.unwrap_or(cfg.ttl),
            shards: (0..shard_count).map(|_| RwLock::default()).collect(),
            meta_shards: (0..shard_count).map(|_| RwLock::default()).collect(),
        }
    }

    fn shard_index(&self, key: &Key) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    fn shard(&self, key: &Key) -> &RwLock<HashMap<Key, Entry>> {
        &self.shards[self.shard_index(key)]
    }

    fn meta_shard(&self, key: &Key) -> &RwLock<HashMap<Key, MetaEntry>> {
        &self.meta_shards[self.shard_index(key)]
    }

    /// Replace the cached batch for a (subscription, target) key
    ///
    /// Also refreshes the key's metadata. Replacement is atomic per key;
    /// a concurrent read sees either the old batch or the new one,
    /// never a mix.
    pub fn write(&self, subscription: &str, target: &str, events: Vec<EventMsg>, meta: Meta) {
        let key = Key {
            subscription: subscription.to_string(),
            target: target.to_string(),
        };
        let now = Instant::now();
        self.meta_shard(&key).write().insert(
            key.clone(),
            MetaEntry {
                meta,
                written: now,
            },
        );
        self.shard(&key).write().insert(
            key,
            Entry {
                events,
                written: now,
            },
        );
    }

    /// Read every unexpired batch together with its key
    ///
    /// Entries exactly at the TTL boundary are excluded. The read does
    /// not consume entries; repeating it yields the same result until
    /// entries expire or are replaced.
    pub fn read_entries(&self) -> Vec<CachedBatch> {
        let now = Instant::now();
        let mut out = Vec::new();
        for shard in &self.shards {
            let shard = shard.read();
            for (key, entry) in shard.iter() {
                if now.duration_since(entry.written) < self.ttl {
                    out.push(CachedBatch {
                        subscription: key.subscription.clone(),
                        target: key.target.clone(),
                        events: entry.events.clone(),
                    });
                }
            }
        }
        out
    }

    /// Read every unexpired batch, grouped by subscription name
    pub fn read_all(&self) -> HashMap<String, Vec<EventMsg>> {
        let mut out: HashMap<String, Vec<EventMsg>> = HashMap::new();
        for batch in self.read_entries() {
            out.entry(batch.subscription).or_default().extend(batch.events);
        }
        out
    }

    /// Look up unexpired metadata for a (subscription, target) key
    pub fn get_meta(&self, subscription: &str, target: &str) -> Option<Meta> {
        let key = Key {
            subscription: subscription.to_string(),
            target: target.to_string(),
        };
        let shard = self.meta_shard(&key).read();
        let entry = shard.get(&key)?;
        if Instant::now().duration_since(entry.written) < self.meta_ttl {
            Some(entry.meta.clone())
        } else {
            None
        }
    }

    /// Drop metadata entries past their TTL, returning how many were removed
    pub fn delete_expired_meta(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for shard in &self.meta_shards {
            let mut shard = shard.write();
            let before = shard.len();
            shard.retain(|_, entry| now.duration_since(entry.written) < self.meta_ttl);
            removed += before - shard.len();
        }
        removed
    }

    /// Drop event entries past their TTL, returning how many were removed
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for shard in &self.shards {
            let mut shard = shard.write();
            let before = shard.len();
            shard.retain(|_, entry| now.duration_since(entry.written) < self.ttl);
            removed += before - shard.len();
        }
        removed
    }

    /// Number of cached (subscription, target) entries, expired included
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    /// Whether the cache holds no entries at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
