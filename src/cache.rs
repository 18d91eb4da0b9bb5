//! A generic LRU cache with populate/expire callbacks.
//!
//! The original agent built its session and device-info caches on top of a
//! Python `LRU` dict subclass with `populate()`/`expire()` hooks, using a
//! sentinel `DONT_POPULATE`/`DONT_EXPIRE` exception to opt a particular key
//! in or out of the normal behavior. Rust has no equivalent sentinel
//! idiom, so the callback contract is expressed directly as enums: a
//! populate callback returns [`Populate::Value`] or [`Populate::Skip`], and
//! an eviction callback returns [`Expire::Evict`] or [`Expire::Keep`] (the
//! entry is touched again instead of dropped).

use std::collections::HashMap;
use tokio::time::Instant;

/// Outcome of a populate callback invoked on a cache miss.
pub enum Populate<V> {
    Value(V),
    Skip,
}

/// Outcome of an expire callback invoked when an entry is evicted.
pub enum Expire {
    Evict,
    Keep,
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_touched: Instant,
    /// Monotonically increasing sequence number; the smallest among
    /// currently-held entries is the next eviction candidate.
    seq: u64,
}

/// A capacity-bounded, least-recently-used cache.
///
/// Unlike a bare `HashMap`, lookups that miss can be satisfied by a
/// caller-supplied populate function, and evictions (whether from capacity
/// pressure or `maximum_age` expiry) run through an expire function that
/// can veto the eviction for a key still considered busy.
pub struct LruCache<K, V> {
    capacity: usize,
    entries: HashMap<K, Entry<V>>,
    next_seq: u64,
    maximum_age: Option<std::time::Duration>,
}

impl<K, V> LruCache<K, V>
where
    K: std::hash::Hash + Eq + Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            next_seq: 0,
            maximum_age: None,
        }
    }

    pub fn with_maximum_age(mut self, age: std::time::Duration) -> Self {
        self.maximum_age = Some(age);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the value for `key` if present, without affecting recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Returns the value for `key`, touching it as most-recently-used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_touched = Instant::now();
            entry.seq = seq;
            Some(&entry.value)
        } else {
            None
        }
    }

    /// Fetches `key`, calling `populate` on a miss. A populate result of
    /// [`Populate::Skip`] leaves the cache untouched and returns `None`
    /// (mirrors `DONT_POPULATE`: the caller handled the miss itself, e.g.
    /// by reporting a not-found error, and nothing should be cached).
    pub fn get_or_populate<F>(&mut self, key: &K, populate: F) -> Option<&V>
    where
        F: FnOnce() -> Populate<V>,
    {
        if !self.entries.contains_key(key) {
            match populate() {
                Populate::Value(v) => {
                    self.insert(key.clone(), v);
                }
                Populate::Skip => return None,
            }
        }
        self.get(key)
    }

    /// Inserts or replaces a value, evicting the least-recently-used entry
    /// first if at capacity. Returns any entry evicted to make room, so the
    /// caller can still run its own expire callback against it (the
    /// signature-level `expire` hook lives on [`Self::evict_expired`] and
    /// [`Self::remove`], not here, since insertion never needs veto power
    /// over its own eviction).
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        let now = Instant::now();
        let seq = self.next_seq;
        self.next_seq += 1;

        let evicted = if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.lru_key().map(|k| {
                let e = self.entries.remove(&k).expect("key came from this map");
                (k, e.value)
            })
        } else {
            None
        };

        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                last_touched: now,
                seq,
            },
        );
        evicted
    }

    fn lru_key(&self) -> Option<K> {
        self.entries
            .iter()
            .min_by_key(|(_, e)| e.seq)
            .map(|(k, _)| k.clone())
    }

    /// Removes `key` unconditionally, running `expire` first; an
    /// [`Expire::Keep`] veto re-touches the entry and leaves it cached.
    pub fn remove<F>(&mut self, key: &K, expire: F) -> Option<V>
    where
        F: FnOnce(&V) -> Expire,
    {
        let entry = self.entries.get(key)?;
        match expire(&entry.value) {
            Expire::Keep => {
                self.entries.get_mut(key).unwrap().last_touched = Instant::now();
                None
            }
            Expire::Evict => self.entries.remove(key).map(|e| e.value),
        }
    }

    /// Sweeps entries older than `maximum_age`, running `expire` on each
    /// candidate. Entries whose expire callback vetoes eviction are left in
    /// place and re-checked on the next sweep.
    pub fn evict_expired<F>(&mut self, mut expire: F) -> Vec<(K, V)>
    where
        F: FnMut(&V) -> Expire,
    {
        let Some(max_age) = self.maximum_age else {
            return Vec::new();
        };
        let now = Instant::now();
        let stale: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, e)| now.duration_since(e.inserted_at) >= max_age)
            .map(|(k, _)| k.clone())
            .collect();

        let mut evicted = Vec::new();
        for key in stale {
            if let Some(v) = self.remove(&key, &mut expire) {
                evicted.push((key, v));
            }
        }
        evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, e)| (k, &e.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn insert_and_get_round_trips() {
        let mut cache: LruCache<&str, i32> = LruCache::new(2);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(&1));
    }

    #[tokio::test]
    async fn eviction_drops_the_least_recently_used_entry() {
        let mut cache: LruCache<&str, i32> = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.get(&"a");
        let evicted = cache.insert("c", 3);
        assert_eq!(evicted, Some(("b", 2)));
        assert!(cache.contains(&"a"));
        assert!(cache.contains(&"c"));
    }

    #[tokio::test]
    async fn populate_skip_leaves_cache_empty() {
        let mut cache: LruCache<&str, i32> = LruCache::new(2);
        let result = cache.get_or_populate(&"missing", || Populate::Skip);
        assert!(result.is_none());
        assert!(!cache.contains(&"missing"));
    }

    #[tokio::test]
    async fn expire_veto_keeps_the_entry() {
        let mut cache: LruCache<&str, i32> = LruCache::new(2);
        cache.insert("a", 1);
        let removed = cache.remove(&"a", |_| Expire::Keep);
        assert!(removed.is_none());
        assert!(cache.contains(&"a"));
    }

    #[tokio::test]
    async fn expire_evict_removes_the_entry() {
        let mut cache: LruCache<&str, i32> = LruCache::new(2);
        cache.insert("a", 1);
        let removed = cache.remove(&"a", |_| Expire::Evict);
        assert_eq!(removed, Some(1));
        assert!(!cache.contains(&"a"));
    }

    #[tokio::test(start_paused = true)]
    async fn evict_expired_sweeps_only_entries_past_maximum_age() {
        let mut cache: LruCache<&str, i32> = LruCache::new(8).with_maximum_age(Duration::from_secs(60));
        cache.insert("a", 1);
        tokio::time::advance(Duration::from_secs(61)).await;
        cache.insert("b", 2);

        let evicted = cache.evict_expired(|_| Expire::Evict);
        assert_eq!(evicted, vec![("a", 1)]);
        assert!(!cache.contains(&"a"));
        assert!(cache.contains(&"b"));
    }

    #[tokio::test(start_paused = true)]
    async fn evict_expired_veto_keeps_stale_entry_for_next_sweep() {
        let mut cache: LruCache<&str, i32> = LruCache::new(8).with_maximum_age(Duration::from_secs(60));
        cache.insert("a", 1);
        tokio::time::advance(Duration::from_secs(61)).await;

        let evicted = cache.evict_expired(|_| Expire::Keep);
        assert!(evicted.is_empty());
        assert!(cache.contains(&"a"));
    }
}
