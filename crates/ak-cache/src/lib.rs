// SPDX-License-Identifier: MIT OR Apache-2.0
//! A bounded, insertion-ordered map with a strict size ceiling and optional
//! per-entry TTL.
//!
//! `max_size` is a hard cap: once reached, inserting a new key evicts the
//! oldest still-present key before the insert completes. TTL, if set, is
//! checked lazily on read — a stale entry is deleted and reported absent
//! rather than returned. This is the shape shared by the approval token
//! store, idempotency caches, and rate-limiter counters: unbounded workloads
//! can never exhaust memory.

#![deny(unsafe_code)]

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// A bounded LRU/TTL map.
pub struct BoundedCache<K, V> {
    max_size: usize,
    ttl: Option<Duration>,
    map: HashMap<K, Entry<V>>,
    order: VecDeque<K>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a cache with no TTL; entries only leave via eviction.
    pub fn new(max_size: usize) -> Self {
        Self { max_size, ttl: None, map: HashMap::new(), order: VecDeque::new() }
    }

    /// Create a cache with a TTL applied lazily on read.
    pub fn with_ttl(max_size: usize, ttl: Duration) -> Self {
        Self { max_size, ttl: Some(ttl), map: HashMap::new(), order: VecDeque::new() }
    }

    /// Insert or overwrite `key`, resetting its insertion order to newest.
    /// If this pushes the map past `max_size`, the oldest entry is evicted.
    pub fn set(&mut self, key: K, value: V) {
        if self.map.contains_key(&key) {
            self.order.retain(|k| k != &key);
        }
        self.map.insert(key.clone(), Entry { value, inserted_at: Instant::now() });
        self.order.push_back(key);
        while self.order.len() > self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.map.remove(&oldest);
            } else {
                break;
            }
        }
    }

    /// Look up `key`. A TTL-expired entry is deleted and reported absent.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.is_stale(key) {
            self.remove(key);
            return None;
        }
        self.map.get(key).map(|e| &e.value)
    }

    /// Remove `key` unconditionally, returning its value if present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.order.retain(|k| k != key);
        self.map.remove(key).map(|e| e.value)
    }

    /// Scan every entry and delete those past their TTL. Returns the number
    /// of entries removed.
    pub fn purge_expired(&mut self) -> usize {
        let Some(ttl) = self.ttl else { return 0 };
        let now = Instant::now();
        let stale: Vec<K> = self
            .map
            .iter()
            .filter(|(_, e)| now.duration_since(e.inserted_at) > ttl)
            .map(|(k, _)| k.clone())
            .collect();
        let removed = stale.len();
        for k in stale {
            self.order.retain(|o| o != &k);
            self.map.remove(&k);
        }
        removed
    }

    fn is_stale(&self, key: &K) -> bool {
        match (self.ttl, self.map.get(key)) {
            (Some(ttl), Some(entry)) => entry.inserted_at.elapsed() > ttl,
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
