//! TTL cache with bounded extension
//!
//! Remembers keys for a limited time. Used by the placement scheduler to
//! cool down stores that recently failed to give up a replica.
//!
//! Expiry rules:
//! - A fresh insert lives for `ttl`.
//! - Re-inserting a live key pushes its expiry out by another `ttl`, but never
//!   past `inserted_at + max_ttl`.
//! - Expired entries are evicted lazily on lookup, or in bulk by [`TtlCache::gc`].

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Default multiplier bounding how far repeated inserts can extend an entry
pub const DEFAULT_MAX_TTL_MULTIPLIER: u32 = 4;

/// Longest lifetime any entry can have; larger TTLs are clamped to it
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// `base + after`, shortened until it is representable
fn deadline(base: Instant, mut after: Duration) -> Instant {
    loop {
        if let Some(at) = base.checked_add(after) {
            return at;
        }
        after /= 2;
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    inserted_at: Instant,
    expires_at: Instant,
}

/// Thread-safe TTL cache keyed by `K`
#[derive(Debug)]
pub struct TtlCache<K> {
    ttl: Duration,
    max_ttl: Duration,
    entries: Mutex<HashMap<K, Entry>>,
}

impl<K> TtlCache<K>
where
    K: Eq + Hash + Copy,
{
    /// Create a cache whose entries live for `ttl` and can be extended up to `max_ttl`
    ///
    /// `max_ttl` is raised to `ttl` if it is smaller. Both are clamped to
    /// [`MAX_CACHE_TTL`].
    pub fn new(ttl: Duration, max_ttl: Duration) -> Self {
        let ttl = ttl.min(MAX_CACHE_TTL);
        Self {
            ttl,
            max_ttl: max_ttl.clamp(ttl, MAX_CACHE_TTL),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Create a cache with `max_ttl = ttl * multiplier`
    pub fn with_multiplier(ttl: Duration, multiplier: u32) -> Self {
        Self::new(ttl, ttl.saturating_mul(multiplier.max(1)))
    }

    /// Base time-to-live of a fresh entry
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Hard ceiling on an entry's lifetime
    pub fn max_ttl(&self) -> Duration {
        self.max_ttl
    }

    /// Insert or extend `key`
    pub fn put(&self, key: K) {
        self.put_at(key, Instant::now());
    }

    /// Insert or extend `key` as of `now`
    pub fn put_at(&self, key: K, now: Instant) {
        let mut entries = self.entries.lock();
        match entries.get_mut(&key) {
            Some(entry) if entry.expires_at > now => {
                let ceiling = deadline(entry.inserted_at, self.max_ttl);
                entry.expires_at = deadline(entry.expires_at, self.ttl).min(ceiling);
            }
            _ => {
                entries.insert(
                    key,
                    Entry {
                        inserted_at: now,
                        expires_at: deadline(now, self.ttl),
                    },
                );
            }
        }
    }

    /// Whether `key` is present and not expired
    pub fn exists(&self, key: K) -> bool {
        self.exists_at(key, Instant::now())
    }

    /// Whether `key` is present and not expired as of `now`
    ///
    /// An expired entry found here is evicted.
    pub fn exists_at(&self, key: K, now: Instant) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            Some(entry) if entry.expires_at > now => true,
            Some(_) => {
                entries.remove(&key);
                false
            }
            None => false,
        }
    }

    /// Expiry instant of a live or not-yet-evicted entry
    pub fn expires_at(&self, key: K) -> Option<Instant> {
        self.entries.lock().get(&key).map(|e| e.expires_at)
    }

    /// Evict every entry expired as of now
    pub fn gc(&self) -> usize {
        self.gc_at(Instant::now())
    }

    /// Evict every entry expired as of `now`, returning how many were dropped
    pub fn gc_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
