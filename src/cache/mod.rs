use ahash::AHasher;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use crate::domain::Reason;

/// Number of shards for the outcome cache.
/// Must be a power of 2 for fast modulo via bitwise AND.
const NUM_SHARDS: usize = 64;

/// A cached deny reason and the instant it stops being valid.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub reason: Reason,
    pub expires_at: Instant,
}

impl CacheEntry {
    /// Remaining lifetime at `now`, zero once expired.
    #[inline]
    fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

/// Process-wide map of fingerprint to cached deny reason.
///
/// Fingerprints are distributed across shards by hash, each guarded by its
/// own lock, so operations on one fingerprint are atomic and never contend
/// with unrelated fingerprints. Expired entries are evicted lazily on read
/// or in bulk by [`OutcomeCache::purge_expired`].
pub struct OutcomeCache {
    shards: Vec<RwLock<HashMap<String, CacheEntry>>>,
}

impl OutcomeCache {
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS)
            .map(|_| RwLock::new(HashMap::new()))
            .collect();

        OutcomeCache { shards }
    }

    /// Look up a live entry, returning the reason and remaining ttl in ms.
    pub fn get(&self, fingerprint: &str) -> Option<(Reason, u64)> {
        self.get_at(fingerprint, Instant::now())
    }

    /// Store a reason for `ttl_ms` milliseconds. A zero ttl stores nothing.
    pub fn set(&self, fingerprint: &str, reason: Reason, ttl_ms: u64) {
        self.set_at(fingerprint, reason, ttl_ms, Instant::now());
    }

    pub(crate) fn get_at(&self, fingerprint: &str, now: Instant) -> Option<(Reason, u64)> {
        let shard = &self.shards[self.shard_index(fingerprint)];

        // Fast path: live entry under the read lock
        {
            let read_guard = shard.read();
            match read_guard.get(fingerprint) {
                None => return None,
                Some(entry) => {
                    let remaining = entry.remaining(now).as_millis() as u64;
                    if remaining > 0 {
                        return Some((entry.reason.clone(), remaining));
                    }
                }
            }
        }

        // Slow path: evict, unless a concurrent set replaced the entry
        let mut write_guard = shard.write();
        if let Some(entry) = write_guard.get(fingerprint) {
            let remaining = entry.remaining(now).as_millis() as u64;
            if remaining > 0 {
                return Some((entry.reason.clone(), remaining));
            }
            write_guard.remove(fingerprint);
        }

        None
    }

    pub(crate) fn set_at(&self, fingerprint: &str, reason: Reason, ttl_ms: u64, now: Instant) {
        if ttl_ms == 0 {
            return;
        }

        let entry = CacheEntry {
            reason,
            expires_at: now + Duration::from_millis(ttl_ms),
        };

        let shard = &self.shards[self.shard_index(fingerprint)];
        shard.write().insert(fingerprint.to_string(), entry);
    }

    /// Remove every expired entry.
    ///
    /// Returns the number of entries evicted.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut evicted = 0;

        for shard in &self.shards {
            let mut write_guard = shard.write();
            let before = write_guard.len();

            write_guard.retain(|_, entry| !entry.remaining(now).is_zero());

            evicted += before - write_guard.len();
        }

        evicted
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }

    #[inline]
    fn shard_index(&self, fingerprint: &str) -> usize {
        let mut hasher = AHasher::default();
        fingerprint.hash(&mut hasher);
        (hasher.finish() as usize) & (NUM_SHARDS - 1)
    }
}

impl Default for OutcomeCache {
    fn default() -> Self {
        OutcomeCache::new()
    }
}

impl std::fmt::Debug for OutcomeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeCache")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn shield_reason() -> Reason {
        Reason::Shield {
            shield_triggered: true,
        }
    }

    #[test]
    fn test_set_and_get() {
        let cache = OutcomeCache::new();
        let now = Instant::now();

        cache.set_at("fp::1", shield_reason(), 1000, now);

        let (reason, ttl) = cache.get_at("fp::1", now + Duration::from_millis(400)).unwrap();
        assert_eq!(reason, shield_reason());
        assert_eq!(ttl, 600);
    }

    #[test]
    fn test_missing_fingerprint() {
        let cache = OutcomeCache::new();
        assert!(cache.get("fp::unknown").is_none());
    }

    #[test]
    fn test_expired_entry_evicted_on_get() {
        let cache = OutcomeCache::new();
        let now = Instant::now();

        cache.set_at("fp::1", shield_reason(), 1000, now);
        assert_eq!(cache.len(), 1);

        assert!(cache.get_at("fp::1", now + Duration::from_millis(1000)).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_zero_ttl_not_stored() {
        let cache = OutcomeCache::new();

        cache.set("fp::1", shield_reason(), 0);

        assert!(cache.is_empty());
        assert!(cache.get("fp::1").is_none());
    }

    #[test]
    fn test_overwrite_extends_entry() {
        let cache = OutcomeCache::new();
        let now = Instant::now();

        cache.set_at("fp::1", shield_reason(), 100, now);
        cache.set_at("fp::1", Reason::Edge, 5000, now);

        let (reason, ttl) = cache.get_at("fp::1", now + Duration::from_millis(200)).unwrap();
        assert_eq!(reason, Reason::Edge);
        assert_eq!(ttl, 4800);
    }

    #[test]
    fn test_purge_expired() {
        let cache = OutcomeCache::new();
        let past = Instant::now() - Duration::from_secs(10);

        cache.set_at("fp::old", shield_reason(), 1000, past);
        cache.set("fp::new", shield_reason(), 60_000);

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("fp::new").is_some());
    }

    #[test]
    fn test_concurrent_access_same_key() {
        let cache = Arc::new(OutcomeCache::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        if i % 2 == 0 {
                            cache.set("fp::shared", shield_reason(), 60_000);
                        } else if let Some((reason, _)) = cache.get("fp::shared") {
                            assert_eq!(reason, shield_reason());
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 1);
    }
}
