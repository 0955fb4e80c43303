//! Match Cache - memoizes the structural matching phase.
//!
//! Only the pure part of selection is cached: which triggers structurally
//! match a given window. Probability rolls and lifecycle gating always run
//! live, so a cache hit cannot change scan results. The cache is an
//! optimization only; any failure falls back to recomputation and is never
//! surfaced to the caller.

use lru::LruCache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use lorebook::{ChatMessage, Scenario};

use crate::selector::StructuralMatch;

/// Size and freshness bounds for the match cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of cached windows.
    pub capacity: NonZeroUsize,
    /// How long a cached result stays valid.
    pub ttl: Duration,
}

impl CacheConfig {
    const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(128) {
        Some(capacity) => capacity,
        None => unreachable!(),
    };
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: Self::DEFAULT_CAPACITY,
            ttl: Duration::from_secs(60),
        }
    }
}

struct CachedMatches {
    matches: Vec<StructuralMatch>,
    inserted_at: Instant,
}

/// Bounded LRU of structural match results with TTL eviction.
///
/// Safe for concurrent use from scans of different conversations; writes
/// are last-writer-wins.
pub struct MatchCache {
    inner: Mutex<LruCache<u64, CachedMatches>>,
    ttl: Duration,
}

impl MatchCache {
    /// Create a cache with the given bounds.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(config.capacity)),
            ttl: config.ttl,
        }
    }

    /// Return the cached matches for `key`, computing and storing them on a
    /// miss or an expired hit.
    pub fn get_or_compute(
        &self,
        key: u64,
        compute: impl FnOnce() -> Vec<StructuralMatch>,
    ) -> Vec<StructuralMatch> {
        {
            let mut inner = self.lock();
            let expired = match inner.get(&key) {
                Some(cached) if cached.inserted_at.elapsed() < self.ttl => {
                    return cached.matches.clone();
                }
                Some(_) => true,
                None => false,
            };
            if expired {
                debug!(key, "cached matches expired");
                inner.pop(&key);
            }
        }

        // Computed outside the lock; concurrent scans of the same window
        // may race and both compute, last writer wins.
        let matches = compute();
        self.lock().put(
            key,
            CachedMatches {
                matches: matches.clone(),
                inserted_at: Instant::now(),
            },
        );
        matches
    }

    /// Number of live cached windows.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop all cached results.
    pub fn clear(&self) {
        self.lock().clear();
    }

    // A poisoned lock only means another scan panicked mid-insert; the map
    // itself is still usable.
    fn lock(&self) -> MutexGuard<'_, LruCache<u64, CachedMatches>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Cache key for one scan: scenario identity and fingerprint plus the
/// message window every entry could possibly see (the global scan depth
/// bounds all per-entry windows).
pub fn scan_key(scenario: &Scenario, messages: &[ChatMessage]) -> u64 {
    let mut hasher = DefaultHasher::new();
    scenario.id.hash(&mut hasher);
    scenario.fingerprint().hash(&mut hasher);

    let start = messages.len().saturating_sub(scenario.settings.scan_depth);
    for message in &messages[start..] {
        message.role.hash(&mut hasher);
        message.content.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorebook::{EntryId, WorldInfoEntry};

    fn matches_for(id: EntryId) -> Vec<StructuralMatch> {
        vec![StructuralMatch {
            entry_id: id,
            matched_keywords: vec!["kingdom".to_string()],
        }]
    }

    #[test]
    fn test_default_config_bounds() {
        let config = CacheConfig::default();
        assert_eq!(config.capacity.get(), 128);
        assert_eq!(config.ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_hit_skips_recompute() {
        let cache = MatchCache::new(CacheConfig::default());
        let id = EntryId::new();

        let mut computes = 0;
        for _ in 0..3 {
            let out = cache.get_or_compute(42, || {
                computes += 1;
                matches_for(id)
            });
            assert_eq!(out[0].entry_id, id);
        }
        assert_eq!(computes, 1);
    }

    #[test]
    fn test_capacity_evicts_lru() {
        let cache = MatchCache::new(CacheConfig {
            capacity: NonZeroUsize::new(2).unwrap(),
            ttl: Duration::from_secs(60),
        });
        let id = EntryId::new();

        cache.get_or_compute(1, || matches_for(id));
        cache.get_or_compute(2, || matches_for(id));
        cache.get_or_compute(3, || matches_for(id));
        assert_eq!(cache.len(), 2);

        // Key 1 was least recently used and must recompute.
        let mut recomputed = false;
        cache.get_or_compute(1, || {
            recomputed = true;
            matches_for(id)
        });
        assert!(recomputed);
    }

    #[test]
    fn test_ttl_expiry_recomputes() {
        let cache = MatchCache::new(CacheConfig {
            capacity: NonZeroUsize::new(8).unwrap(),
            ttl: Duration::ZERO,
        });
        let id = EntryId::new();

        cache.get_or_compute(1, || matches_for(id));
        let mut recomputed = false;
        cache.get_or_compute(1, || {
            recomputed = true;
            matches_for(id)
        });
        assert!(recomputed);
    }

    #[test]
    fn test_scan_key_depends_on_window_and_fingerprint() {
        let mut scenario = Scenario::new("test");
        scenario.add_entry(WorldInfoEntry::new("Kingdom", "lore", ["kingdom"]));

        let a = vec![ChatMessage::user("I visited the kingdom")];
        let b = vec![ChatMessage::user("I visited the castle")];
        assert_ne!(scan_key(&scenario, &a), scan_key(&scenario, &b));

        let key_before = scan_key(&scenario, &a);
        scenario.entries[0].keywords = vec!["castle".to_string()];
        assert_ne!(key_before, scan_key(&scenario, &a));
    }

    #[test]
    fn test_scan_key_ignores_messages_beyond_depth() {
        let mut scenario = Scenario::new("test");
        scenario.settings.scan_depth = 1;

        let a = vec![ChatMessage::user("old"), ChatMessage::user("latest")];
        let b = vec![ChatMessage::user("different old"), ChatMessage::user("latest")];
        assert_eq!(scan_key(&scenario, &a), scan_key(&scenario, &b));
    }

    #[test]
    fn test_clear() {
        let cache = MatchCache::new(CacheConfig::default());
        cache.get_or_compute(1, || matches_for(EntryId::new()));
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
    }
}
