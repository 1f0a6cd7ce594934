//! Bounded LRU cache for per-item rendered output.
//!
//! Keys are stable item ids. Alongside the cached values the cache tracks the
//! set of ids that are currently "animating" because they were just inserted
//! into the list. Timers that clear that set live in the runtime crate.

use lru::LruCache;
use serde::Serialize;
use std::collections::HashSet;
use std::num::NonZeroUsize;

/// Default number of rendered items kept.
pub const DEFAULT_RENDER_CACHE_CAPACITY: usize = 50;

/// Read-only snapshot of the cache state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenderCacheStats {
    pub cache_size: usize,
    pub max_size: usize,
    pub animating_count: usize,
}

/// LRU map from item id to rendered value.
pub struct RenderCache<V> {
    entries: LruCache<String, V>,
    animating: HashSet<String>,
}

impl<V> std::fmt::Debug for RenderCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.entries.cap())
            .field("animating", &self.animating.len())
            .finish()
    }
}

impl<V> Default for RenderCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_RENDER_CACHE_CAPACITY)
    }
}

fn non_zero_capacity(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or_else(|| {
        log::warn!(target: "ChatList/RenderCache", "Render cache capacity 0 requested, using 1");
        NonZeroUsize::MIN
    })
}

impl<V> RenderCache<V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(non_zero_capacity(capacity)),
            animating: HashSet::new(),
        }
    }

    /// Look up `id`, promoting it to most-recently-used on a hit.
    pub fn get(&mut self, id: &str) -> Option<&V> {
        self.entries.get(id)
    }

    /// Look up `id` without touching its usage position.
    pub fn peek(&self, id: &str) -> Option<&V> {
        self.entries.peek(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains(id)
    }

    /// Insert or replace `id` as the most-recently-used entry.
    ///
    /// Returns the least-recently-used entry if inserting pushed the cache over
    /// capacity. Replacing an existing id never evicts.
    pub fn put(&mut self, id: impl Into<String>, value: V) -> Option<(String, V)> {
        let id = id.into();
        let replacing = self.entries.contains(&id);
        let displaced = self.entries.push(id, value);
        if replacing {
            return None;
        }
        if let Some((evicted, _)) = &displaced {
            log::trace!(target: "ChatList/RenderCache", "Evicted {evicted}");
        }
        displaced
    }

    /// Return the cached value for `id`, rendering and caching it on a miss.
    pub fn get_or_render<F>(&mut self, id: &str, render: F) -> &V
    where
        F: FnOnce() -> V,
    {
        self.entries.get_or_insert(id.to_string(), render)
    }

    pub fn remove(&mut self, id: &str) -> Option<V> {
        self.animating.remove(id);
        self.entries.pop(id)
    }

    /// Drop every entry and animation flag.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.animating.clear();
    }

    /// Change the capacity. Shrinking evicts least-recently-used entries.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.entries.resize(non_zero_capacity(capacity));
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached ids from most- to least-recently-used.
    pub fn ids_by_recency(&self) -> Vec<String> {
        self.entries.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn mark_animating(&mut self, id: impl Into<String>) {
        self.animating.insert(id.into());
    }

    pub fn clear_animating<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in ids {
            self.animating.remove(id.as_ref());
        }
    }

    pub fn clear_all_animating(&mut self) {
        self.animating.clear();
    }

    pub fn is_animating(&self, id: &str) -> bool {
        self.animating.contains(id)
    }

    pub fn animating_count(&self) -> usize {
        self.animating.len()
    }

    pub fn stats(&self) -> RenderCacheStats {
        RenderCacheStats {
            cache_size: self.entries.len(),
            max_size: self.capacity(),
            animating_count: self.animating.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_holds_last_n_ids() {
        let mut cache = RenderCache::new(100);
        for i in 0..200 {
            cache.put(format!("msg-{i}"), i);
        }

        assert_eq!(cache.len(), 100);
        for i in 0..100 {
            assert!(!cache.contains(&format!("msg-{i}")), "msg-{i} should be evicted");
        }
        for i in 100..200 {
            assert!(cache.contains(&format!("msg-{i}")), "msg-{i} should be cached");
        }
    }

    #[test]
    fn test_get_promotes_entry() {
        let mut cache = RenderCache::new(3);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("c", 3);

        assert_eq!(cache.get("a"), Some(&1));
        let evicted = cache.put("d", 4);

        assert_eq!(evicted, Some(("b".to_string(), 2)));
        assert_eq!(cache.ids_by_recency(), vec!["d", "a", "c"]);
    }

    #[test]
    fn test_miss_and_peek_have_no_side_effects() {
        let mut cache = RenderCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);

        assert!(cache.get("zzz").is_none());
        assert_eq!(cache.peek("a"), Some(&1));
        cache.put("c", 3);

        assert!(!cache.contains("a"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_replace_promotes_without_evicting() {
        let mut cache = RenderCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);

        assert!(cache.put("a", 10).is_none());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.ids_by_recency(), vec!["a", "b"]);
        assert_eq!(cache.peek("a"), Some(&10));
    }

    #[test]
    fn test_get_or_render_only_renders_on_miss() {
        let mut cache = RenderCache::new(4);
        let mut renders = 0;

        for _ in 0..3 {
            let value = cache.get_or_render("x", || {
                renders += 1;
                "rendered-x".to_string()
            });
            assert_eq!(value, "rendered-x");
        }
        assert_eq!(renders, 1);
    }

    #[test]
    fn test_shrinking_capacity_evicts_oldest() {
        let mut cache = RenderCache::new(5);
        for i in 0..5 {
            cache.put(i.to_string(), i);
        }
        cache.set_capacity(2);

        assert_eq!(cache.ids_by_recency(), vec!["4", "3"]);
        assert_eq!(cache.stats().max_size, 2);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut cache = RenderCache::new(0);
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn test_animating_set_is_independent_of_entries() {
        let mut cache: RenderCache<u32> = RenderCache::new(2);
        cache.mark_animating("a");
        cache.mark_animating("b");
        assert!(cache.is_animating("a"));
        assert_eq!(cache.stats().animating_count, 2);
        assert_eq!(cache.stats().cache_size, 0);

        cache.clear_animating(["a"]);
        assert!(!cache.is_animating("a"));
        assert!(cache.is_animating("b"));

        cache.clear();
        assert_eq!(cache.animating_count(), 0);
    }
}
