//! LRU cache of texture keys to backend texture handles.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::render_state::backend::{NativeBackend, RawHandle};

/// Remembers which backend texture a texture key resolved to.
///
/// Misses are cached too, as handle `0` ("untextured"), so an unknown key costs one backend
/// lookup rather than one per segment per frame.
pub struct TextureCache {
    cache: LruCache<String, RawHandle>,
    hits: u64,
    misses: u64,
}

impl TextureCache {
    /// Creates a cache holding at most `capacity` keys (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            hits: 0,
            misses: 0,
        }
    }

    /// The backend handle for `key`, `0` if the backend does not know it.
    pub fn resolve(&mut self, backend: &dyn NativeBackend, key: &str) -> RawHandle {
        if let Some(handle) = self.cache.get(key) {
            self.hits += 1;
            return *handle;
        }
        self.misses += 1;
        let handle = backend.resolve_texture(key);
        if handle == 0 {
            log::debug!("Texture '{key}' not found, drawing untextured");
        }
        self.cache.put(key.to_string(), handle);
        handle
    }

    /// Forgets every resolution, e.g. after a resource reload.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Cached keys.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// `(hits, misses)` since creation.
    pub fn hit_stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_state::backend::HeadlessBackend;

    #[test]
    fn misses_are_cached_as_untextured() {
        let backend = HeadlessBackend::new().with_texture("stone", 4);
        let mut cache = TextureCache::new(8);

        assert_eq!(cache.resolve(&backend, "stone"), 4);
        assert_eq!(cache.resolve(&backend, "stone"), 4);
        assert_eq!(cache.resolve(&backend, "missing"), 0);
        assert_eq!(cache.resolve(&backend, "missing"), 0);
        assert_eq!(cache.hit_stats(), (2, 2));
    }

    #[test]
    fn capacity_evicts_least_recent() {
        let backend = HeadlessBackend::new();
        let mut cache = TextureCache::new(2);
        cache.resolve(&backend, "a");
        cache.resolve(&backend, "b");
        cache.resolve(&backend, "a");
        cache.resolve(&backend, "c");
        assert_eq!(cache.len(), 2);

        cache.resolve(&backend, "a");
        assert_eq!(cache.hit_stats(), (2, 3));
    }
}
