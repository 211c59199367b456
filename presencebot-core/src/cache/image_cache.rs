// File: src/cache/image_cache.rs

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::platforms::ResolvedImages;

/// How long a resolved pair stays usable as a fallback.
pub const DEFAULT_IMAGE_TTL: Duration = Duration::from_secs(30 * 60);

/// Rendered (large, small) URLs, as sent to the resolver.
pub type ImageKey = (Option<String>, Option<String>);

#[derive(Debug, Clone)]
struct CachedImages {
    images: ResolvedImages,
    stored_at: Instant,
}

/// Process-wide cache of resolved image references, shared by every session.
#[derive(Debug)]
pub struct ImageCache {
    entries: DashMap<ImageKey, CachedImages>,
    ttl: Duration,
}

impl ImageCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    pub fn insert(&self, key: ImageKey, images: ResolvedImages) {
        self.entries.insert(
            key,
            CachedImages { images, stored_at: Instant::now() },
        );
    }

    /// Folds a resolver answer into the entry for `key`. Fields the resolver
    /// left empty keep their cached value; the merged pair is returned.
    pub fn merge(&self, key: ImageKey, fetched: ResolvedImages) -> ResolvedImages {
        let cached = self.get(&key).unwrap_or_default();
        let merged = ResolvedImages {
            large: fetched.large.or(cached.large),
            small: fetched.small.or(cached.small),
        };
        if merged.large.is_some() || merged.small.is_some() {
            self.insert(key, merged.clone());
        }
        merged
    }

    /// A fresh entry for `key`; stale entries are dropped on the way.
    pub fn get(&self, key: &ImageKey) -> Option<ResolvedImages> {
        let fresh = self
            .entries
            .get(key)
            .map(|e| (e.stored_at.elapsed() < self.ttl, e.images.clone()));
        match fresh {
            Some((true, images)) => Some(images),
            Some((false, _)) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Removes every expired entry, returning how many went.
    pub fn prune_expired(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.stored_at.elapsed() < ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(l: &str) -> ImageKey {
        (Some(l.to_string()), None)
    }

    fn images(l: &str) -> ResolvedImages {
        ResolvedImages { large: Some(l.to_string()), small: None }
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = ImageCache::new(Duration::from_secs(60));
        cache.insert(key("a"), images("mp:a"));
        assert_eq!(cache.get(&key("a")), Some(images("mp:a")));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get(&key("a")), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn merge_keeps_cached_fields_the_resolver_dropped() {
        let cache = ImageCache::default();
        let key: ImageKey = (Some("https://a".into()), Some("https://b".into()));
        let full = ResolvedImages { large: Some("mp:a".into()), small: Some("mp:b".into()) };
        assert_eq!(cache.merge(key.clone(), full.clone()), full);

        let partial = ResolvedImages { large: None, small: Some("mp:b2".into()) };
        let merged = cache.merge(key.clone(), partial);
        assert_eq!(merged.large.as_deref(), Some("mp:a"));
        assert_eq!(merged.small.as_deref(), Some("mp:b2"));

        assert_eq!(cache.merge(key.clone(), ResolvedImages::default()), merged);
        assert_eq!(cache.get(&key), Some(merged));
    }

    #[test]
    fn empty_answers_are_not_cached() {
        let cache = ImageCache::default();
        let merged = cache.merge(key("x"), ResolvedImages::default());
        assert_eq!(merged, ResolvedImages::default());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn prune_drops_only_stale_entries() {
        let cache = ImageCache::new(Duration::from_secs(60));
        cache.insert(key("old"), images("mp:old"));
        tokio::time::advance(Duration::from_secs(45)).await;
        cache.insert(key("new"), images("mp:new"));
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(cache.prune_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("new")).is_some());
    }
}
