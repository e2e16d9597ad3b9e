//! Resource Cache
//!
//! Holds the collections fetched by the latest load, keyed by
//! `(kind, scope)`, each stamped with its fetch instant.
//!
//! A load runs as a generation: [`ResourceCache::start_generation`] sets the
//! current collections aside, the loader fetches (or revives) what it needs,
//! and [`ResourceCache::finish_generation`] discards whatever the new load
//! did not touch. Non-volatile collections younger than the TTL are revived
//! instead of refetched. A TTL of zero or less means nothing is ever fresh.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::resource::{FetchScope, Resource, ResourceCollection, ResourceKind};

type CacheKey = (ResourceKind, FetchScope);

/// Cache metrics for monitoring
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    /// Collections reused from the previous load
    pub hits: u64,
    /// Collections fetched
    pub misses: u64,
    /// Collections dropped because the last load did not touch them
    pub discarded: u64,
}

impl CacheMetrics {
    /// Get hit rate as a fraction (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone)]
struct CachedCollection {
    collection: ResourceCollection,
    fetched_at: Instant,
}

/// In-process store of fetched resource collections.
#[derive(Debug)]
pub struct ResourceCache {
    /// Freshness window in milliseconds
    ttl_ms: i64,

    /// Collections of the current (or last completed) load
    entries: BTreeMap<CacheKey, CachedCollection>,

    /// Collections of earlier loads, candidates for revival
    previous: BTreeMap<CacheKey, CachedCollection>,

    /// When the last load completed
    loaded_at: Option<Instant>,

    metrics: CacheMetrics,
}

impl ResourceCache {
    /// Create an empty cache with the given TTL in milliseconds.
    pub fn new(ttl_ms: i64) -> Self {
        Self {
            ttl_ms,
            entries: BTreeMap::new(),
            previous: BTreeMap::new(),
            loaded_at: None,
            metrics: CacheMetrics::default(),
        }
    }

    /// The configured TTL in milliseconds.
    pub fn ttl_ms(&self) -> i64 {
        self.ttl_ms
    }

    fn ttl(&self) -> Option<Duration> {
        u64::try_from(self.ttl_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    fn is_within_ttl(&self, since: Instant) -> bool {
        self.ttl().is_some_and(|ttl| since.elapsed() < ttl)
    }

    /// Whether the last completed load is still within the TTL.
    pub fn is_fresh(&self) -> bool {
        self.loaded_at.is_some_and(|at| self.is_within_ttl(at))
    }

    /// When the last load completed.
    pub fn loaded_at(&self) -> Option<Instant> {
        self.loaded_at
    }

    /// Begin a new load: current collections become revival candidates.
    pub fn start_generation(&mut self) {
        let current = std::mem::take(&mut self.entries);
        self.previous.extend(current);
    }

    /// Complete a load: drop untouched collections and stamp the load time.
    pub fn finish_generation(&mut self) {
        self.metrics.discarded += self.previous.len() as u64;
        self.previous.clear();
        self.loaded_at = Some(Instant::now());
    }

    /// Reuse a collection from the previous load if its kind is not volatile
    /// and it is still within the TTL. Returns whether it was revived.
    pub fn revive(&mut self, kind: ResourceKind, scope: &FetchScope) -> bool {
        if kind.is_volatile() {
            return false;
        }

        let key = (kind, scope.clone());
        let fresh = self
            .previous
            .get(&key)
            .is_some_and(|cached| self.is_within_ttl(cached.fetched_at));
        if !fresh {
            return false;
        }

        if let Some(cached) = self.previous.remove(&key) {
            self.entries.insert(key, cached);
            self.metrics.hits += 1;
            return true;
        }
        false
    }

    /// Store a freshly fetched collection, replacing any earlier one.
    pub fn store(&mut self, kind: ResourceKind, scope: FetchScope, collection: ResourceCollection) {
        self.metrics.misses += 1;
        self.entries.insert(
            (kind, scope),
            CachedCollection {
                collection,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Merge freshly fetched resources into a collection of this load.
    pub fn extend(&mut self, kind: ResourceKind, scope: FetchScope, collection: ResourceCollection) {
        self.metrics.misses += 1;
        let now = Instant::now();
        let cached = self
            .entries
            .entry((kind, scope))
            .or_insert_with(|| CachedCollection {
                collection: ResourceCollection::new(),
                fetched_at: now,
            });
        cached.collection.merge(collection);
        cached.fetched_at = now;
    }

    /// Whether this load already holds the collection.
    pub fn contains(&self, kind: ResourceKind, scope: &FetchScope) -> bool {
        self.entries.contains_key(&(kind, scope.clone()))
    }

    /// Get a collection of this load.
    pub fn collection(&self, kind: ResourceKind, scope: &FetchScope) -> Option<&ResourceCollection> {
        self.entries
            .get(&(kind, scope.clone()))
            .map(|cached| &cached.collection)
    }

    /// Iterate every resource of one kind across all scopes.
    pub fn resources(&self, kind: ResourceKind) -> impl Iterator<Item = &Resource> {
        self.entries
            .iter()
            .filter(move |((k, _), _)| *k == kind)
            .flat_map(|(_, cached)| cached.collection.iter())
    }

    /// Find a resource of one kind by href, in any scope.
    pub fn lookup(&self, kind: ResourceKind, href: &str) -> Option<&Resource> {
        if let Some(found) = self
            .collection(kind, &FetchScope::Href(href.to_string()))
            .and_then(|collection| collection.get(href))
        {
            return Some(found);
        }

        self.entries
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .find_map(|(_, cached)| cached.collection.get(href))
    }

    /// Number of collections held by this load.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no collections.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache metrics.
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clouds() -> ResourceCollection {
        [Resource::new("/api/clouds/1"), Resource::new("/api/clouds/2")]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_nonpositive_ttl_is_never_fresh() {
        for ttl in [0, -5] {
            let mut cache = ResourceCache::new(ttl);
            cache.start_generation();
            cache.store(ResourceKind::Cloud, FetchScope::Account, clouds());
            cache.finish_generation();

            assert!(!cache.is_fresh());
            cache.start_generation();
            assert!(!cache.revive(ResourceKind::Cloud, &FetchScope::Account));
        }
    }

    #[test]
    fn test_revive_reuses_nonvolatile_within_ttl() {
        let mut cache = ResourceCache::new(60_000);
        cache.start_generation();
        cache.store(ResourceKind::Cloud, FetchScope::Account, clouds());
        cache.store(ResourceKind::Server, FetchScope::Account, ResourceCollection::new());
        cache.finish_generation();
        assert!(cache.is_fresh());

        cache.start_generation();
        assert!(cache.revive(ResourceKind::Cloud, &FetchScope::Account));
        assert!(!cache.revive(ResourceKind::Server, &FetchScope::Account));
        cache.finish_generation();

        assert_eq!(cache.collection(ResourceKind::Cloud, &FetchScope::Account).unwrap().len(), 2);
        assert!(!cache.contains(ResourceKind::Server, &FetchScope::Account));
        assert_eq!(cache.metrics().hits, 1);
        assert_eq!(cache.metrics().discarded, 1);
    }

    #[test]
    fn test_untouched_collections_discarded() {
        let mut cache = ResourceCache::new(0);
        cache.start_generation();
        cache.store(ResourceKind::Cloud, FetchScope::Account, clouds());
        cache.finish_generation();
        assert_eq!(cache.len(), 1);

        cache.start_generation();
        cache.finish_generation();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lookup_prefers_href_scope_then_any() {
        let mut cache = ResourceCache::new(0);
        cache.store(
            ResourceKind::Image,
            FetchScope::Cloud("1".into()),
            [Resource::new("/api/clouds/1/images/9").with_attribute("name", "listed")]
                .into_iter()
                .collect(),
        );
        assert_eq!(
            cache
                .lookup(ResourceKind::Image, "/api/clouds/1/images/9")
                .unwrap()
                .attribute("name"),
            Some("listed")
        );
        assert!(cache.lookup(ResourceKind::Cloud, "/api/clouds/1/images/9").is_none());

        cache.store(
            ResourceKind::Image,
            FetchScope::Href("/api/clouds/1/images/9".into()),
            [Resource::new("/api/clouds/1/images/9").with_attribute("name", "single")]
                .into_iter()
                .collect(),
        );
        assert_eq!(
            cache
                .lookup(ResourceKind::Image, "/api/clouds/1/images/9")
                .unwrap()
                .attribute("name"),
            Some("single")
        );
    }

    #[test]
    fn test_extend_merges_into_scope() {
        let mut cache = ResourceCache::new(0);
        let scope = FetchScope::Cloud("1".into());
        cache.extend(
            ResourceKind::Instance,
            scope.clone(),
            [Resource::new("/api/clouds/1/instances/A")].into_iter().collect(),
        );
        cache.extend(
            ResourceKind::Instance,
            scope.clone(),
            [Resource::new("/api/clouds/1/instances/B")].into_iter().collect(),
        );

        assert_eq!(cache.collection(ResourceKind::Instance, &scope).unwrap().len(), 2);
        assert_eq!(cache.resources(ResourceKind::Instance).count(), 2);
    }
}
