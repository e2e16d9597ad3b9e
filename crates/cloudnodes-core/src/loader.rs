//! Cache Loaders
//!
//! A loader fills the [`ResourceCache`] with everything the pipeline will
//! read during one cycle. Two strategies exist:
//!
//! - [`MinimalLoader`] follows the graph from servers and arrays and fetches
//!   only what the resulting nodes reference.
//! - [`FullLoader`] lists every supported kind in every cloud.
//!
//! Both run as a cache generation, so non-volatile collections younger than
//! the cache TTL are revived instead of refetched.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::cache::ResourceCache;
use crate::error::RefreshError;
use crate::fetcher::{FetchError, ResourceFetcher};
use crate::populate::{LinkHandler, LinkRelation};
use crate::resource::{
    last_segment, FetchScope, Resource, ResourceKind, CLOUD_LINK, CURRENT_INSTANCE_LINK,
};

/// Fills the resource cache for one refresh cycle.
#[async_trait]
pub trait CacheLoader: Send + Sync {
    /// Short strategy name used in logs.
    fn name(&self) -> &'static str;

    /// Load every collection the pipeline needs into `cache`.
    ///
    /// Mutates the cache in place; callers must not run two loads at once.
    async fn load(
        &self,
        cache: &mut ResourceCache,
        fetcher: &dyn ResourceFetcher,
    ) -> Result<(), RefreshError>;
}

/// Pick the loader for the `full_fetch` setting.
pub fn loader_for(full_fetch: bool) -> Arc<dyn CacheLoader> {
    if full_fetch {
        Arc::new(FullLoader)
    } else {
        Arc::new(MinimalLoader)
    }
}

/// Make sure this load holds `(kind, scope)`: keep it if already loaded,
/// revive it if still fresh, fetch it otherwise.
async fn ensure(
    cache: &mut ResourceCache,
    fetcher: &dyn ResourceFetcher,
    kind: ResourceKind,
    scope: FetchScope,
) -> Result<(), FetchError> {
    if cache.contains(kind, &scope) {
        return Ok(());
    }
    if cache.revive(kind, &scope) {
        trace!(%kind, %scope, "Reusing cached resources");
        return Ok(());
    }

    let collection = fetcher.fetch(kind, &scope).await?;
    trace!(%kind, %scope, count = collection.len(), "Fetched resources");
    cache.store(kind, scope, collection);
    Ok(())
}

fn account_resources(
    cache: &ResourceCache,
    kind: ResourceKind,
    keep: impl Fn(&Resource) -> bool,
) -> Vec<Resource> {
    cache
        .collection(kind, &FetchScope::Account)
        .map(|collection| collection.iter().filter(|r| keep(r)).cloned().collect())
        .unwrap_or_default()
}

fn operational_instances(cache: &ResourceCache) -> Vec<Resource> {
    cache
        .resources(ResourceKind::Instance)
        .filter(|instance| instance.is_operational())
        .cloned()
        .collect()
}

/// Fetch only what the nodes of this cycle reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimalLoader;

#[async_trait]
impl CacheLoader for MinimalLoader {
    fn name(&self) -> &'static str {
        "minimal"
    }

    async fn load(
        &self,
        cache: &mut ResourceCache,
        fetcher: &dyn ResourceFetcher,
    ) -> Result<(), RefreshError> {
        cache.start_generation();

        ensure(cache, fetcher, ResourceKind::Server, FetchScope::Account).await?;
        ensure(cache, fetcher, ResourceKind::ServerArray, FetchScope::Account).await?;

        for server in account_resources(cache, ResourceKind::Server, Resource::is_eligible_server) {
            let (Some(instance_href), Some(cloud_id)) = (
                server.link(CURRENT_INSTANCE_LINK),
                server.link(CLOUD_LINK).and_then(last_segment),
            ) else {
                debug!(href = %server.href, "Server has no cloud link, not loading its instance");
                continue;
            };

            let instance = fetcher
                .fetch(
                    ResourceKind::Instance,
                    &FetchScope::Href(instance_href.to_string()),
                )
                .await?;
            cache.extend(
                ResourceKind::Instance,
                FetchScope::Cloud(cloud_id.to_string()),
                instance,
            );
        }

        for array in account_resources(cache, ResourceKind::ServerArray, |_| true) {
            ensure(cache, fetcher, ResourceKind::Instance, FetchScope::Parent(array.href)).await?;
        }

        for instance in operational_instances(cache) {
            for (rel, href) in &instance.links {
                let Some(relation) = LinkRelation::from_rel(rel) else {
                    continue;
                };
                match relation.handler() {
                    LinkHandler::Single(kind) => {
                        ensure(cache, fetcher, kind, FetchScope::Href(href.clone())).await?;
                    }
                    LinkHandler::Inputs => {
                        ensure(
                            cache,
                            fetcher,
                            ResourceKind::Input,
                            FetchScope::Parent(instance.href.clone()),
                        )
                        .await?;
                    }
                }
            }
            ensure(cache, fetcher, ResourceKind::Tag, FetchScope::Parent(instance.href)).await?;
        }

        cache.finish_generation();
        Ok(())
    }
}

/// Fetch every supported kind in every cloud.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullLoader;

impl FullLoader {
    const ACCOUNT_KINDS: [ResourceKind; 5] = [
        ResourceKind::Cloud,
        ResourceKind::Deployment,
        ResourceKind::ServerTemplate,
        ResourceKind::Server,
        ResourceKind::ServerArray,
    ];

    const CLOUD_KINDS: [ResourceKind; 5] = [
        ResourceKind::Instance,
        ResourceKind::Datacenter,
        ResourceKind::Image,
        ResourceKind::InstanceType,
        ResourceKind::SshKey,
    ];
}

#[async_trait]
impl CacheLoader for FullLoader {
    fn name(&self) -> &'static str {
        "full"
    }

    async fn load(
        &self,
        cache: &mut ResourceCache,
        fetcher: &dyn ResourceFetcher,
    ) -> Result<(), RefreshError> {
        cache.start_generation();

        for kind in Self::ACCOUNT_KINDS {
            ensure(cache, fetcher, kind, FetchScope::Account).await?;
        }

        for cloud in account_resources(cache, ResourceKind::Cloud, |_| true) {
            for kind in Self::CLOUD_KINDS {
                ensure(cache, fetcher, kind, FetchScope::Cloud(cloud.id.clone())).await?;
            }
        }

        for array in account_resources(cache, ResourceKind::ServerArray, |_| true) {
            ensure(cache, fetcher, ResourceKind::Instance, FetchScope::Parent(array.href)).await?;
        }

        for instance in operational_instances(cache) {
            ensure(
                cache,
                fetcher,
                ResourceKind::Input,
                FetchScope::Parent(instance.href.clone()),
            )
            .await?;
            ensure(cache, fetcher, ResourceKind::Tag, FetchScope::Parent(instance.href)).await?;
        }

        cache.finish_generation();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::MemoryFetcher;

    fn fetcher() -> MemoryFetcher {
        MemoryFetcher::new()
            .with(
                ResourceKind::Cloud,
                FetchScope::Account,
                [Resource::new("/api/clouds/1")],
            )
            .with(
                ResourceKind::Server,
                FetchScope::Account,
                [Resource::new("/api/servers/10")
                    .with_attribute("state", "operational")
                    .with_link(CLOUD_LINK, "/api/clouds/1")
                    .with_link(CURRENT_INSTANCE_LINK, "/api/clouds/1/instances/A")],
            )
            .with(
                ResourceKind::Instance,
                FetchScope::Cloud("1".into()),
                [
                    Resource::new("/api/clouds/1/instances/A")
                        .with_attribute("state", "operational")
                        .with_link("image", "/api/clouds/1/images/9"),
                    Resource::new("/api/clouds/1/instances/B").with_attribute("state", "stopped"),
                ],
            )
            .with(
                ResourceKind::Image,
                FetchScope::Cloud("1".into()),
                [Resource::new("/api/clouds/1/images/9")],
            )
    }

    #[tokio::test]
    async fn test_minimal_loads_only_referenced_resources() {
        let fetcher = fetcher();
        let mut cache = ResourceCache::new(0);

        MinimalLoader.load(&mut cache, &fetcher).await.unwrap();

        let instances = cache
            .collection(ResourceKind::Instance, &FetchScope::Cloud("1".into()))
            .unwrap();
        assert_eq!(instances.len(), 1);
        assert!(cache.lookup(ResourceKind::Image, "/api/clouds/1/images/9").is_some());
        assert_eq!(fetcher.request_count(ResourceKind::Cloud), 0);
        assert_eq!(fetcher.request_count(ResourceKind::Image), 1);
        assert!(cache.contains(
            ResourceKind::Tag,
            &FetchScope::Parent("/api/clouds/1/instances/A".into())
        ));
        assert!(cache.loaded_at().is_some());
    }

    #[tokio::test]
    async fn test_full_lists_every_cloud_kind() {
        let fetcher = fetcher();
        let mut cache = ResourceCache::new(0);

        FullLoader.load(&mut cache, &fetcher).await.unwrap();

        let instances = cache
            .collection(ResourceKind::Instance, &FetchScope::Cloud("1".into()))
            .unwrap();
        assert_eq!(instances.len(), 2);
        for kind in FullLoader::CLOUD_KINDS {
            assert!(cache.contains(kind, &FetchScope::Cloud("1".into())), "{kind}");
        }
        // inputs and tags for the operational instance only
        assert_eq!(fetcher.request_count(ResourceKind::Input), 1);
        assert_eq!(fetcher.request_count(ResourceKind::Tag), 1);
    }

    #[tokio::test]
    async fn test_ttl_reuses_nonvolatile_collections() {
        let fetcher = fetcher();
        let mut cache = ResourceCache::new(60_000);

        FullLoader.load(&mut cache, &fetcher).await.unwrap();
        FullLoader.load(&mut cache, &fetcher).await.unwrap();

        assert_eq!(fetcher.request_count(ResourceKind::Cloud), 1);
        assert_eq!(fetcher.request_count(ResourceKind::Image), 1);
        assert_eq!(fetcher.request_count(ResourceKind::Server), 2);
        assert_eq!(fetcher.request_count(ResourceKind::Instance), 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_refetches_everything() {
        let fetcher = fetcher();
        let mut cache = ResourceCache::new(0);

        FullLoader.load(&mut cache, &fetcher).await.unwrap();
        FullLoader.load(&mut cache, &fetcher).await.unwrap();

        assert_eq!(fetcher.request_count(ResourceKind::Cloud), 2);
        assert_eq!(fetcher.request_count(ResourceKind::Image), 2);
    }

    #[test]
    fn test_loader_for() {
        assert_eq!(loader_for(false).name(), "minimal");
        assert_eq!(loader_for(true).name(), "full");
    }
}
