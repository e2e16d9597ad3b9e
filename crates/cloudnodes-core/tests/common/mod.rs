//! Common test utilities for integration tests.
//!
//! Builds small resource graphs and fetchers shared across the population
//! and orchestrator tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use cloudnodes_core::{
    FetchError, FetchScope, MemoryFetcher, NamePattern, PipelineSettings, RefreshSettings,
    Resource, ResourceCollection, ResourceFetcher, ResourceKind,
};

pub const ENDPOINT: &str = "https://cloud.example.com";
pub const ACCOUNT: &str = "4242";
pub const CLOUD: &str = "/api/clouds/1";

pub fn settings(input_pattern: &str) -> PipelineSettings {
    PipelineSettings {
        username: "deploy".to_string(),
        endpoint: ENDPOINT.to_string(),
        account_id: ACCOUNT.to_string(),
        input_pattern: NamePattern::new(input_pattern).unwrap(),
        tag_pattern: NamePattern::new(".*").unwrap(),
        tag_attributes: false,
    }
}

pub fn refresh_settings(interval_secs: i64) -> RefreshSettings {
    RefreshSettings {
        interval_secs,
        cache_ttl_ms: 0,
        full_fetch: false,
        pipeline: settings(".*"),
    }
}

pub fn instance_href(uid: &str) -> String {
    format!("{}/instances/{}", CLOUD, uid)
}

/// An instance in cloud 1 with name, uid and state.
pub fn instance(name: &str, uid: &str, state: &str) -> Resource {
    Resource::new(instance_href(uid))
        .with_attribute("name", name)
        .with_attribute("resource_uid", uid)
        .with_attribute("state", state)
        .with_link("cloud", CLOUD)
}

/// A server in cloud 1 running `instance_uid`.
pub fn server(id: &str, state: &str, instance_uid: &str) -> Resource {
    Resource::new(format!("/api/servers/{}", id))
        .with_attribute("name", format!("server-{}", id))
        .with_attribute("state", state)
        .with_link("cloud", CLOUD)
        .with_link("current_instance", instance_href(instance_uid))
}

pub fn array(id: &str) -> Resource {
    Resource::new(format!("/api/server_arrays/{}", id))
        .with_attribute("name", format!("array-{}", id))
        .with_attribute("state", "enabled")
}

/// Builder for a [`MemoryFetcher`] holding one cloud.
#[derive(Default)]
pub struct Graph {
    servers: Vec<Resource>,
    arrays: Vec<(Resource, Vec<Resource>)>,
    instances: Vec<Resource>,
    extra: Vec<(ResourceKind, FetchScope, Vec<Resource>)>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a server and the instance it runs (listed in cloud 1).
    pub fn server(mut self, server: Resource, instance: Resource) -> Self {
        self.servers.push(server);
        self.instances.push(instance);
        self
    }

    /// Add a server whose instance is not listed anywhere.
    pub fn orphan_server(mut self, server: Resource) -> Self {
        self.servers.push(server);
        self
    }

    pub fn array(mut self, array: Resource, instances: Vec<Resource>) -> Self {
        self.arrays.push((array, instances));
        self
    }

    pub fn tags(mut self, instance_uid: &str, tags: &str) -> Self {
        let href = instance_href(instance_uid);
        self.extra.push((
            ResourceKind::Tag,
            FetchScope::Parent(href.clone()),
            vec![Resource::new(format!("{}/tags", href)).with_attribute("tags", tags)],
        ));
        self
    }

    pub fn inputs(mut self, instance_uid: &str, inputs: &[(&str, &str)]) -> Self {
        let href = instance_href(instance_uid);
        let resources = inputs
            .iter()
            .map(|(name, value)| {
                Resource::new(format!("{}/inputs/{}", href, name))
                    .with_attribute("name", *name)
                    .with_attribute("value", *value)
            })
            .collect();
        self.extra
            .push((ResourceKind::Input, FetchScope::Parent(href), resources));
        self
    }

    pub fn resource(mut self, kind: ResourceKind, resource: Resource) -> Self {
        self.extra
            .push((kind, FetchScope::Cloud("1".to_string()), vec![resource]));
        self
    }

    pub fn fetcher(self) -> MemoryFetcher {
        let mut fetcher = MemoryFetcher::new()
            .with(
                ResourceKind::Cloud,
                FetchScope::Account,
                [Resource::new(CLOUD).with_attribute("name", "us-east")],
            )
            .with(ResourceKind::Server, FetchScope::Account, self.servers)
            .with(
                ResourceKind::Instance,
                FetchScope::Cloud("1".to_string()),
                self.instances,
            );

        let mut arrays = Vec::new();
        for (array, instances) in self.arrays {
            fetcher.insert(
                ResourceKind::Instance,
                FetchScope::Parent(array.href.clone()),
                instances,
            );
            arrays.push(array);
        }
        fetcher.insert(ResourceKind::ServerArray, FetchScope::Account, arrays);

        for (kind, scope, resources) in self.extra {
            fetcher.insert(kind, scope, resources);
        }
        fetcher
    }
}

/// Fetcher wrapper whose requests wait on a gate, can be made to fail or
/// panic, and counts calls.
pub struct ControlledFetcher {
    inner: MemoryFetcher,
    gate: tokio::sync::RwLock<()>,
    fail: AtomicBool,
    panic: AtomicBool,
    calls: AtomicUsize,
}

impl ControlledFetcher {
    pub fn new(inner: MemoryFetcher) -> Arc<Self> {
        Arc::new(Self {
            inner,
            gate: tokio::sync::RwLock::new(()),
            fail: AtomicBool::new(false),
            panic: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    /// Hold the returned guard to block every fetch until it is dropped.
    pub async fn close_gate(&self) -> tokio::sync::RwLockWriteGuard<'_, ()> {
        self.gate.write().await
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_panicking(&self, panic: bool) {
        self.panic.store(panic, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceFetcher for ControlledFetcher {
    async fn fetch(
        &self,
        kind: ResourceKind,
        scope: &FetchScope,
    ) -> Result<ResourceCollection, FetchError> {
        let _open = self.gate.read().await;
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.panic.load(Ordering::SeqCst) {
            panic!("fetcher exploded");
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(FetchError::Connection("connection refused".to_string()));
        }
        self.inner.fetch(kind, scope).await
    }
}
