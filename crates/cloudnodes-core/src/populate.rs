//! Population Pipeline
//!
//! Turns a loaded [`ResourceCache`] into a [`NodeSet`]:
//!
//! - **Server pass**: every operational server with a current instance
//!   yields one node built from the server, its instance and the instance's
//!   links. A missing instance or cloud link aborts the cycle.
//! - **Server array pass**: every operational instance of every array yields
//!   one node built from the instance and its links. Missing data is skipped.
//!
//! Attributes are merged last-write-wins in this order: defaults, server,
//! instance, links, inputs, tags, `editUrl`, `last-refresh`. The pipeline
//! only reads the cache; it never fetches.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use tracing::{debug, trace};

use crate::cache::ResourceCache;
use crate::error::RefreshError;
use crate::filter::NamePattern;
use crate::metrics::{Phase, RefreshMetrics};
use crate::node::{attributes, Node, NodeSet};
use crate::resource::{
    last_segment, FetchScope, Resource, ResourceKind, CLOUD_LINK, CURRENT_INSTANCE_LINK,
};

const OS_FAMILY: &str = "unix";
const OS_NAME: &str = "Linux";
const OS_ARCH: &str = "x86_64";

/// Attribute of a tag resource listing its tag names, comma separated.
pub const TAGS_ATTRIBUTE: &str = "tags";

/// Separator between key and value of an attribute-form tag.
const TAG_KEY_VALUE_SEPARATOR: char = '=';

/// A resource kind's contribution to a node.
pub trait Populate {
    /// Merge what `resource` contributes into `node`.
    fn populate(&self, resource: &Resource, node: &mut Node);
}

impl Populate for ResourceKind {
    fn populate(&self, resource: &Resource, node: &mut Node) {
        match self {
            ResourceKind::Instance => {
                merge_prefixed(*self, resource, node);
                if let Some(hostname) = instance_hostname(resource) {
                    node.set_attribute(attributes::HOSTNAME, hostname);
                }
            }
            ResourceKind::Input => {
                if let (Some(name), Some(value)) =
                    (resource.attribute("name"), resource.attribute("value"))
                {
                    node.set_attribute(format!("{}.{}", self.as_str(), name), value);
                }
            }
            // tag names need the configured filter; see `Pipeline::apply_tags`
            ResourceKind::Tag => {}
            ResourceKind::Server
            | ResourceKind::ServerArray
            | ResourceKind::Cloud
            | ResourceKind::Datacenter
            | ResourceKind::Deployment
            | ResourceKind::Image
            | ResourceKind::InstanceType
            | ResourceKind::ServerTemplate
            | ResourceKind::SshKey => merge_prefixed(*self, resource, node),
        }
    }
}

fn merge_prefixed(kind: ResourceKind, resource: &Resource, node: &mut Node) {
    let prefix = kind.as_str();
    for (name, value) in &resource.attributes {
        node.set_attribute(format!("{}.{}", prefix, name), value.clone());
    }
}

fn first_address(list: Option<&str>) -> Option<&str> {
    list?.split(',').map(str::trim).find(|address| !address.is_empty())
}

fn instance_hostname(instance: &Resource) -> Option<&str> {
    first_address(instance.attribute("public_ip_addresses"))
        .or_else(|| first_address(instance.attribute("private_ip_addresses")))
}

/// Link relations the pipeline follows from an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkRelation {
    Cloud,
    Datacenter,
    Deployment,
    Image,
    InstanceType,
    ServerTemplate,
    SshKey,
    Inputs,
}

/// How a link relation contributes to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkHandler {
    /// Look the target up by href and merge its attributes
    Single(ResourceKind),
    /// Merge the instance's inputs that pass the input filter
    Inputs,
}

impl LinkRelation {
    pub const ALL: [LinkRelation; 8] = [
        LinkRelation::Cloud,
        LinkRelation::Datacenter,
        LinkRelation::Deployment,
        LinkRelation::Image,
        LinkRelation::InstanceType,
        LinkRelation::ServerTemplate,
        LinkRelation::SshKey,
        LinkRelation::Inputs,
    ];

    /// Relation name as it appears in resource links.
    pub fn rel(self) -> &'static str {
        match self {
            LinkRelation::Cloud => CLOUD_LINK,
            LinkRelation::Datacenter => "datacenter",
            LinkRelation::Deployment => "deployment",
            LinkRelation::Image => "image",
            LinkRelation::InstanceType => "instance_type",
            LinkRelation::ServerTemplate => "server_template",
            LinkRelation::SshKey => "ssh_key",
            LinkRelation::Inputs => "inputs",
        }
    }

    /// Parse a relation name; unknown relations yield `None`.
    pub fn from_rel(rel: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|relation| relation.rel() == rel)
    }

    pub fn handler(self) -> LinkHandler {
        match self {
            LinkRelation::Cloud => LinkHandler::Single(ResourceKind::Cloud),
            LinkRelation::Datacenter => LinkHandler::Single(ResourceKind::Datacenter),
            LinkRelation::Deployment => LinkHandler::Single(ResourceKind::Deployment),
            LinkRelation::Image => LinkHandler::Single(ResourceKind::Image),
            LinkRelation::InstanceType => LinkHandler::Single(ResourceKind::InstanceType),
            LinkRelation::ServerTemplate => LinkHandler::Single(ResourceKind::ServerTemplate),
            LinkRelation::SshKey => LinkHandler::Single(ResourceKind::SshKey),
            LinkRelation::Inputs => LinkHandler::Inputs,
        }
    }
}

/// Settings the pipeline needs from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Value of the `username` attribute on every node
    pub username: String,
    /// API base URL used for `editUrl`
    pub endpoint: String,
    /// Account id used for `editUrl`
    pub account_id: String,
    /// Inputs whose name fully matches are merged
    pub input_pattern: NamePattern,
    /// Tags whose name fully matches are kept
    pub tag_pattern: NamePattern,
    /// Turn `key=value` tags into attributes
    pub tag_attributes: bool,
}

/// One population run over a loaded cache.
pub struct Pipeline<'a> {
    settings: &'a PipelineSettings,
    cache: &'a ResourceCache,
    metrics: &'a RefreshMetrics,
    refreshed_at: DateTime<Utc>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        settings: &'a PipelineSettings,
        cache: &'a ResourceCache,
        metrics: &'a RefreshMetrics,
        refreshed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            settings,
            cache,
            metrics,
            refreshed_at,
        }
    }

    /// Run both passes and return the resulting node set.
    pub fn populate(&self) -> Result<NodeSet, RefreshError> {
        let mut nodes = NodeSet::new(self.refreshed_at);
        let mut sources = HashMap::new();

        {
            let _timer = self.metrics.time(Phase::ServerPass);
            self.server_pass(&mut nodes, &mut sources)?;
        }
        {
            let _timer = self.metrics.time(Phase::ServerArrayPass);
            self.server_array_pass(&mut nodes, &mut sources);
        }

        Ok(nodes)
    }

    fn server_pass(
        &self,
        nodes: &mut NodeSet,
        sources: &mut HashMap<String, String>,
    ) -> Result<(), RefreshError> {
        let Some(servers) = self
            .cache
            .collection(ResourceKind::Server, &FetchScope::Account)
        else {
            return Ok(());
        };

        for server in servers.iter() {
            if !server.is_eligible_server() {
                debug!(href = %server.href, "Skipping server without an operational current instance");
                continue;
            }
            let Some(instance_href) = server.link(CURRENT_INSTANCE_LINK) else {
                continue;
            };

            let cloud_id = server
                .link(CLOUD_LINK)
                .and_then(last_segment)
                .ok_or_else(|| RefreshError::data_integrity(&server.href, "no cloud link"))?;

            let instance = self
                .cache
                .collection(ResourceKind::Instance, &FetchScope::Cloud(cloud_id.to_string()))
                .and_then(|instances| instances.get(instance_href))
                .ok_or_else(|| {
                    RefreshError::data_integrity(
                        &server.href,
                        format!("current instance '{}' not found in cloud {}", instance_href, cloud_id),
                    )
                })?;

            if !instance.is_operational() {
                debug!(href = %instance.href, "Skipping non-operational instance");
                continue;
            }

            let mut node = self.new_node(instance);
            ResourceKind::Server.populate(server, &mut node);
            ResourceKind::Instance.populate(instance, &mut node);
            self.resolve_links(instance, &mut node);
            self.apply_tags(instance, &mut node);
            node.set_attribute(
                attributes::EDIT_URL,
                format!("{}/servers/{}", self.account_url(), server.id),
            );
            self.finish(node, instance, nodes, sources);
        }

        Ok(())
    }

    fn server_array_pass(&self, nodes: &mut NodeSet, sources: &mut HashMap<String, String>) {
        let Some(arrays) = self
            .cache
            .collection(ResourceKind::ServerArray, &FetchScope::Account)
        else {
            return;
        };

        for array in arrays.iter() {
            let Some(instances) = self
                .cache
                .collection(ResourceKind::Instance, &FetchScope::Parent(array.href.clone()))
            else {
                debug!(href = %array.href, "No instances loaded for server array");
                continue;
            };

            for instance in instances.iter() {
                if !instance.is_operational() {
                    debug!(href = %instance.href, "Skipping non-operational instance");
                    continue;
                }

                let mut node = self.new_node(instance);
                ResourceKind::Instance.populate(instance, &mut node);
                self.resolve_links(instance, &mut node);
                self.apply_tags(instance, &mut node);
                node.set_attribute(
                    attributes::EDIT_URL,
                    format!("{}/server_arrays/{}/instances", self.account_url(), array.id),
                );
                self.finish(node, instance, nodes, sources);
            }
        }
    }

    fn account_url(&self) -> String {
        format!(
            "{}/acct/{}",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.account_id
        )
    }

    fn new_node(&self, instance: &Resource) -> Node {
        let name = instance.attribute("name").unwrap_or(instance.id.as_str());
        let uid = instance.attribute("resource_uid").unwrap_or(instance.id.as_str());

        let mut node = Node::new(format!("{} {}", name, uid));
        node.set_attribute(attributes::USERNAME, self.settings.username.clone());
        node.set_attribute(attributes::OS_FAMILY, OS_FAMILY);
        node.set_attribute(attributes::OS_NAME, OS_NAME);
        node.set_attribute(attributes::OS_ARCH, OS_ARCH);
        node
    }

    fn finish(
        &self,
        mut node: Node,
        instance: &Resource,
        nodes: &mut NodeSet,
        sources: &mut HashMap<String, String>,
    ) {
        node.set_attribute(
            attributes::LAST_REFRESH,
            self.refreshed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        if let Some(earlier) = sources.insert(node.name.clone(), instance.href.clone()) {
            debug!(
                name = %node.name,
                replaced = %earlier,
                by = %instance.href,
                "Node name collision, keeping the later instance"
            );
        }
        nodes.insert(node);
    }

    /// Merge attributes of every followed link of `instance`.
    fn resolve_links(&self, instance: &Resource, node: &mut Node) {
        let _timer = self.metrics.time(Phase::LinkResolution);

        for (rel, href) in &instance.links {
            let Some(relation) = LinkRelation::from_rel(rel) else {
                trace!(rel = %rel, href = %instance.href, "Ignoring link relation");
                continue;
            };

            match relation.handler() {
                LinkHandler::Single(kind) => match self.cache.lookup(kind, href) {
                    Some(target) => kind.populate(target, node),
                    None => trace!(rel = %rel, target = %href, "Linked resource not loaded"),
                },
                LinkHandler::Inputs => self.merge_inputs(instance, node),
            }
        }
    }

    fn merge_inputs(&self, instance: &Resource, node: &mut Node) {
        let Some(inputs) = self
            .cache
            .collection(ResourceKind::Input, &FetchScope::Parent(instance.href.clone()))
        else {
            return;
        };

        for input in inputs.iter() {
            let Some(name) = input.attribute("name") else {
                continue;
            };
            if self.settings.input_pattern.matches(name) {
                ResourceKind::Input.populate(input, node);
            } else {
                trace!(input = %name, "Input filtered out");
            }
        }
    }

    fn apply_tags(&self, instance: &Resource, node: &mut Node) {
        let Some(tag_sets) = self
            .cache
            .collection(ResourceKind::Tag, &FetchScope::Parent(instance.href.clone()))
        else {
            return;
        };

        for tag_set in tag_sets.iter() {
            let Some(list) = tag_set.attribute(TAGS_ATTRIBUTE) else {
                continue;
            };

            for tag in list.split(',').map(str::trim).filter(|tag| !tag.is_empty()) {
                if !self.settings.tag_pattern.matches(tag) {
                    trace!(tag = %tag, "Tag filtered out");
                    continue;
                }

                match tag.split_once(TAG_KEY_VALUE_SEPARATOR) {
                    Some((key, value)) if self.settings.tag_attributes => {
                        node.set_attribute(key, value);
                    }
                    _ => node.add_tag(tag),
                }
            }
        }
    }
}
