//! Resource model shared by fetchers, the resource cache and the pipeline.
//!
//! A [`Resource`] is a raw record fetched from the cloud management API: an
//! id, its own href, a flat attribute map and a map of link relations to the
//! hrefs of related resources. Resources of one kind and scope are grouped in
//! a [`ResourceCollection`] keyed by href.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Attribute holding a resource's lifecycle state.
pub const STATE_ATTRIBUTE: &str = "state";

/// The only state that makes servers and instances eligible as nodes.
pub const OPERATIONAL: &str = "operational";

/// Link from a server to the instance it currently runs.
pub const CURRENT_INSTANCE_LINK: &str = "current_instance";

/// Link from a server or instance to its cloud.
pub const CLOUD_LINK: &str = "cloud";

/// Closed set of resource kinds the API exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Server,
    ServerArray,
    Instance,
    Cloud,
    Datacenter,
    Deployment,
    Image,
    InstanceType,
    ServerTemplate,
    SshKey,
    Input,
    Tag,
}

impl ResourceKind {
    /// Every kind, in declaration order.
    pub const ALL: [ResourceKind; 12] = [
        ResourceKind::Server,
        ResourceKind::ServerArray,
        ResourceKind::Instance,
        ResourceKind::Cloud,
        ResourceKind::Datacenter,
        ResourceKind::Deployment,
        ResourceKind::Image,
        ResourceKind::InstanceType,
        ResourceKind::ServerTemplate,
        ResourceKind::SshKey,
        ResourceKind::Input,
        ResourceKind::Tag,
    ];

    /// Get the string representation, also used as attribute prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Server => "server",
            ResourceKind::ServerArray => "server_array",
            ResourceKind::Instance => "instance",
            ResourceKind::Cloud => "cloud",
            ResourceKind::Datacenter => "datacenter",
            ResourceKind::Deployment => "deployment",
            ResourceKind::Image => "image",
            ResourceKind::InstanceType => "instance_type",
            ResourceKind::ServerTemplate => "server_template",
            ResourceKind::SshKey => "ssh_key",
            ResourceKind::Input => "input",
            ResourceKind::Tag => "tag",
        }
    }

    /// Volatile kinds change between polls and are refetched every load.
    ///
    /// The others (clouds, images, templates, ...) may be reused while the
    /// resource cache TTL has not expired.
    pub fn is_volatile(&self) -> bool {
        matches!(
            self,
            ResourceKind::Server
                | ResourceKind::ServerArray
                | ResourceKind::Instance
                | ResourceKind::Input
                | ResourceKind::Tag
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown resource kind '{}'", s))
    }
}

/// Where a collection of resources lives in the API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchScope {
    /// Account-wide listing
    Account,
    /// Listing inside one cloud, by cloud id
    Cloud(String),
    /// Children of the resource with this href (array instances, inputs, tags)
    Parent(String),
    /// The single resource addressed by this href
    Href(String),
}

impl fmt::Display for FetchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchScope::Account => write!(f, "account"),
            FetchScope::Cloud(id) => write!(f, "cloud {}", id),
            FetchScope::Parent(href) => write!(f, "children of {}", href),
            FetchScope::Href(href) => write!(f, "{}", href),
        }
    }
}

/// A raw resource: id, own href, attributes and links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource identifier (defaults to the last segment of the href)
    #[serde(default)]
    pub id: String,

    /// The resource's own link target
    pub href: String,

    /// Attribute name → value
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Link relation → href
    #[serde(default)]
    pub links: BTreeMap<String, String>,
}

impl Resource {
    /// Create a resource whose id is the last segment of `href`.
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            href: href.into(),
            attributes: BTreeMap::new(),
            links: BTreeMap::new(),
        }
        .with_derived_id()
    }

    /// Fill an empty id from the href.
    pub fn with_derived_id(mut self) -> Self {
        if self.id.is_empty() {
            self.id = last_segment(&self.href).unwrap_or_default().to_string();
        }
        self
    }

    /// Set an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set a link.
    pub fn with_link(mut self, rel: impl Into<String>, href: impl Into<String>) -> Self {
        self.links.insert(rel.into(), href.into());
        self
    }

    /// Look up an attribute value.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Look up a link target.
    pub fn link(&self, rel: &str) -> Option<&str> {
        self.links.get(rel).map(String::as_str)
    }

    /// Whether the `state` attribute is `operational`, ignoring case.
    pub fn is_operational(&self) -> bool {
        self.attribute(STATE_ATTRIBUTE)
            .is_some_and(|state| state.eq_ignore_ascii_case(OPERATIONAL))
    }

    /// Whether this server can produce a node: operational with a current instance.
    pub fn is_eligible_server(&self) -> bool {
        self.is_operational() && self.link(CURRENT_INSTANCE_LINK).is_some()
    }
}

/// Last non-empty path segment of an href (`/api/clouds/7/` → `7`).
pub fn last_segment(href: &str) -> Option<&str> {
    href.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

/// Resources of one kind and scope, keyed by href.
///
/// Iteration follows href order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceCollection {
    resources: BTreeMap<String, Resource>,
}

impl ResourceCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource, replacing any resource with the same href.
    pub fn insert(&mut self, resource: Resource) -> Option<Resource> {
        self.resources.insert(resource.href.clone(), resource)
    }

    /// Get a resource by href.
    pub fn get(&self, href: &str) -> Option<&Resource> {
        self.resources.get(href)
    }

    /// Whether a resource with this href is present.
    pub fn contains(&self, href: &str) -> bool {
        self.resources.contains_key(href)
    }

    /// Iterate resources in href order.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Move every resource of `other` into this collection.
    pub fn merge(&mut self, other: ResourceCollection) {
        self.resources.extend(other.resources);
    }
}

impl FromIterator<Resource> for ResourceCollection {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        let mut collection = Self::new();
        for resource in iter {
            collection.insert(resource);
        }
        collection
    }
}

impl IntoIterator for ResourceCollection {
    type Item = Resource;
    type IntoIter = std::collections::btree_map::IntoValues<String, Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.into_values()
    }
}
