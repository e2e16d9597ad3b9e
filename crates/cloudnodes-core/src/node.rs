//! Flat node records and the node set handed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Node attribute names set by the pipeline itself.
pub mod attributes {
    pub const USERNAME: &str = "username";
    pub const OS_FAMILY: &str = "osFamily";
    pub const OS_NAME: &str = "osName";
    pub const OS_ARCH: &str = "osArch";
    pub const HOSTNAME: &str = "hostname";
    pub const EDIT_URL: &str = "editUrl";
    pub const LAST_REFRESH: &str = "last-refresh";
}

/// One manageable compute target with merged attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// `<instance name> <instance resource uid>`
    pub name: String,

    /// Attribute name → value (last write wins)
    pub attributes: BTreeMap<String, String>,

    /// Plain tags
    pub tags: BTreeSet<String>,
}

impl Node {
    /// Create a node with no attributes or tags.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
            tags: BTreeSet::new(),
        }
    }

    /// Set an attribute, overwriting any earlier value.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Look up an attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Add a plain tag.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }

    /// Whether the node carries this plain tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Immutable result of one refresh cycle: node name → node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSet {
    nodes: BTreeMap<String, Node>,
    refreshed_at: DateTime<Utc>,
}

impl NodeSet {
    /// Create an empty node set stamped with its refresh time.
    pub fn new(refreshed_at: DateTime<Utc>) -> Self {
        Self {
            nodes: BTreeMap::new(),
            refreshed_at,
        }
    }

    /// Insert a node, returning the node it replaced (same name), if any.
    pub fn insert(&mut self, node: Node) -> Option<Node> {
        self.nodes.insert(node.name.clone(), node)
    }

    /// Get a node by name.
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Iterate nodes in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Node names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// When the cycle that built this set ran.
    pub fn refreshed_at(&self) -> DateTime<Utc> {
        self.refreshed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_attributes_last_write_wins() {
        let mut node = Node::new("web-1 ABC");
        node.set_attribute("role", "web");
        node.set_attribute("role", "db");
        assert_eq!(node.attribute("role"), Some("db"));
    }

    #[test]
    fn test_node_set_insert_replaces_same_name() {
        let mut set = NodeSet::new(Utc::now());
        let mut first = Node::new("web-1 ABC");
        first.set_attribute("source", "server");
        let mut second = Node::new("web-1 ABC");
        second.set_attribute("source", "array");

        assert!(set.insert(first).is_none());
        let replaced = set.insert(second).unwrap();

        assert_eq!(replaced.attribute("source"), Some("server"));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("web-1 ABC").unwrap().attribute("source"), Some("array"));
    }
}
