//! Tree nodes and identifiers.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::source::ResourceEntry;

/// Prefix of synthetic "load more" node ids.
pub const SENTINEL_PREFIX: &str = "loadmore-";

/// Identifier of a tree node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A tree level: the root list or the children of one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParentKey {
    Root,
    Node(NodeId),
}

impl ParentKey {
    /// Display id of this level's sentinel. Sentinels are looked up by
    /// level, never by this id.
    pub fn sentinel_id(&self) -> NodeId {
        match self {
            ParentKey::Root => NodeId(format!("{}root", SENTINEL_PREFIX)),
            ParentKey::Node(id) => NodeId(format!("{}{}", SENTINEL_PREFIX, id)),
        }
    }

    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            ParentKey::Root => None,
            ParentKey::Node(id) => Some(id),
        }
    }
}

impl fmt::Display for ParentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParentKey::Root => f.write_str("root"),
            ParentKey::Node(id) => write!(f, "{}", id),
        }
    }
}

impl From<NodeId> for ParentKey {
    fn from(id: NodeId) -> Self {
        ParentKey::Node(id)
    }
}

impl From<&str> for ParentKey {
    fn from(id: &str) -> Self {
        ParentKey::Node(NodeId::from(id))
    }
}

/// Materialization state of a node that may have children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Children {
    /// Known to possibly have children, never fetched.
    Unloaded,
    /// Fetched child ids in display order.
    Loaded(Vec<NodeId>),
}

/// One entry of the arena.
///
/// `children` is `None` for a confirmed leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub id: NodeId,
    pub name: String,
    /// A level listing this node. Shared nodes keep the first one.
    pub parent: ParentKey,
    /// Domain fields carried through from the data source.
    pub fields: Map<String, Value>,
    pub children: Option<Children>,
    pub load_more: bool,
}

impl TreeNode {
    pub(crate) fn from_entry(entry: ResourceEntry, parent: ParentKey) -> Self {
        Self {
            id: NodeId(entry.id),
            name: entry.name,
            parent,
            fields: entry.fields,
            children: entry.has_children.then_some(Children::Unloaded),
            load_more: false,
        }
    }

    pub(crate) fn sentinel(parent: ParentKey) -> Self {
        Self {
            id: parent.sentinel_id(),
            name: "Load more".to_string(),
            parent,
            fields: Map::new(),
            children: None,
            load_more: true,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.load_more
    }

    /// Confirmed leaf: a real node with no children key.
    pub fn is_leaf(&self) -> bool {
        !self.load_more && self.children.is_none()
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.children, Some(Children::Loaded(_)))
    }

    /// Child ids, empty unless loaded.
    pub fn child_ids(&self) -> &[NodeId] {
        match &self.children {
            Some(Children::Loaded(ids)) => ids,
            _ => &[],
        }
    }
}
