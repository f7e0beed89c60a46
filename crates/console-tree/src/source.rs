//! The tree data source contract.

use std::collections::BTreeMap;

use async_trait::async_trait;
use console_core::ApiError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::node::NodeId;

/// Which collection a tree shows, e.g. one resource type's listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Endpoint path serving the pages.
    pub path: String,
    /// Extra query parameters sent with every page.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl ResourceDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }
}

/// One page request. `parent` is `None` for the root level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub descriptor: ResourceDescriptor,
    pub parent: Option<NodeId>,
    pub offset: u64,
    pub limit: u64,
    pub keyword: Option<String>,
}

/// A resource as returned by the data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub has_children: bool,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ResourceEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            has_children: false,
            fields: Map::new(),
        }
    }

    /// Mark the entry as possibly having children.
    pub fn with_children(mut self) -> Self {
        self.has_children = true;
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// One fetched page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub entries: Vec<ResourceEntry>,
    pub total_count: u64,
}

impl Page {
    pub fn new(entries: Vec<ResourceEntry>, total_count: u64) -> Self {
        Self {
            entries,
            total_count,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), 0)
    }
}

/// Fetches pages of a resource collection.
#[async_trait]
pub trait TreeDataSource: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, ApiError>;
}

#[async_trait]
impl<T: TreeDataSource + ?Sized> TreeDataSource for std::sync::Arc<T> {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, ApiError> {
        (**self).fetch_page(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_keeps_domain_fields() {
        let entry: ResourceEntry = serde_json::from_value(json!({
            "id": "r1",
            "name": "Admins",
            "hasChildren": true,
            "memberCount": 4
        }))
        .unwrap();
        assert!(entry.has_children);
        assert_eq!(entry.fields.get("memberCount"), Some(&json!(4)));
        assert!(!entry.fields.contains_key("hasChildren"));
    }

    #[test]
    fn test_descriptor_params() {
        let descriptor = ResourceDescriptor::new("/api/resources").param("type", "policy");
        assert_eq!(descriptor.params.get("type").map(String::as_str), Some("policy"));
    }
}
