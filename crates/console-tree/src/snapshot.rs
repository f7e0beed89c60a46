//! Immutable tree snapshots.
//!
//! Nodes live in an arena keyed by id, each behind an `Arc`. Children are id
//! lists. A mutation clones the arena table (pointer copies only), replaces
//! the nodes it touches and publishes the result as a new version, so a
//! reader holding an older snapshot never sees a half-applied change and
//! untouched nodes keep their identity across versions.
//!
//! A resource listed under several parents is one arena node referenced from
//! each of those levels. Load-more sentinels are kept per level, outside the
//! arena, so no resource id can collide with one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::cursor::PageCursor;
use crate::node::{Children, NodeId, ParentKey, TreeNode};
use crate::source::Page;

/// How a fetched page combines with a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Merge {
    /// The page is the whole level.
    Replace,
    /// The page follows the nodes already loaded.
    Append,
}

/// One version of the tree.
#[derive(Debug, Clone, Default)]
pub struct TreeSnapshot {
    version: u64,
    roots: Vec<NodeId>,
    nodes: HashMap<NodeId, Arc<TreeNode>>,
    sentinels: HashMap<ParentKey, Arc<TreeNode>>,
    cursors: HashMap<ParentKey, PageCursor>,
    expanded: HashSet<NodeId>,
}

/// A row of the flattened, expansion-aware view.
#[derive(Debug, Clone)]
pub struct VisibleRow {
    pub node: Arc<TreeNode>,
    pub depth: usize,
    pub expanded: bool,
}

/// Serializable nested form of the tree.
///
/// Leaves have no `children` key; unexpanded nodes that may have children
/// carry an empty list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedNode {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<NestedNode>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_load_more: bool,
}

impl TreeSnapshot {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// True until a root page has been applied.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Number of distinct resources loaded.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: &str) -> Option<&Arc<TreeNode>> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Resource ids of a level in display order, without the sentinel.
    pub fn child_ids(&self, parent: &ParentKey) -> &[NodeId] {
        match parent {
            ParentKey::Root => &self.roots,
            ParentKey::Node(id) => self.nodes.get(id).map(|n| n.child_ids()).unwrap_or(&[]),
        }
    }

    /// Nodes of a level in display order, sentinel last if present.
    pub fn children(&self, parent: &ParentKey) -> Vec<Arc<TreeNode>> {
        self.child_ids(parent)
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .chain(self.sentinels.get(parent))
            .cloned()
            .collect()
    }

    /// The level's load-more sentinel.
    pub fn sentinel(&self, parent: &ParentKey) -> Option<&Arc<TreeNode>> {
        self.sentinels.get(parent)
    }

    pub fn cursor(&self, parent: &ParentKey) -> Option<PageCursor> {
        self.cursors.get(parent).copied()
    }

    /// Whether the level ends in a sentinel.
    pub fn has_more(&self, parent: &ParentKey) -> bool {
        self.sentinels.contains_key(parent)
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    /// Depth-first flattening that descends only into expanded nodes.
    pub fn visible_rows(&self) -> Vec<VisibleRow> {
        let mut rows = Vec::new();
        self.walk(&ParentKey::Root, 0, &mut rows);
        rows
    }

    fn walk(&self, parent: &ParentKey, depth: usize, rows: &mut Vec<VisibleRow>) {
        for id in self.child_ids(parent) {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let expanded = self.expanded.contains(id);
            rows.push(VisibleRow {
                node: Arc::clone(node),
                depth,
                expanded,
            });
            if expanded {
                self.walk(&ParentKey::Node(id.clone()), depth + 1, rows);
            }
        }
        if let Some(sentinel) = self.sentinels.get(parent) {
            rows.push(VisibleRow {
                node: Arc::clone(sentinel),
                depth,
                expanded: false,
            });
        }
    }

    /// Every loaded node as a nested structure, regardless of expansion.
    pub fn to_nested(&self) -> Vec<NestedNode> {
        self.nest(&ParentKey::Root)
    }

    fn nest(&self, parent: &ParentKey) -> Vec<NestedNode> {
        self.child_ids(parent)
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|node| NestedNode {
                id: node.id.to_string(),
                name: node.name.clone(),
                fields: node.fields.clone(),
                children: match &node.children {
                    None => None,
                    Some(Children::Unloaded) => Some(Vec::new()),
                    Some(Children::Loaded(_)) => Some(self.nest(&ParentKey::Node(node.id.clone()))),
                },
                is_load_more: false,
            })
            .chain(self.sentinels.get(parent).map(|sentinel| NestedNode {
                id: sentinel.id.to_string(),
                name: sentinel.name.clone(),
                fields: Map::new(),
                children: None,
                is_load_more: true,
            }))
            .collect()
    }

    /// A new tree holding only the given root page.
    pub(crate) fn with_root(&self, page: Page, offset: u64, limit: u64) -> Self {
        let mut next = Self {
            version: self.version + 1,
            ..Self::default()
        };
        next.apply_page(&ParentKey::Root, page, offset, limit, Merge::Replace);
        next
    }

    /// Merge a page into one level. `None` when nothing changed or the parent
    /// no longer exists.
    pub(crate) fn merge_page(
        &self,
        parent: &ParentKey,
        page: Page,
        offset: u64,
        limit: u64,
        merge: Merge,
    ) -> Option<Self> {
        let mut next = self.clone();
        if !next.apply_page(parent, page, offset, limit, merge) {
            return None;
        }
        next.version += 1;
        Some(next)
    }

    /// Mark a node expanded or collapsed. `None` when already so.
    pub(crate) fn set_expanded(&self, id: &NodeId, expanded: bool) -> Option<Self> {
        if self.expanded.contains(id) == expanded {
            return None;
        }
        let mut next = self.clone();
        if expanded {
            next.expanded.insert(id.clone());
        } else {
            next.expanded.remove(id);
        }
        next.version += 1;
        Some(next)
    }

    fn apply_page(
        &mut self,
        parent: &ParentKey,
        page: Page,
        offset: u64,
        limit: u64,
        merge: Merge,
    ) -> bool {
        let old_children = match parent {
            ParentKey::Root => None,
            ParentKey::Node(id) => match self.nodes.get(id) {
                Some(node) => node.children.clone(),
                None => return false,
            },
        };
        let before = self.child_ids(parent).to_vec();
        let old_cursor = self.cursors.get(parent).copied();

        // The cursor counts every entry the server returned, duplicates included.
        let (mut ids, consumed) = match merge {
            Merge::Append => (before.clone(), old_cursor.map_or(0, |c| c.loaded)),
            Merge::Replace => (Vec::new(), 0),
        };
        let consumed = consumed + page.entries.len() as u64;

        let mut seen: HashSet<NodeId> = ids.iter().cloned().collect();
        for entry in page.entries {
            let id = NodeId::new(entry.id.clone());
            if seen.contains(&id) {
                tracing::debug!(parent = %parent, id = %id, "skipping duplicate entry");
                continue;
            }
            if self.would_cycle(parent, &id) {
                tracing::debug!(parent = %parent, id = %id, "skipping entry listed above its parent");
                continue;
            }
            if !self.nodes.contains_key(&id) {
                self.nodes
                    .insert(id.clone(), Arc::new(TreeNode::from_entry(entry, parent.clone())));
            }
            seen.insert(id.clone());
            ids.push(id);
        }

        let cursor = PageCursor::new(offset, limit, page.total_count, consumed);
        if cursor.has_more() {
            if !self.sentinels.contains_key(parent) {
                self.sentinels
                    .insert(parent.clone(), Arc::new(TreeNode::sentinel(parent.clone())));
            }
        } else {
            self.sentinels.remove(parent);
        }
        let cursor_changed = old_cursor != Some(cursor);

        let changed = match parent {
            ParentKey::Root => {
                let changed = ids != before || cursor_changed;
                self.roots = ids;
                self.cursors.insert(ParentKey::Root, cursor);
                changed
            }
            ParentKey::Node(id) => {
                let children = if ids.is_empty() {
                    self.cursors.remove(parent);
                    self.sentinels.remove(parent);
                    self.expanded.remove(id);
                    None
                } else {
                    self.cursors.insert(parent.clone(), cursor);
                    if merge == Merge::Replace {
                        self.expanded.insert(id.clone());
                    }
                    Some(Children::Loaded(ids))
                };
                let changed = children != old_children || cursor_changed;
                if let Some(node) = self.nodes.get_mut(id) {
                    Arc::make_mut(node).children = children;
                }
                changed
            }
        };

        if merge == Merge::Replace {
            for id in &before {
                self.release(id);
            }
        }
        changed
    }

    /// True when listing `id` under `parent` would make a node its own
    /// descendant.
    fn would_cycle(&self, parent: &ParentKey, id: &NodeId) -> bool {
        let ParentKey::Node(target) = parent else {
            return false;
        };
        let mut stack = vec![id];
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if visited.insert(current) {
                if let Some(node) = self.nodes.get(current) {
                    stack.extend(node.child_ids());
                }
            }
        }
        false
    }

    /// A level that lists `id`, roots first.
    fn listing_level(&self, id: &NodeId) -> Option<ParentKey> {
        if self.roots.contains(id) {
            return Some(ParentKey::Root);
        }
        self.nodes
            .values()
            .find(|node| node.child_ids().contains(id))
            .map(|node| ParentKey::Node(node.id.clone()))
    }

    /// Drop a node and everything below it that no level lists any more.
    /// A node still listed elsewhere is re-homed to that level.
    fn release(&mut self, id: &NodeId) {
        if let Some(level) = self.listing_level(id) {
            if let Some(node) = self.nodes.get_mut(id) {
                if node.parent != level {
                    Arc::make_mut(node).parent = level;
                }
            }
            return;
        }
        if let Some(node) = self.nodes.remove(id) {
            for child in node.child_ids() {
                self.release(child);
            }
        }
        let key = ParentKey::Node(id.clone());
        self.cursors.remove(&key);
        self.sentinels.remove(&key);
        self.expanded.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ResourceEntry;
    use serde_json::json;

    fn entries(ids: &[&str]) -> Vec<ResourceEntry> {
        ids.iter()
            .map(|id| ResourceEntry::new(*id, id.to_uppercase()))
            .collect()
    }

    fn level_ids(snapshot: &TreeSnapshot, parent: &ParentKey) -> Vec<String> {
        snapshot
            .children(parent)
            .iter()
            .map(|node| node.id.to_string())
            .collect()
    }

    fn root_ids(snapshot: &TreeSnapshot) -> Vec<String> {
        level_ids(snapshot, &ParentKey::Root)
    }

    fn folders(ids: &[&str]) -> Vec<ResourceEntry> {
        ids.iter()
            .map(|id| ResourceEntry::new(*id, id.to_uppercase()).with_children())
            .collect()
    }

    #[test]
    fn test_root_page_with_sentinel() {
        let tree = TreeSnapshot::new().with_root(Page::new(entries(&["a", "b"]), 5), 0, 2);

        assert_eq!(root_ids(&tree), vec!["a", "b", "loadmore-root"]);
        assert!(tree.has_more(&ParentKey::Root));
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.version(), 1);
        assert_eq!(tree.cursor(&ParentKey::Root), Some(PageCursor::new(0, 2, 5, 2)));
    }

    #[test]
    fn test_append_moves_sentinel_and_drops_it_at_the_end() {
        let tree = TreeSnapshot::new().with_root(Page::new(entries(&["a", "b"]), 5), 0, 2);
        let tree = tree
            .merge_page(&ParentKey::Root, Page::new(entries(&["c", "d"]), 5), 0, 2, Merge::Append)
            .unwrap();
        assert_eq!(root_ids(&tree), vec!["a", "b", "c", "d", "loadmore-root"]);

        let tree = tree
            .merge_page(&ParentKey::Root, Page::new(entries(&["e"]), 5), 0, 2, Merge::Append)
            .unwrap();
        assert_eq!(root_ids(&tree), vec!["a", "b", "c", "d", "e"]);
        assert!(!tree.has_more(&ParentKey::Root));
        assert!(!tree.contains("loadmore-root"));
        assert_eq!(tree.version(), 3);
    }

    #[test]
    fn test_append_skips_duplicates() {
        let tree = TreeSnapshot::new().with_root(Page::new(entries(&["a", "b"]), 5), 0, 2);
        let tree = tree
            .merge_page(&ParentKey::Root, Page::new(entries(&["b", "c"]), 5), 0, 2, Merge::Append)
            .unwrap();
        assert_eq!(root_ids(&tree), vec!["a", "b", "c", "loadmore-root"]);
        // The repeated entry still used up a server position.
        assert_eq!(tree.cursor(&ParentKey::Root).unwrap().next_offset(), 4);
    }

    #[test]
    fn test_page_of_duplicates_only_advances_cursor() {
        let tree = TreeSnapshot::new().with_root(Page::new(entries(&["a", "b"]), 4), 0, 2);
        let tree = tree
            .merge_page(&ParentKey::Root, Page::new(entries(&["a", "b"]), 4), 0, 2, Merge::Append)
            .unwrap();
        assert_eq!(root_ids(&tree), vec!["a", "b"]);
        assert_eq!(tree.cursor(&ParentKey::Root), Some(PageCursor::new(0, 2, 4, 4)));
        assert!(!tree.has_more(&ParentKey::Root));
    }

    #[test]
    fn test_resource_listed_under_two_parents() {
        let tree = TreeSnapshot::new().with_root(Page::new(folders(&["dept-a", "dept-b"]), 2), 0, 10);
        let alice = || Page::new(entries(&["alice"]), 1);
        let tree = tree
            .merge_page(&ParentKey::from("dept-a"), alice(), 0, 10, Merge::Replace)
            .unwrap();
        let tree = tree
            .merge_page(&ParentKey::from("dept-b"), alice(), 0, 10, Merge::Replace)
            .unwrap();

        for dept in ["dept-a", "dept-b"] {
            let parent = ParentKey::from(dept);
            assert_eq!(level_ids(&tree, &parent), vec!["alice"]);
            assert!(!tree.has_more(&parent));
            assert_eq!(tree.cursor(&parent), Some(PageCursor::new(0, 10, 1, 1)));
        }
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.node("alice").unwrap().parent, ParentKey::from("dept-a"));

        let rows: Vec<String> = tree
            .visible_rows()
            .iter()
            .map(|r| r.node.id.to_string())
            .collect();
        assert_eq!(rows, vec!["dept-a", "alice", "dept-b", "alice"]);
    }

    #[test]
    fn test_resource_cannot_become_its_own_descendant() {
        let tree = TreeSnapshot::new().with_root(Page::new(folders(&["a", "b"]), 2), 0, 10);
        let tree = tree
            .merge_page(&ParentKey::from("a"), Page::new(folders(&["b"]), 1), 0, 10, Merge::Replace)
            .unwrap();
        let tree = tree
            .merge_page(&ParentKey::from("b"), Page::new(folders(&["a", "c"]), 2), 0, 10, Merge::Replace)
            .unwrap();

        assert_eq!(level_ids(&tree, &ParentKey::from("b")), vec!["c"]);
        assert_eq!(tree.visible_rows().len(), 5);
    }

    #[test]
    fn test_sentinels_are_kept_per_level() {
        // A resource called "root" pages independently of the root level.
        let tree = TreeSnapshot::new().with_root(Page::new(folders(&["root", "x"]), 3), 0, 2);
        let tree = tree
            .merge_page(&ParentKey::from("root"), Page::new(entries(&["r1", "r2"]), 4), 0, 2, Merge::Replace)
            .unwrap();
        assert!(tree.has_more(&ParentKey::Root));
        assert!(tree.has_more(&ParentKey::from("root")));

        let tree = tree
            .merge_page(&ParentKey::Root, Page::new(entries(&["loadmore-root"]), 3), 0, 2, Merge::Append)
            .unwrap();
        assert_eq!(root_ids(&tree), vec!["root", "x", "loadmore-root"]);
        assert!(!tree.has_more(&ParentKey::Root));
        assert!(!tree.node("loadmore-root").unwrap().is_sentinel());

        assert!(tree.has_more(&ParentKey::from("root")));
        assert_eq!(
            level_ids(&tree, &ParentKey::from("root")),
            vec!["r1", "r2", "loadmore-root"]
        );
        assert!(tree.sentinel(&ParentKey::from("root")).unwrap().is_sentinel());
    }

    #[test]
    fn test_untouched_nodes_are_shared_between_versions() {
        let page = Page::new(
            vec![
                ResourceEntry::new("x", "X").with_children(),
                ResourceEntry::new("y", "Y").with_children(),
            ],
            2,
        );
        let v1 = TreeSnapshot::new().with_root(page, 0, 10);
        let v2 = v1
            .merge_page(
                &ParentKey::from("x"),
                Page::new(entries(&["x1"]), 1),
                0,
                10,
                Merge::Replace,
            )
            .unwrap();

        assert!(Arc::ptr_eq(v1.node("y").unwrap(), v2.node("y").unwrap()));
        assert!(!Arc::ptr_eq(v1.node("x").unwrap(), v2.node("x").unwrap()));
        // The older version is not affected.
        assert_eq!(v1.node("x").unwrap().children, Some(Children::Unloaded));
        assert!(v2.node("x").unwrap().is_loaded());
        assert!(v2.is_expanded("x"));
    }

    #[test]
    fn test_empty_expand_makes_a_leaf() {
        let page = Page::new(
            vec![
                ResourceEntry::new("empty", "Empty").with_children(),
                ResourceEntry::new("never", "Never").with_children(),
            ],
            2,
        );
        let tree = TreeSnapshot::new().with_root(page, 0, 10);
        let tree = tree
            .merge_page(&ParentKey::from("empty"), Page::empty(), 0, 10, Merge::Replace)
            .unwrap();

        let empty = tree.node("empty").unwrap();
        assert!(empty.is_leaf());
        assert_eq!(empty.children, None);
        assert!(!tree.is_expanded("empty"));
        assert!(tree.cursor(&ParentKey::from("empty")).is_none());

        let never = tree.node("never").unwrap();
        assert_eq!(never.children, Some(Children::Unloaded));
    }

    #[test]
    fn test_merge_into_vanished_parent_is_ignored() {
        let tree = TreeSnapshot::new().with_root(Page::new(entries(&["a"]), 1), 0, 10);
        let merged = tree.merge_page(
            &ParentKey::from("gone"),
            Page::new(entries(&["g1"]), 1),
            0,
            10,
            Merge::Replace,
        );
        assert!(merged.is_none());
    }

    #[test]
    fn test_nested_form() {
        let page = Page::new(
            vec![
                ResourceEntry::new("f", "Folder").with_children(),
                ResourceEntry::new("d", "Doc").field("size", 12),
                ResourceEntry::new("u", "Unopened").with_children(),
            ],
            4,
        );
        let tree = TreeSnapshot::new().with_root(page, 0, 3);
        let tree = tree
            .merge_page(&ParentKey::from("f"), Page::new(entries(&["f1"]), 1), 0, 3, Merge::Replace)
            .unwrap();

        let nested = serde_json::to_value(tree.to_nested()).unwrap();
        assert_eq!(
            nested,
            json!([
                {"id": "f", "name": "Folder", "children": [{"id": "f1", "name": "F1"}]},
                {"id": "d", "name": "Doc", "size": 12},
                {"id": "u", "name": "Unopened", "children": []},
                {"id": "loadmore-root", "name": "Load more", "isLoadMore": true}
            ])
        );
    }

    #[test]
    fn test_visible_rows_follow_expansion() {
        let page = Page::new(vec![ResourceEntry::new("f", "Folder").with_children()], 1);
        let tree = TreeSnapshot::new().with_root(page, 0, 10);
        let tree = tree
            .merge_page(&ParentKey::from("f"), Page::new(entries(&["f1", "f2"]), 2), 0, 10, Merge::Replace)
            .unwrap();

        let rows: Vec<(String, usize)> = tree
            .visible_rows()
            .iter()
            .map(|r| (r.node.id.to_string(), r.depth))
            .collect();
        assert_eq!(
            rows,
            vec![("f".to_string(), 0), ("f1".to_string(), 1), ("f2".to_string(), 1)]
        );

        let collapsed = tree.set_expanded(&NodeId::from("f"), false).unwrap();
        assert_eq!(collapsed.visible_rows().len(), 1);
        assert_eq!(collapsed.child_ids(&ParentKey::from("f")).len(), 2);
        assert!(collapsed.set_expanded(&NodeId::from("f"), false).is_none());
    }
}
