//! Lazy hierarchical resource tree.
//!
//! A partially materialized view of a server-paginated, optionally nested
//! collection. Levels are fetched on expand, further pages through a
//! synthetic "load more" sentinel at the end of each level, and a keyword
//! search discards the whole tree.
//!
//! - `TreeSnapshot` - Immutable arena published after every change
//! - `LazyTree` - Async controller driving a `TreeDataSource`
//!
//! ```ignore
//! let tree = LazyTree::new(source);
//! tree.load_root(RootQuery::new(ResourceDescriptor::new("/api/resource-types"), 50)).await?;
//! tree.expand("folders").await?;
//! tree.load_more(ParentKey::Root).await?;
//! let rows = tree.snapshot().visible_rows();
//! ```

mod controller;
mod cursor;
mod error;
mod node;
mod snapshot;
mod source;

pub use controller::{LazyTree, LoadOutcome, RootQuery};
pub use cursor::PageCursor;
pub use error::TreeError;
pub use node::{Children, NodeId, ParentKey, TreeNode, SENTINEL_PREFIX};
pub use snapshot::{NestedNode, TreeSnapshot, VisibleRow};
pub use source::{Page, PageRequest, ResourceDescriptor, ResourceEntry, TreeDataSource};
