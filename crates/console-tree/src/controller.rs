//! Async controller for a lazily loaded tree.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use console_executor::{Debouncer, Generation, RequestStream};
use serde::Serialize;
use tokio::sync::Mutex as LevelLock;

use crate::cursor::PageCursor;
use crate::error::TreeError;
use crate::node::{NodeId, ParentKey};
use crate::snapshot::{Merge, TreeSnapshot};
use crate::source::{PageRequest, ResourceDescriptor, TreeDataSource};

/// What an async tree operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadOutcome {
    /// A new snapshot was published.
    Applied,
    /// The result arrived after the tree it was meant for was discarded.
    Stale,
    /// Nothing needed to change.
    Unchanged,
}

impl LoadOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, LoadOutcome::Applied)
    }
}

/// The query behind the root level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootQuery {
    pub descriptor: ResourceDescriptor,
    pub offset: u64,
    /// Page size for every level.
    pub limit: u64,
    pub keyword: Option<String>,
}

impl RootQuery {
    pub fn new(descriptor: ResourceDescriptor, limit: u64) -> Self {
        Self {
            descriptor,
            offset: 0,
            limit,
            keyword: None,
        }
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Set the keyword. Blank keywords mean no filter.
    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        let keyword = keyword.into();
        self.keyword = (!keyword.trim().is_empty()).then_some(keyword);
        self
    }

    fn page(&self, parent: Option<NodeId>, offset: u64) -> PageRequest {
        PageRequest {
            descriptor: self.descriptor.clone(),
            parent,
            offset,
            limit: self.limit,
            keyword: self.keyword.clone(),
        }
    }
}

struct TreeState {
    snapshot: Arc<TreeSnapshot>,
    query: Option<RootQuery>,
    /// Generation of the root load that produced the current tree.
    generation: Generation,
}

/// Drives a `TreeDataSource` and publishes `TreeSnapshot`s.
///
/// Root loads are issued on a generation stream: starting a new root load
/// makes every outstanding root, expand and load-more result stale. Fetches
/// for the same level are serialized, so repeated `load_more` calls each see
/// the previous page's result.
pub struct LazyTree<S> {
    source: S,
    stream: RequestStream,
    debouncer: Option<Debouncer>,
    state: Mutex<TreeState>,
    levels: Mutex<HashMap<ParentKey, Arc<LevelLock<()>>>>,
}

impl<S: TreeDataSource> LazyTree<S> {
    /// Create a new tree over `source`.
    pub fn new(source: S) -> Self {
        Self::with_stream(source, RequestStream::new("tree"))
    }

    /// Create a tree whose root loads run on `stream`, e.g. one handed out
    /// by a view's `RequestCoordinator`.
    pub fn with_stream(source: S, stream: RequestStream) -> Self {
        let generation = stream.current();
        Self {
            source,
            stream,
            debouncer: None,
            state: Mutex::new(TreeState {
                snapshot: Arc::new(TreeSnapshot::new()),
                query: None,
                generation,
            }),
            levels: Mutex::new(HashMap::new()),
        }
    }

    /// Debounce `search` calls.
    pub fn with_search_debounce(mut self, delay: Duration) -> Self {
        self.debouncer = Some(Debouncer::new(delay));
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<TreeSnapshot> {
        Arc::clone(&self.lock().snapshot)
    }

    pub fn query(&self) -> Option<RootQuery> {
        self.lock().query.clone()
    }

    pub fn cursor(&self, parent: &ParentKey) -> Option<PageCursor> {
        self.lock().snapshot.cursor(parent)
    }

    /// Replace the whole tree with the first page of `query`.
    ///
    /// The tree is only replaced when the page arrives; until then the old
    /// tree stays visible but no longer accepts results.
    pub async fn load_root(&self, query: RootQuery) -> Result<LoadOutcome, TreeError> {
        let request = query.page(None, query.offset);
        let issued = self.stream.issue(self.source.fetch_page(&request)).await;
        let generation = issued.generation;
        let Some(result) = issued.fresh() else {
            return Ok(LoadOutcome::Stale);
        };

        let mut state = self.lock();
        if !self.stream.is_current(generation) {
            return Ok(LoadOutcome::Stale);
        }
        let page = match result {
            Ok(page) => page,
            Err(err) => {
                // The old tree stays and is owned by this generation now.
                state.generation = generation;
                return Err(err.into());
            }
        };
        let entries = page.entries.len();
        let total = page.total_count;
        state.snapshot = Arc::new(state.snapshot.with_root(page, query.offset, query.limit));
        state.query = Some(query);
        state.generation = generation;
        drop(state);

        self.levels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::debug!(%generation, entries, total, "root level loaded");
        Ok(LoadOutcome::Applied)
    }

    /// Re-run the root query with a new keyword, discarding the tree.
    ///
    /// With debouncing enabled, a call superseded by a later one within the
    /// quiet period returns `Stale` without fetching.
    pub async fn search(&self, keyword: impl Into<String>) -> Result<LoadOutcome, TreeError> {
        let keyword = keyword.into();
        if let Some(debouncer) = &self.debouncer {
            if debouncer.submit(()).await.is_none() {
                return Ok(LoadOutcome::Stale);
            }
        }
        let query = self
            .query()
            .ok_or_else(|| TreeError::NotLoaded(ParentKey::Root.to_string()))?;
        self.load_root(query.offset(0).keyword(keyword)).await
    }

    /// Fetch the first page of a node's children, or just show them if they
    /// are already loaded.
    pub async fn expand(&self, id: impl Into<NodeId>) -> Result<LoadOutcome, TreeError> {
        let id = id.into();
        let parent = ParentKey::Node(id.clone());
        let _level = self.level(&parent).lock_owned().await;

        let (query, generation) = {
            let mut state = self.lock();
            let query = state
                .query
                .clone()
                .ok_or_else(|| TreeError::NotLoaded(ParentKey::Root.to_string()))?;
            let node = state
                .snapshot
                .node(id.as_str())
                .ok_or_else(|| TreeError::UnknownNode(id.to_string()))?;
            if node.is_leaf() {
                return Ok(LoadOutcome::Unchanged);
            }
            if node.is_loaded() {
                return Ok(Self::publish(&mut state, |s| s.set_expanded(&id, true)));
            }
            (query, state.generation)
        };

        let request = query.page(Some(id.clone()), 0);
        let result = self.source.fetch_page(&request).await;
        if !self.stream.is_current(generation) {
            tracing::debug!(node = %id, %generation, "dropping stale expand");
            return Ok(LoadOutcome::Stale);
        }
        let page = result?;

        let mut state = self.lock();
        if !self.stream.is_current(generation) || !state.snapshot.contains(id.as_str()) {
            return Ok(LoadOutcome::Stale);
        }
        let outcome = Self::publish(&mut state, |s| {
            s.merge_page(&parent, page, 0, query.limit, Merge::Replace)
        });
        tracing::debug!(node = %id, ?outcome, "expanded");
        Ok(outcome)
    }

    /// Fetch the next page of a level.
    pub async fn load_more(&self, parent: impl Into<ParentKey>) -> Result<LoadOutcome, TreeError> {
        let parent = parent.into();
        let _level = self.level(&parent).lock_owned().await;

        let (query, cursor, generation) = {
            let state = self.lock();
            let query = state
                .query
                .clone()
                .ok_or_else(|| TreeError::NotLoaded(ParentKey::Root.to_string()))?;
            if let ParentKey::Node(id) = &parent {
                let node = state
                    .snapshot
                    .node(id.as_str())
                    .ok_or_else(|| TreeError::UnknownNode(id.to_string()))?;
                if node.is_leaf() {
                    return Ok(LoadOutcome::Unchanged);
                }
            }
            let cursor = state
                .snapshot
                .cursor(&parent)
                .ok_or_else(|| TreeError::NotLoaded(parent.to_string()))?;
            (query, cursor, state.generation)
        };
        if !cursor.has_more() {
            return Ok(LoadOutcome::Unchanged);
        }

        let request = query.page(parent.node_id().cloned(), cursor.next_offset());
        let result = self.source.fetch_page(&request).await;
        if !self.stream.is_current(generation) {
            tracing::debug!(parent = %parent, %generation, "dropping stale page");
            return Ok(LoadOutcome::Stale);
        }
        let page = result?;

        let mut state = self.lock();
        if !self.stream.is_current(generation) {
            return Ok(LoadOutcome::Stale);
        }
        let Some(cursor) = state.snapshot.cursor(&parent) else {
            return Ok(LoadOutcome::Stale);
        };
        let outcome = Self::publish(&mut state, |s| {
            s.merge_page(&parent, page, cursor.offset, cursor.limit, Merge::Append)
        });
        tracing::debug!(parent = %parent, offset = request.offset, ?outcome, "page loaded");
        Ok(outcome)
    }

    /// Hide a node's children. Fetched children are kept.
    pub fn collapse(&self, id: impl Into<NodeId>) -> Result<LoadOutcome, TreeError> {
        let id = id.into();
        let mut state = self.lock();
        if !state.snapshot.contains(id.as_str()) {
            return Err(TreeError::UnknownNode(id.to_string()));
        }
        Ok(Self::publish(&mut state, |s| s.set_expanded(&id, false)))
    }

    /// Generation of the latest root load.
    pub fn generation(&self) -> Generation {
        self.stream.current()
    }

    fn publish(
        state: &mut TreeState,
        update: impl FnOnce(&TreeSnapshot) -> Option<TreeSnapshot>,
    ) -> LoadOutcome {
        match update(&state.snapshot) {
            Some(next) => {
                state.snapshot = Arc::new(next);
                LoadOutcome::Applied
            }
            None => LoadOutcome::Unchanged,
        }
    }

    fn level(&self, parent: &ParentKey) -> Arc<LevelLock<()>> {
        let mut levels = self.levels.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(levels.entry(parent.clone()).or_default())
    }

    fn lock(&self) -> MutexGuard<'_, TreeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
