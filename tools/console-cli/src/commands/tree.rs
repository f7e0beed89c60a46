//! Load a resource hierarchy level by level.

use anyhow::{Context as _, Result};
use console_sdk::prelude::{
    HttpTreeSource, LazyTree, LoadOutcome, NodeId, ParentKey, ResourceDescriptor, RootQuery,
    TreeDataSource, VisibleRow,
};
use indicatif::ProgressBar;

use super::{parse_pairs, TreeArgs};
use crate::context::Context;

/// Run the tree command.
pub async fn run(args: TreeArgs, ctx: &Context) -> Result<()> {
    let query = root_query(&args, ctx.config.tree.page_size)?;
    let client = ctx.client()?;
    // One query per invocation, so searches are not debounced here.
    let tree = LazyTree::new(HttpTreeSource::new(client.clone()));

    let spinner = ctx.output.spinner(&format!("Loading {}", args.path));
    load(&tree, &args, query, &spinner).await?;
    spinner.finish_and_clear();

    let snapshot = tree.snapshot();
    if ctx.output.is_json() {
        ctx.output.json(&snapshot.to_nested());
    } else {
        for row in snapshot.visible_rows() {
            let (marker, label) = describe(&row);
            ctx.output.tree_row(row.depth, marker, &label);
        }
    }
    ctx.output.debug(&format!(
        "{} node(s) loaded, snapshot version {}",
        snapshot.len(),
        snapshot.version()
    ));
    client.shutdown();
    Ok(())
}

/// The root query for the command line, keyword included.
fn root_query(args: &TreeArgs, default_page_size: u64) -> Result<RootQuery> {
    let mut descriptor = ResourceDescriptor::new(args.path.clone());
    for (key, value) in parse_pairs(&args.param)? {
        descriptor = descriptor.param(key, value);
    }
    let page_size = args.page_size.unwrap_or(default_page_size).max(1);
    let mut query = RootQuery::new(descriptor, page_size);
    if let Some(keyword) = &args.keyword {
        query = query.keyword(keyword.clone());
    }
    Ok(query)
}

/// Load the root level, then expand down to the requested depth.
async fn load<S: TreeDataSource>(
    tree: &LazyTree<S>,
    args: &TreeArgs,
    query: RootQuery,
    spinner: &ProgressBar,
) -> Result<()> {
    tree.load_root(query)
        .await
        .with_context(|| format!("Failed to load {}", args.path))?;
    if args.all_pages {
        drain(tree, ParentKey::Root).await?;
    }

    let mut frontier: Vec<NodeId> = tree.snapshot().child_ids(&ParentKey::Root).to_vec();
    for level in 1..args.depth {
        spinner.set_message(format!("Expanding level {}", level + 1));
        let mut next = Vec::new();
        for id in frontier {
            let expandable = tree
                .snapshot()
                .node(id.as_str())
                .is_some_and(|node| !node.is_leaf());
            if !expandable {
                continue;
            }
            tree.expand(id.clone())
                .await
                .with_context(|| format!("Failed to expand {}", id))?;
            let parent = ParentKey::Node(id);
            if args.all_pages {
                drain(tree, parent.clone()).await?;
            }
            next.extend(tree.snapshot().child_ids(&parent).iter().cloned());
        }
        frontier = next;
    }
    Ok(())
}

/// Follow "load more" on a level until it is complete.
async fn drain<S: TreeDataSource>(tree: &LazyTree<S>, parent: ParentKey) -> Result<()> {
    loop {
        let outcome = tree
            .load_more(parent.clone())
            .await
            .with_context(|| format!("Failed to load more under {}", parent))?;
        if outcome != LoadOutcome::Applied {
            return Ok(());
        }
    }
}

fn describe(row: &VisibleRow) -> (&'static str, String) {
    let node = &row.node;
    if node.is_sentinel() {
        return ("…", "load more".to_string());
    }
    let marker = if node.is_leaf() {
        "•"
    } else if row.expanded {
        "▾"
    } else {
        "▸"
    };
    let label = if node.name == node.id.as_str() {
        node.name.clone()
    } else {
        format!("{} ({})", node.name, node.id)
    };
    (marker, label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use console_sdk::prelude::{ConsoleClient, Method, RawResponse, ScriptedTransport};
    use serde_json::json;
    use std::sync::Arc;

    fn args(keyword: Option<&str>, depth: usize) -> TreeArgs {
        TreeArgs {
            path: "/api/resources".to_string(),
            keyword: keyword.map(str::to_string),
            param: vec!["type=iam".to_string()],
            depth,
            page_size: Some(10),
            all_pages: false,
        }
    }

    fn backend() -> ScriptedTransport {
        let transport = ScriptedTransport::new();
        transport.respond_with(Method::Get, "/api/resources", |request| {
            let body = match request.query.get("parentId").map(String::as_str) {
                None => json!({
                    "entries": [{"id": "admins", "name": "Admins", "hasChildren": true}],
                    "totalCount": 1
                }),
                Some(_) => json!({"entries": [{"id": "alice", "name": "Alice"}], "totalCount": 1}),
            };
            Ok(RawResponse::new(200, body))
        });
        transport
    }

    #[tokio::test]
    async fn test_keyword_goes_out_with_the_single_root_request() {
        let transport = backend();
        let tree = LazyTree::new(HttpTreeSource::new(
            ConsoleClient::builder(Arc::new(transport.clone())).build(),
        ));
        let args = args(Some("adm"), 1);

        let query = root_query(&args, 50).unwrap();
        load(&tree, &args, query, &ProgressBar::hidden()).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].query.get("keyword").map(String::as_str), Some("adm"));
        assert_eq!(calls[0].query.get("type").map(String::as_str), Some("iam"));
        assert_eq!(tree.query().unwrap().keyword.as_deref(), Some("adm"));
    }

    #[tokio::test]
    async fn test_depth_expands_each_level() {
        let transport = backend();
        let tree = LazyTree::new(HttpTreeSource::new(
            ConsoleClient::builder(Arc::new(transport.clone())).build(),
        ));
        let args = args(None, 2);

        let query = root_query(&args, 50).unwrap();
        load(&tree, &args, query, &ProgressBar::hidden()).await.unwrap();

        let rows: Vec<(String, usize)> = tree
            .snapshot()
            .visible_rows()
            .iter()
            .map(|row| (row.node.id.to_string(), row.depth))
            .collect();
        assert_eq!(rows, [("admins".to_string(), 0), ("alice".to_string(), 1)]);
        assert!(transport.calls().iter().all(|c| !c.query.contains_key("keyword")));
    }

    #[test]
    fn test_root_query_falls_back_to_configured_page_size() {
        let mut args = args(Some("  "), 1);
        args.page_size = None;
        let query = root_query(&args, 25).unwrap();
        assert_eq!(query.limit, 25);
        assert_eq!(query.keyword, None);
    }
}
