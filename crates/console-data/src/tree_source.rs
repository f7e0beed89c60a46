//! Paginated resource listings over the console client.

use async_trait::async_trait;
use console_core::{ApiError, ApiRequest};
use console_tree::{Page, PageRequest, ResourceEntry, TreeDataSource};
use serde_json::{Map, Value};

use crate::client::ConsoleClient;

/// `TreeDataSource` backed by a listing endpoint.
///
/// Sends `GET <path>?offset=&limit=&keyword=&parentId=` and reads
/// `entries`/`totalCount`, also accepting `items` or `data` and `total`.
#[derive(Clone)]
pub struct HttpTreeSource {
    client: ConsoleClient,
    cached: bool,
}

impl HttpTreeSource {
    pub fn new(client: ConsoleClient) -> Self {
        Self {
            client,
            cached: false,
        }
    }

    /// Serve pages through the client's response cache.
    pub fn cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }
}

#[async_trait]
impl TreeDataSource for HttpTreeSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, ApiError> {
        let mut api = ApiRequest::get(request.descriptor.path.clone())
            .query("offset", request.offset)
            .query("limit", request.limit);
        for (key, value) in &request.descriptor.params {
            api = api.query(key.clone(), value);
        }
        if let Some(keyword) = &request.keyword {
            api = api.query("keyword", keyword);
        }
        if let Some(parent) = &request.parent {
            api = api.query("parentId", parent);
        }

        let body = if self.cached {
            self.client.send_cached(api).await?
        } else {
            self.client.send(api).await?
        };
        parse_page(&body, request.offset)
    }
}

fn parse_page(body: &Value, offset: u64) -> Result<Page, ApiError> {
    let payload = body.get("data").filter(|d| d.is_object()).unwrap_or(body);
    let entries = ["entries", "items", "data"]
        .iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_array))
        .or_else(|| payload.as_array())
        .ok_or_else(|| ApiError::Decode("listing has no entries array".into()))?;

    let entries = entries
        .iter()
        .map(parse_entry)
        .collect::<Result<Vec<_>, _>>()?;
    // Without a total the page is taken to be the last one.
    let total = ["totalCount", "total"]
        .iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_u64))
        .unwrap_or(offset + entries.len() as u64);
    Ok(Page::new(entries, total))
}

fn parse_entry(value: &Value) -> Result<ResourceEntry, ApiError> {
    let object = value
        .as_object()
        .ok_or_else(|| ApiError::Decode(format!("entry is not an object: {}", value)))?;
    let id = match object.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(ApiError::Decode(format!("entry has no id: {}", value))),
    };
    let name = object
        .get("name")
        .and_then(Value::as_str)
        .map_or_else(|| id.clone(), str::to_string);
    let has_children = match (object.get("hasChildren"), object.get("isLeaf")) {
        (Some(Value::Bool(has)), _) => *has,
        (_, Some(Value::Bool(leaf))) => !leaf,
        _ => false,
    };
    let fields: Map<String, Value> = object
        .iter()
        .filter(|(k, _)| !matches!(k.as_str(), "id" | "name" | "hasChildren" | "isLeaf"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(ResourceEntry {
        id,
        name,
        has_children,
        fields,
    })
}
