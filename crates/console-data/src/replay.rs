//! In-memory transport answering from a script.
//!
//! Used by tests and by the CLI's offline replay mode. Routes match on
//! method and path; every call is recorded for later inspection.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use console_core::{ApiRequest, Method, RawResponse, Transport, TransportFailure};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DataError;

type Responder = Arc<dyn Fn(&ApiRequest) -> Result<RawResponse, TransportFailure> + Send + Sync>;

/// A call seen by the scripted transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub query: BTreeMap<String, String>,
    /// Bearer token sent with the call, if any.
    pub token: Option<String>,
}

/// One canned response, as stored in a replay script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedRoute {
    pub method: Method,
    pub path: String,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub delay_ms: u64,
}

fn default_status() -> u16 {
    200
}

struct Route {
    responder: Responder,
    delay: Duration,
}

/// Transport serving scripted responses. Unknown routes answer 404.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    routes: Arc<Mutex<HashMap<(Method, String), Route>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load routes from a JSON array of `ScriptedRoute`.
    pub fn from_json(json: &str) -> Result<Self, DataError> {
        let routes: Vec<ScriptedRoute> = serde_json::from_str(json)?;
        let transport = Self::new();
        for route in routes {
            transport.insert(
                route.method,
                route.path,
                Duration::from_millis(route.delay_ms),
                Arc::new(move |_: &ApiRequest| {
                    Ok::<_, TransportFailure>(RawResponse::new(route.status, route.body.clone()))
                }),
            );
        }
        Ok(transport)
    }

    /// Always answer `method path` with `status` and `body`.
    pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        self.respond_with(method, path, move |_| Ok(RawResponse::new(status, body.clone())))
    }

    /// Answer `method path` by calling `responder` with the request.
    pub fn respond_with<F>(&self, method: Method, path: &str, responder: F) -> &Self
    where
        F: Fn(&ApiRequest) -> Result<RawResponse, TransportFailure> + Send + Sync + 'static,
    {
        self.insert(method, path.to_string(), Duration::ZERO, Arc::new(responder));
        self
    }

    /// Fail every call to `method path`.
    pub fn fail(&self, method: Method, path: &str, failure: TransportFailure) -> &Self {
        self.respond_with(method, path, move |_| Err(failure.clone()))
    }

    /// Delay every answer on `method path`.
    pub fn delay(&self, method: Method, path: &str, delay: Duration) -> &Self {
        if let Some(route) = lock(&self.routes).get_mut(&(method, path.to_string())) {
            route.delay = delay;
        }
        self
    }

    fn insert(&self, method: Method, path: String, delay: Duration, responder: Responder) {
        lock(&self.routes).insert((method, path), Route { responder, delay });
    }

    /// Every call so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Number of calls to `path`, any method.
    pub fn call_count(&self, path: &str) -> usize {
        lock(&self.calls).iter().filter(|c| c.path == path).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn call(&self, request: &ApiRequest) -> Result<RawResponse, TransportFailure> {
        let token = request
            .headers
            .get("Authorization")
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_string);
        lock(&self.calls).push(RecordedCall {
            method: request.method,
            path: request.path.clone(),
            query: request.query.clone(),
            token,
        });

        let route = lock(&self.routes)
            .get(&(request.method, request.path.clone()))
            .map(|r| (Arc::clone(&r.responder), r.delay));
        let Some((responder, delay)) = route else {
            return Ok(RawResponse::new(404, Value::Null));
        };

        if !delay.is_zero() {
            if delay >= request.timeout {
                tokio::time::sleep(request.timeout).await;
                return Err(TransportFailure::Timeout {
                    after: request.timeout,
                });
            }
            tokio::time::sleep(delay).await;
        }
        responder(request)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
