//! Generation-tagged request streams.
//!
//! A stream hands out a strictly increasing generation for every issued call.
//! When the call settles, its result is fresh only if no newer call was issued
//! on the same stream in the meantime. Nothing is cancelled; stale results are
//! simply reported as such and the caller drops them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Position of a call within its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Settled result of an issued call.
///
/// Rejections travel inside `value` and carry the same tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issued<T> {
    pub value: T,
    pub generation: Generation,
    pub stale: bool,
}

impl<T> Issued<T> {
    /// The value, if it may still be applied.
    pub fn fresh(self) -> Option<T> {
        (!self.stale).then_some(self.value)
    }

    pub fn is_fresh(&self) -> bool {
        !self.stale
    }
}

/// One logical query stream, e.g. "current resource-type listing".
#[derive(Debug, Clone)]
pub struct RequestStream {
    name: Arc<str>,
    counter: Arc<AtomicU64>,
}

impl RequestStream {
    /// Create a standalone stream.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The latest generation handed out.
    pub fn current(&self) -> Generation {
        Generation(self.counter.load(Ordering::SeqCst))
    }

    /// Check whether results tagged `generation` may still be applied.
    pub fn is_current(&self, generation: Generation) -> bool {
        self.current() == generation
    }

    /// Start a new generation without issuing a call.
    ///
    /// Every outstanding call becomes stale.
    pub fn invalidate(&self) -> Generation {
        let generation = Generation(self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        tracing::debug!(stream = %self.name, %generation, "stream invalidated");
        generation
    }

    /// Issue a call under a fresh generation.
    ///
    /// The generation is taken when `issue` is called, not when the returned
    /// future is first polled, so issuance order is call order.
    pub fn issue<Fut>(&self, call: Fut) -> impl Future<Output = Issued<Fut::Output>>
    where
        Fut: Future,
    {
        self.issue_with(move |_| call)
    }

    /// Like `issue`, but hands the generation to the call.
    pub fn issue_with<F, Fut>(&self, call: F) -> impl Future<Output = Issued<Fut::Output>>
    where
        F: FnOnce(Generation) -> Fut,
        Fut: Future,
    {
        let generation = Generation(self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        let stream = self.clone();
        let call = call(generation);
        async move {
            let value = call.await;
            let stale = !stream.is_current(generation);
            if stale {
                tracing::debug!(
                    stream = %stream.name,
                    %generation,
                    current = %stream.current(),
                    "dropping stale result"
                );
            }
            Issued {
                value,
                generation,
                stale,
            }
        }
    }
}

/// Owns the named streams of one view.
#[derive(Debug, Default)]
pub struct RequestCoordinator {
    streams: Mutex<HashMap<String, RequestStream>>,
}

impl RequestCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the stream for `name`, creating it on first use.
    pub fn stream(&self, name: &str) -> RequestStream {
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        streams
            .entry(name.to_string())
            .or_insert_with(|| RequestStream::new(name))
            .clone()
    }

    /// Drop a stream. Outstanding calls on it become stale and the next
    /// `stream(name)` starts from generation zero.
    pub fn teardown(&self, name: &str) -> bool {
        let removed = self
            .streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        match removed {
            Some(stream) => {
                stream.invalidate();
                true
            }
            None => false,
        }
    }

    /// Number of live streams.
    pub fn len(&self) -> usize {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
