//! Response caching for console read endpoints.
//!
//! This crate provides:
//! - `CacheKey` - Structural key over method, path, body and query
//! - `TtlCache` - Single-flight cache with timer-driven eviction
//! - `CacheStats` - Hit/miss/eviction counters
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use console_cache::{CacheKey, Ttl, TtlCache};
//!
//! let cache: TtlCache<Value, ApiError> = TtlCache::new();
//! let key = CacheKey::from_request(&request);
//!
//! // Concurrent identical calls share one in-flight producer.
//! let roles = cache
//!     .wrap(key, Ttl::After(Duration::from_secs(60)), move || client.send(request))
//!     .await?;
//! ```

mod key;
mod ttl;

pub use key::*;
pub use ttl::*;
