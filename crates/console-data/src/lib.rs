//! Data access for the admin console.
//!
//! This crate provides:
//! - `ReqwestTransport` - The HTTP transport adapter
//! - `ScriptedTransport` - In-memory transport for tests and offline replay
//! - `ConsoleClient` - Guardian, cache and notifier composed over a transport
//! - `HttpCredentialProvider` - Refresh-token exchange over the transport
//! - `HttpTreeSource` - Paginated resource listings for `LazyTree`

mod client;
mod credentials;
mod error;
mod http;
mod replay;
mod tree_source;

pub use client::{ConsoleClient, ConsoleClientBuilder};
pub use credentials::HttpCredentialProvider;
pub use error::DataError;
pub use http::ReqwestTransport;
pub use replay::{RecordedCall, ScriptedRoute, ScriptedTransport};
pub use tree_source::HttpTreeSource;
