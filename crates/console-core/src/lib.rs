//! Core abstractions for the admin console request layer.
//!
//! This crate provides the fundamental types and traits:
//! - `ApiRequest` / `RawResponse` - Typed request and response values
//! - `Transport` trait - The single edge where network calls happen
//! - `ApiError` / `ErrorKind` - Closed error taxonomy
//! - `ErrorClassifier` - Normalization of response error codes
//! - `Notifier` - Global user-facing notices
//! - `ConsoleConfig` - Workspace-wide configuration

mod classify;
mod config;
mod error;
mod notify;
mod request;
mod response;
mod transport;

pub use classify::*;
pub use config::*;
pub use error::*;
pub use notify::*;
pub use request::*;
pub use response::*;
pub use transport::*;
