//! Observability for the admin console request layer.
//!
//! This crate provides:
//! - `init_logging` - tracing subscriber setup from the logging config
//! - `TracingNotifier` / `RecordingNotifier` / `FanoutNotifier` - notice sinks

mod logging;
mod notify;

pub use logging::*;
pub use notify::*;
