//! Supersedable request execution.
//!
//! This crate keeps views from applying out-of-date results:
//! - `RequestCoordinator` - Named streams with generation counters
//! - `RequestStream` - Tags each issued call with its generation
//! - `Debouncer` - Replace-on-arrival delay for keystroke-driven queries

mod debounce;
mod generation;

pub use debounce::*;
pub use generation::*;
