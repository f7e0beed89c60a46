//! User-facing notices raised by the request layer.

use serde::Serialize;

/// A notice for the global notification surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    /// One per failing call; not deduplicated.
    ServerUnavailable {
        path: String,
        status: u16,
        code: String,
    },
    /// One per failed refresh cycle.
    ReauthenticationRequired,
}

/// Sink for notices.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Notifier that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notice: Notice) {}
}
