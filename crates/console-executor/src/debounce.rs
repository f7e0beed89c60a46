//! Trailing-edge debouncing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Delays submissions and lets only the last one in a burst through.
///
/// Each `submit` replaces whatever was pending. A submission fires once
/// `delay` has passed without a newer one arriving.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    latest: Arc<AtomicU64>,
}

impl Debouncer {
    /// Create a new debouncer.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            latest: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait out the quiet period.
    ///
    /// Resolves to `Some(input)` if this is still the latest submission,
    /// `None` if it was replaced.
    pub async fn submit<T>(&self, input: T) -> Option<T> {
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        (self.latest.load(Ordering::SeqCst) == ticket).then_some(input)
    }

    /// Drop whatever is pending.
    pub fn cancel(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }
}
