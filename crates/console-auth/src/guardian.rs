//! Single-flight credential refresh with request replay.
//!
//! The guardian is `Idle` until some request comes back auth-expired. That
//! request leads a refresh cycle (`Refreshing`); every other request that
//! comes back auth-expired meanwhile parks a waiter in the queue. When the
//! refresh settles the state returns to `Idle` first, then the queue is
//! drained exactly once: on success each waiter re-executes its own request
//! with the new credential, on failure each waiter is rejected and the
//! provider hears about the dead session once.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use console_core::{ApiError, Notice, Notifier};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::credentials::CredentialProvider;

/// Guardian settings.
#[derive(Debug, Clone)]
pub struct GuardianConfig {
    /// Refresh cycles one call may go through before it is rejected.
    pub max_refresh_cycles: u32,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            max_refresh_cycles: 2,
        }
    }
}

impl From<&console_core::AuthConfig> for GuardianConfig {
    fn from(config: &console_core::AuthConfig) -> Self {
        Self {
            max_refresh_cycles: config.max_refresh_cycles.max(1),
        }
    }
}

/// Refresh state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardianState {
    Idle,
    Refreshing,
}

/// Snapshot of guardian counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GuardianStats {
    /// Calls made to the credential provider's refresh.
    pub refresh_cycles: u64,
    pub refresh_failures: u64,
    /// Requests re-executed after a credential change.
    pub replays: u64,
    /// Requests that waited on another request's refresh.
    pub queued: u64,
}

#[derive(Default)]
struct Counters {
    refresh_cycles: AtomicU64,
    refresh_failures: AtomicU64,
    replays: AtomicU64,
    queued: AtomicU64,
}

/// How a waiter is released.
#[derive(Debug, Clone)]
enum Wake {
    Resume,
    Fail(String),
    /// The leading request was dropped mid-refresh; try to lead a new cycle.
    Abandoned,
}

struct GuardState {
    refreshing: bool,
    waiters: Vec<oneshot::Sender<Wake>>,
    /// Bumped on every successful refresh.
    epoch: u64,
}

enum Role {
    Replay,
    Wait(oneshot::Receiver<Wake>),
    Lead,
}

/// Absorbs auth-expired failures behind one refresh per storm.
pub struct SessionGuardian {
    credentials: Arc<dyn CredentialProvider>,
    notifier: Option<Arc<dyn Notifier>>,
    config: GuardianConfig,
    state: Mutex<GuardState>,
    counters: Counters,
}

impl SessionGuardian {
    /// Create a new guardian.
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            credentials,
            notifier: None,
            config: GuardianConfig::default(),
            state: Mutex::new(GuardState {
                refreshing: false,
                waiters: Vec::new(),
                epoch: 0,
            }),
            counters: Counters::default(),
        }
    }

    /// Set the guardian configuration.
    pub fn with_config(mut self, config: GuardianConfig) -> Self {
        self.config = config;
        self
    }

    /// Also raise `Notice::ReauthenticationRequired` when a refresh fails.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialProvider> {
        &self.credentials
    }

    /// Run `request` with the current credential, refreshing and replaying on
    /// auth expiry.
    ///
    /// `request` performs one attempt with the token it is given and may be
    /// called again after a refresh. Any error other than
    /// `ApiError::AuthExpired` is returned as is.
    pub async fn execute<F, Fut, T>(&self, request: F) -> Result<T, ApiError>
    where
        F: Fn(Option<String>) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut cycles = 0u32;
        loop {
            let epoch = self.lock().epoch;
            let token = self.credentials.token();
            let err = match request(token).await {
                Err(err) if err.is_auth_expired() => err,
                other => return other,
            };

            if cycles >= self.config.max_refresh_cycles {
                tracing::warn!(cycles, error = %err, "credential still rejected after refresh");
                return Err(ApiError::TokenRefresh(format!(
                    "credential still rejected after {} refresh cycle(s)",
                    cycles
                )));
            }
            cycles += 1;

            self.await_fresh_credential(epoch).await?;
            self.counters.replays.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current state.
    pub fn state(&self) -> GuardianState {
        if self.lock().refreshing {
            GuardianState::Refreshing
        } else {
            GuardianState::Idle
        }
    }

    /// Number of requests parked behind the running refresh.
    pub fn queued(&self) -> usize {
        self.lock().waiters.len()
    }

    pub fn stats(&self) -> GuardianStats {
        GuardianStats {
            refresh_cycles: self.counters.refresh_cycles.load(Ordering::Relaxed),
            refresh_failures: self.counters.refresh_failures.load(Ordering::Relaxed),
            replays: self.counters.replays.load(Ordering::Relaxed),
            queued: self.counters.queued.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve once a credential newer than `seen_epoch` is available.
    async fn await_fresh_credential(&self, seen_epoch: u64) -> Result<(), ApiError> {
        loop {
            let role = {
                let mut state = self.lock();
                if state.epoch != seen_epoch {
                    // A refresh finished after this attempt was sent.
                    Role::Replay
                } else if state.refreshing {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push(tx);
                    self.counters.queued.fetch_add(1, Ordering::Relaxed);
                    Role::Wait(rx)
                } else {
                    state.refreshing = true;
                    Role::Lead
                }
            };

            match role {
                Role::Replay => return Ok(()),
                Role::Lead => return self.run_refresh().await,
                Role::Wait(rx) => match rx.await {
                    Ok(Wake::Resume) => return Ok(()),
                    Ok(Wake::Fail(reason)) => return Err(ApiError::TokenRefresh(reason)),
                    Ok(Wake::Abandoned) | Err(_) => continue,
                },
            }
        }
    }

    async fn run_refresh(&self) -> Result<(), ApiError> {
        let mut cycle = CycleGuard {
            guardian: self,
            armed: true,
        };
        self.counters.refresh_cycles.fetch_add(1, Ordering::Relaxed);
        tracing::info!("session credential expired, refreshing");

        let outcome = self.credentials.refresh_token().await;
        cycle.armed = false;

        match outcome {
            Ok(_) => {
                let released = self.finish_cycle(Wake::Resume, true);
                tracing::info!(released, "session credential refreshed");
                Ok(())
            }
            Err(err) => {
                let reason = err.to_string();
                let released = self.finish_cycle(Wake::Fail(reason.clone()), false);
                self.counters.refresh_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %err, released, "session credential refresh failed");

                self.credentials.on_token_expired();
                if let Some(notifier) = &self.notifier {
                    notifier.notify(Notice::ReauthenticationRequired);
                }
                Err(ApiError::TokenRefresh(reason))
            }
        }
    }

    /// Return to `Idle`, then release every waiter with `wake`.
    fn finish_cycle(&self, wake: Wake, refreshed: bool) -> usize {
        let waiters = {
            let mut state = self.lock();
            state.refreshing = false;
            if refreshed {
                state.epoch += 1;
            }
            std::mem::take(&mut state.waiters)
        };
        let released = waiters.len();
        for waiter in waiters {
            // A waiter whose caller went away has nothing to release.
            let _ = waiter.send(wake.clone());
        }
        released
    }
}

/// Releases the queue if the leading request is dropped mid-refresh.
struct CycleGuard<'a> {
    guardian: &'a SessionGuardian,
    armed: bool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let released = self.guardian.finish_cycle(Wake::Abandoned, false);
            tracing::debug!(released, "refresh cycle abandoned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct MockCredentials {
        token: Mutex<String>,
        refreshes: AtomicUsize,
        expired: AtomicUsize,
        fail: bool,
        first_delay: Duration,
        delay: Duration,
    }

    impl MockCredentials {
        fn new() -> Self {
            Self {
                token: Mutex::new("old".to_string()),
                refreshes: AtomicUsize::new(0),
                expired: AtomicUsize::new(0),
                fail: false,
                first_delay: Duration::from_millis(10),
                delay: Duration::from_millis(10),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl CredentialProvider for MockCredentials {
        fn token(&self) -> Option<String> {
            Some(self.token.lock().unwrap().clone())
        }

        async fn refresh_token(&self) -> Result<String, AuthError> {
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst);
            let delay = if n == 0 { self.first_delay } else { self.delay };
            tokio::time::sleep(delay).await;
            if self.fail {
                return Err(AuthError::RefreshRejected("refresh token revoked".into()));
            }
            *self.token.lock().unwrap() = "new".to_string();
            Ok("new".to_string())
        }

        fn on_token_expired(&self) {
            self.expired.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct CountingNotifier(AtomicUsize);

    impl Notifier for CountingNotifier {
        fn notify(&self, notice: Notice) {
            assert_eq!(notice, Notice::ReauthenticationRequired);
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn expired() -> ApiError {
        ApiError::AuthExpired {
            code: "TOKEN_EXPIRED".into(),
        }
    }

    /// Accepts only the refreshed credential.
    async fn protected(token: Option<String>, id: usize) -> Result<usize, ApiError> {
        tokio::task::yield_now().await;
        match token.as_deref() {
            Some("new") => Ok(id),
            _ => Err(expired()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_without_refresh() {
        let creds = Arc::new(MockCredentials::new());
        let guardian = SessionGuardian::new(creds.clone());

        let result = guardian.execute(|_| async { Ok::<_, ApiError>(5) }).await;
        assert_eq!(result, Ok(5));
        assert_eq!(creds.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(guardian.state(), GuardianState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_storm_triggers_single_refresh_and_replays_all() {
        let creds = Arc::new(MockCredentials::new());
        let guardian = SessionGuardian::new(creds.clone());

        let calls = (0..8).map(|id| guardian.execute(move |token| protected(token, id)));
        let results = futures::future::join_all(calls).await;

        assert_eq!(creds.refreshes.load(Ordering::SeqCst), 1);
        let expected: Vec<Result<usize, ApiError>> = (0..8).map(Ok).collect();
        assert_eq!(results, expected);
        assert_eq!(guardian.state(), GuardianState::Idle);
        assert_eq!(guardian.queued(), 0);

        let stats = guardian.stats();
        assert_eq!(stats.refresh_cycles, 1);
        assert_eq!(stats.replays, 8);
        assert_eq!(stats.queued, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_rejects_everyone_and_notifies_once() {
        let creds = Arc::new(MockCredentials::failing());
        let notifier = Arc::new(CountingNotifier::default());
        let guardian = SessionGuardian::new(creds.clone()).with_notifier(notifier.clone());

        let calls = (0..5).map(|id| guardian.execute(move |token| protected(token, id)));
        let results = futures::future::join_all(calls).await;

        assert_eq!(creds.refreshes.load(Ordering::SeqCst), 1);
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(ApiError::TokenRefresh(_)))));
        assert_eq!(creds.expired.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
        assert_eq!(guardian.state(), GuardianState::Idle);
        assert_eq!(guardian.stats().refresh_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_auth_failures_bypass_guardian() {
        let creds = Arc::new(MockCredentials::new());
        let guardian = SessionGuardian::new(creds.clone());

        let unavailable = guardian
            .execute(|_| async {
                Err::<(), _>(ApiError::ServerUnavailable {
                    status: 503,
                    code: "503".into(),
                })
            })
            .await;
        assert!(unavailable.unwrap_err().is_server_unavailable());

        let offline = guardian
            .execute(|_| async {
                Err::<(), _>(ApiError::Transport(console_core::TransportFailure::Offline))
            })
            .await;
        assert!(offline.unwrap_err().is_transport());
        assert_eq!(creds.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_failure_after_refresh_replays_without_new_cycle() {
        let creds = Arc::new(MockCredentials::new());
        let guardian = SessionGuardian::new(creds.clone());

        // The slow request was sent with the old credential and only fails
        // after the fast request's refresh has already finished.
        let slow = guardian.execute(|token| async move {
            if token.as_deref() == Some("old") {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            protected(token, 1).await
        });
        let fast = guardian.execute(|token| protected(token, 2));

        let (slow, fast) = tokio::join!(slow, fast);
        assert_eq!((slow, fast), (Ok(1), Ok(2)));
        assert_eq!(creds.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_rejection_is_bounded() {
        let creds = Arc::new(MockCredentials::new());
        let guardian = SessionGuardian::new(creds.clone())
            .with_config(GuardianConfig { max_refresh_cycles: 2 });

        let result = guardian
            .execute(|_| async { Err::<(), _>(expired()) })
            .await;

        assert!(matches!(result, Err(ApiError::TokenRefresh(_))));
        assert_eq!(creds.refreshes.load(Ordering::SeqCst), 2);
        assert_eq!(guardian.state(), GuardianState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_cycle_hands_over_to_waiter() {
        let creds = Arc::new(MockCredentials {
            first_delay: Duration::from_secs(3600),
            ..MockCredentials::new()
        });
        let guardian = SessionGuardian::new(creds.clone());

        let leader = tokio::time::timeout(
            Duration::from_millis(5),
            guardian.execute(|token| protected(token, 1)),
        );
        let waiter = async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            guardian.execute(|token| protected(token, 2)).await
        };

        let (leader, waiter) = tokio::join!(leader, waiter);
        assert!(leader.is_err());
        assert_eq!(waiter, Ok(2));
        assert_eq!(creds.refreshes.load(Ordering::SeqCst), 2);
        assert_eq!(guardian.state(), GuardianState::Idle);
    }

    #[test]
    fn test_config_from_auth_section() {
        let auth = console_core::AuthConfig {
            max_refresh_cycles: 0,
            ..Default::default()
        };
        assert_eq!(GuardianConfig::from(&auth).max_refresh_cycles, 1);
    }
}
