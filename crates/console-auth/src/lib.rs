//! Session credential handling for the console request layer.
//!
//! Detects expired credentials, refreshes them once per storm of failures,
//! and replays every request that was waiting on the refresh.

mod credentials;
mod error;
mod guardian;
mod token;

pub use credentials::{CredentialProvider, RefreshFn, StaticCredentials};
pub use error::AuthError;
pub use guardian::{GuardianConfig, GuardianState, GuardianStats, SessionGuardian};
pub use token::{SessionTokens, TokenStore};
