//! Session capabilities consumed by the store and the sync engine.

use async_trait::async_trait;
use std::fmt;

/// Key material of the locally authenticated user.
///
/// Held only in memory and handed to the store per call; never persisted by
/// the store or the engine.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Source of the current store key. `None` when no local session exists.
pub trait KeyProvider: Send + Sync {
    fn current_secret_key(&self) -> Option<SecretKey>;
}

impl KeyProvider for SecretKey {
    fn current_secret_key(&self) -> Option<SecretKey> {
        if self.is_empty() {
            None
        } else {
            Some(self.clone())
        }
    }
}

/// Snapshot of the session state at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub local_user_present: bool,
    pub remote_session_authenticated: bool,
    pub secret_key: Option<SecretKey>,
}

/// Local and remote authentication state as seen by the sync engine.
#[async_trait]
pub trait SessionProvider: KeyProvider {
    fn local_user_present(&self) -> bool {
        self.current_secret_key().is_some()
    }

    fn is_remote_authenticated(&self) -> bool;

    /// Runs the on-demand remote login (which may prompt the user).
    /// Returns whether the remote session is authenticated afterwards.
    async fn attempt_remote_authentication(&self) -> bool;

    /// Called when the remote side rejected the session credentials.
    fn invalidate_remote_session(&self) {}

    fn context(&self) -> SessionContext {
        let secret_key = self.current_secret_key();
        SessionContext {
            local_user_present: secret_key.is_some(),
            remote_session_authenticated: self.is_remote_authenticated(),
            secret_key,
        }
    }
}
