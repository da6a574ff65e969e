//! Local and remote session state.
//!
//! Local login opens the credential table and yields the store key material;
//! remote login goes through a [`RemoteAuthenticator`]. When the engine needs
//! a remote session it asks [`SessionManager`] to authenticate, which asks
//! the attached [`CredentialPrompt`] for the password.

use async_trait::async_trait;
use log::{info, warn};
use std::sync::{Arc, RwLock};

use fieldbook_core::errors::{Error, Result};
use fieldbook_core::sync::{KeyProvider, SecretKey, SessionProvider};
use fieldbook_storage_sqlite::{CredentialTable, EncryptedStore, LocalUser};

use crate::remote::RemoteAuthenticator;

/// Asks the user for their password when a remote login is needed.
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    /// `None` when the user dismissed the prompt.
    async fn prompt_password(&self, username: &str) -> Option<String>;
}

pub struct SessionManager {
    store: Arc<EncryptedStore>,
    credentials: CredentialTable,
    authenticator: Arc<dyn RemoteAuthenticator>,
    prompt: RwLock<Option<Arc<dyn CredentialPrompt>>>,
    local_user: RwLock<Option<LocalUser>>,
}

impl SessionManager {
    pub fn new(store: Arc<EncryptedStore>, authenticator: Arc<dyn RemoteAuthenticator>) -> Self {
        Self {
            credentials: CredentialTable::new(store.clone()),
            store,
            authenticator,
            prompt: RwLock::new(None),
            local_user: RwLock::new(None),
        }
    }

    pub fn set_prompt(&self, prompt: Arc<dyn CredentialPrompt>) {
        let mut current = self.prompt.write().unwrap_or_else(|poisoned| {
            warn!("[Session] Prompt lock poisoned; replacing prompt anyway");
            poisoned.into_inner()
        });
        *current = Some(prompt);
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<()> {
        self.credentials.register(username, password).await?;
        Ok(())
    }

    /// Opens the local session. Returns `false` on unknown user or wrong
    /// password.
    pub fn login_locally(&self, username: &str, password: &str) -> Result<bool> {
        let Some(user) = self.credentials.login(username, password)? else {
            return Ok(false);
        };
        let mut current = self
            .local_user
            .write()
            .map_err(|_| Error::Session("session lock poisoned".to_string()))?;
        *current = Some(user);
        info!("[Session] Local session opened for '{}'", username);
        Ok(true)
    }

    /// Remote login. Failures are logged and reported as `false`.
    pub async fn login_online(&self, username: &str, password: &str) -> bool {
        match self.authenticator.login(username, password).await {
            Ok(()) => {
                info!("[Session] Remote session opened for '{}'", username);
                true
            }
            Err(err) => {
                warn!("[Session] Remote login failed for '{}': {}", username, err);
                false
            }
        }
    }

    /// Ends both sessions. With `clear_data` the whole local store is wiped,
    /// credential table included.
    pub async fn logout(&self, clear_data: bool) -> Result<()> {
        if clear_data {
            self.store.clear().await?;
            info!("[Session] Local data cleared");
        }
        let mut current = self.local_user.write().unwrap_or_else(|poisoned| {
            warn!("[Session] Session lock poisoned; dropping the local user anyway");
            poisoned.into_inner()
        });
        *current = None;
        drop(current);
        self.authenticator.logout();
        Ok(())
    }

    pub fn current_username(&self) -> Option<String> {
        self.local_user
            .read()
            .ok()
            .and_then(|user| user.as_ref().map(|u| u.username.clone()))
    }

    fn current_prompt(&self) -> Option<Arc<dyn CredentialPrompt>> {
        self.prompt.read().ok().and_then(|prompt| prompt.clone())
    }
}

impl KeyProvider for SessionManager {
    fn current_secret_key(&self) -> Option<SecretKey> {
        self.local_user
            .read()
            .ok()
            .and_then(|user| user.as_ref().map(LocalUser::secret))
    }
}

#[async_trait]
impl SessionProvider for SessionManager {
    fn is_remote_authenticated(&self) -> bool {
        self.authenticator.is_authenticated()
    }

    async fn attempt_remote_authentication(&self) -> bool {
        if self.is_remote_authenticated() {
            return true;
        }
        let Some(username) = self.current_username() else {
            return false;
        };
        let Some(prompt) = self.current_prompt() else {
            return false;
        };
        let Some(password) = prompt.prompt_password(&username).await else {
            info!("[Session] Remote login prompt dismissed");
            return false;
        };
        self.login_online(&username, &password).await
    }

    fn invalidate_remote_session(&self) {
        warn!("[Session] Remote session rejected by server; logging out remotely");
        self.authenticator.logout();
    }
}
