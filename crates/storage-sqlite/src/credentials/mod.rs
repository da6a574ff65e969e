//! Local credential table.
//!
//! Lives under the reserved `__users` key as a JSON map of username to a
//! blob sealed with key material derived from that user's password, so a
//! user can only be opened by whoever knows the password. `clear()` on the
//! store wipes it together with the records.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use fieldbook_core::errors::{Error, Result};
use fieldbook_core::sync::SecretKey;

use crate::crypto::{generate_secret, open, seal, sha256_hex, StoreKey};
use crate::store::EncryptedStore;

pub const USERS_KEY: &str = "__users";

/// A locally registered user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalUser {
    pub username: String,
    /// Hex SHA-256 of the password.
    pub password_hash: String,
    secret_key: String,
}

impl LocalUser {
    /// Store key material for this user's records.
    pub fn secret(&self) -> SecretKey {
        SecretKey::new(self.secret_key.clone())
    }
}

impl fmt::Debug for LocalUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalUser")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

fn blob_key(username: &str, password: &str) -> Result<StoreKey> {
    StoreKey::derive(&SecretKey::new(format!(
        "{}:{}",
        username,
        sha256_hex(password)
    )))
}

pub struct CredentialTable {
    store: Arc<EncryptedStore>,
    write_lock: Mutex<()>,
}

impl CredentialTable {
    pub fn new(store: Arc<EncryptedStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        match self.store.get_sealed(USERS_KEY)? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| Error::decryption(format!("credential table is corrupted: {}", e))),
            None => Ok(BTreeMap::new()),
        }
    }

    async fn save(&self, users: &BTreeMap<String, String>) -> Result<()> {
        let raw = serde_json::to_string(users)?;
        self.store.put_sealed(USERS_KEY, raw).await
    }

    /// Registers a new user with a fresh random store secret.
    pub async fn register(&self, username: &str, password: &str) -> Result<LocalUser> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(Error::Session(
                "username and password must not be empty".to_string(),
            ));
        }
        let _guard = self.write_lock.lock().await;
        let mut users = self.load()?;
        if users.contains_key(username) {
            return Err(Error::Session(format!(
                "user '{}' is already registered",
                username
            )));
        }

        let user = LocalUser {
            username: username.to_string(),
            password_hash: sha256_hex(password),
            secret_key: generate_secret(),
        };
        let blob = seal(
            &blob_key(username, password)?,
            &serde_json::to_vec(&user)?,
        )?;
        users.insert(username.to_string(), blob);
        self.save(&users).await?;
        info!("[Session] Registered local user '{}'", username);
        Ok(user)
    }

    /// Opens a user's entry. Unknown users and wrong passwords both yield
    /// `None`.
    pub fn login(&self, username: &str, password: &str) -> Result<Option<LocalUser>> {
        let users = self.load()?;
        let Some(blob) = users.get(username) else {
            debug!("[Session] No local user '{}'", username);
            return Ok(None);
        };
        let Ok(bytes) = open(&blob_key(username, password)?, blob) else {
            debug!("[Session] Local login rejected for '{}'", username);
            return Ok(None);
        };
        let user: LocalUser = serde_json::from_slice(&bytes)
            .map_err(|e| Error::decryption(format!("credential entry is corrupted: {}", e)))?;
        if user.username != username || user.password_hash != sha256_hex(password) {
            return Ok(None);
        }
        Ok(Some(user))
    }

    pub fn contains(&self, username: &str) -> Result<bool> {
        Ok(self.load()?.contains_key(username))
    }

    pub fn usernames(&self) -> Result<Vec<String>> {
        Ok(self.load()?.into_keys().collect())
    }

    pub async fn remove(&self, username: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut users = self.load()?;
        if users.remove(username).is_none() {
            return Ok(false);
        }
        self.save(&users).await?;
        Ok(true)
    }
}
