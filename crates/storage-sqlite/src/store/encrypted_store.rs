//! Key-value store that seals every value with the caller's key.

use log::warn;
use std::sync::Arc;

use fieldbook_core::errors::{Error, Result};
use fieldbook_core::sync::SecretKey;

use super::{KvBackend, MemoryBackend};
use crate::crypto::{open, seal, store_namespace, StoreKey};

/// Keys with this prefix hold non-record data (e.g. the credential table).
pub const RESERVED_KEY_PREFIX: &str = "__";

pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with(RESERVED_KEY_PREFIX)
}

/// Separates a holder's namespace from the record key in the backend.
const NAMESPACE_SEPARATOR: char = '/';

fn ensure_record_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::encryption("store key must not be empty"));
    }
    if is_reserved_key(key) {
        return Err(Error::encryption(format!(
            "'{}' is a reserved store key",
            key
        )));
    }
    Ok(())
}

fn scoped_key(namespace: &str, key: &str) -> String {
    format!("{}{}{}", namespace, NAMESPACE_SEPARATOR, key)
}

/// Encrypted key-value store.
///
/// Keys are opaque strings. Plaintext bytes are sealed with a key derived
/// from the `SecretKey` passed to each call; the store never keeps key
/// material itself.
///
/// Record entries live in a namespace derived from that same secret, so
/// holders of different secrets sharing one backend never see or overwrite
/// each other's keys. Reserved entries sit outside every namespace.
#[derive(Clone)]
pub struct EncryptedStore {
    backend: Arc<dyn KvBackend>,
}

impl EncryptedStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    fn namespace_for_read(key_material: &SecretKey) -> Result<String> {
        store_namespace(key_material)
            .map_err(|_| Error::decryption("no key material for the local store"))
    }

    pub async fn put(&self, key: &str, plaintext: &[u8], key_material: &SecretKey) -> Result<()> {
        ensure_record_key(key)?;
        let namespace = store_namespace(key_material)?;
        let sealed = seal(&StoreKey::derive(key_material)?, plaintext)?;
        self.backend
            .write(scoped_key(&namespace, key), sealed)
            .await
    }

    pub fn get(&self, key: &str, key_material: &SecretKey) -> Result<Option<Vec<u8>>> {
        let namespace = Self::namespace_for_read(key_material)?;
        let Some(sealed) = self.backend.read(&scoped_key(&namespace, key))? else {
            return Ok(None);
        };
        open(&StoreKey::derive_for_read(key_material)?, &sealed).map(Some)
    }

    pub async fn remove(&self, key: &str, key_material: &SecretKey) -> Result<()> {
        let namespace = store_namespace(key_material)?;
        self.backend.remove(scoped_key(&namespace, key)).await
    }

    /// Re-keys an entry: `old_key` disappears and `new_key` holds `plaintext`.
    pub async fn rename(
        &self,
        old_key: &str,
        new_key: &str,
        plaintext: &[u8],
        key_material: &SecretKey,
    ) -> Result<()> {
        ensure_record_key(new_key)?;
        let namespace = store_namespace(key_material)?;
        let sealed = seal(&StoreKey::derive(key_material)?, plaintext)?;
        self.backend
            .rename(
                scoped_key(&namespace, old_key),
                scoped_key(&namespace, new_key),
                sealed,
            )
            .await
    }

    /// Lazily decrypts every entry in the namespace of `key_material`.
    /// Entries that fail to open are logged and skipped.
    pub fn list_all(&self, key_material: &SecretKey) -> Result<StoreEntries> {
        let key = StoreKey::derive_for_read(key_material)?;
        let prefix = scoped_key(&Self::namespace_for_read(key_material)?, "");
        let entries = self.backend.entries_with_prefix(&prefix)?;
        Ok(StoreEntries {
            key,
            prefix_len: prefix.len(),
            entries: entries.into_iter(),
        })
    }

    pub fn contains_key(&self, key: &str, key_material: &SecretKey) -> Result<bool> {
        let namespace = Self::namespace_for_read(key_material)?;
        Ok(self.backend.read(&scoped_key(&namespace, key))?.is_some())
    }

    /// Wipes every entry of every namespace, reserved ones included.
    pub async fn clear(&self) -> Result<()> {
        self.backend.clear().await
    }

    /// Writes a value that the caller sealed itself. Only reserved keys.
    pub async fn put_sealed(&self, key: &str, sealed: String) -> Result<()> {
        if !is_reserved_key(key) {
            return Err(Error::encryption(format!(
                "'{}' is not a reserved store key",
                key
            )));
        }
        self.backend.write(key.to_string(), sealed).await
    }

    pub fn get_sealed(&self, key: &str) -> Result<Option<String>> {
        if !is_reserved_key(key) {
            return Err(Error::decryption(format!(
                "'{}' is not a reserved store key",
                key
            )));
        }
        self.backend.read(key)
    }
}

/// Iterator over decrypted `(key, plaintext)` pairs of one namespace.
pub struct StoreEntries {
    key: StoreKey,
    prefix_len: usize,
    entries: std::vec::IntoIter<(String, String)>,
}

impl Iterator for StoreEntries {
    type Item = (String, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        for (scoped, sealed) in self.entries.by_ref() {
            let key = scoped.get(self.prefix_len..).unwrap_or_default().to_string();
            match open(&self.key, &sealed) {
                Ok(plaintext) => return Some((key, plaintext)),
                Err(err) => warn!("[Store] Skipping unreadable entry '{}': {}", key, err),
            }
        }
        None
    }
}
