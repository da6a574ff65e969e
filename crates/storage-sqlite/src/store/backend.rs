use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

use fieldbook_core::errors::{Error, Result};

/// Raw key-value storage underneath the encrypted store.
///
/// Values are already sealed when they reach a backend. Reads are
/// synchronous; writes are async so SQLite can serialize them on its writer.
#[async_trait]
pub trait KvBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Snapshot of every entry, ordered by key.
    fn entries(&self) -> Result<Vec<(String, String)>>;

    /// Entries whose key starts with `prefix`, ordered by key.
    fn entries_with_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .collect())
    }

    async fn write(&self, key: String, value: String) -> Result<()>;

    /// Removing an absent key is not an error.
    async fn remove(&self, key: String) -> Result<()>;

    /// Moves an entry to a new key in one step; `old_key` and `new_key` are
    /// never both present.
    async fn rename(&self, old_key: String, new_key: String, value: String) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// In-process backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> Error {
        Error::internal("memory store lock poisoned")
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn entries(&self) -> Result<Vec<(String, String)>> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn write(&self, key: String, value: String) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: String) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.remove(&key);
        Ok(())
    }

    async fn rename(&self, old_key: String, new_key: String, value: String) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.remove(&old_key);
        entries.insert(new_key, value);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.clear();
        Ok(())
    }
}
