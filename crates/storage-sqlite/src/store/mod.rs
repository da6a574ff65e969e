//! Encrypted key-value persistence.

mod backend;
mod encrypted_store;
mod sqlite_backend;

pub use backend::{KvBackend, MemoryBackend};
pub use encrypted_store::{is_reserved_key, EncryptedStore, StoreEntries, RESERVED_KEY_PREFIX};
pub use sqlite_backend::{SqliteBackend, StoreEntryDB};
