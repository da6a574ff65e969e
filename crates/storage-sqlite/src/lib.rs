//! SQLite-backed encrypted persistence for Fieldbook.
//!
//! The [`store::EncryptedStore`] seals every value before it reaches a
//! [`store::KvBackend`]; repositories in [`records`] add typed, sync-aware
//! CRUD on top of it.

pub mod credentials;
pub mod crypto;
pub mod customers;
pub mod db;
pub mod errors;
pub mod records;
pub mod schema;
pub mod store;

pub use credentials::{CredentialTable, LocalUser, USERS_KEY};
pub use customers::CustomerRepository;
pub use records::{JsonCodec, RecordCodec, RecordRepository};
pub use store::{EncryptedStore, KvBackend, MemoryBackend, SqliteBackend};
