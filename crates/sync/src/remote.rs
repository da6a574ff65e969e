//! Contracts for the remote side of a sync pass.

use async_trait::async_trait;

use fieldbook_core::sync::SyncRecord;

use crate::error::Result;

/// CRUD endpoint keyed by server ids.
#[async_trait]
pub trait RemoteStore<T: SyncRecord>: Send + Sync {
    /// Creates `record` remotely and returns the server copy carrying the
    /// assigned id.
    async fn create(&self, record: &T) -> Result<T>;

    async fn update(&self, id: &str, record: &T) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn list_all(&self) -> Result<Vec<T>>;
}

/// Remote login handshake.
#[async_trait]
pub trait RemoteAuthenticator: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<()>;

    fn is_authenticated(&self) -> bool;

    /// Drops the remote session.
    fn logout(&self);
}
