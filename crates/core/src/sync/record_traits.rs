//! Repository contract the sync engine drives.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::SyncRecord;
use crate::errors::Result;

/// What happened locally when a remote create was confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateReconciliation {
    /// Re-keyed under the server id and marked clean.
    Promoted,
    /// Re-keyed under the server id; the user edited it while the create was
    /// in flight, so it stays `updated`.
    EditedMeanwhile,
    /// The user deleted it while the create was in flight; a tombstone now
    /// sits under the server id.
    DeletedMeanwhile,
}

/// Counters of one pull from the remote store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullSummary {
    pub upserted: usize,
    pub removed: usize,
    pub kept_dirty: usize,
}

/// Typed local persistence for one record kind, as seen by the sync engine.
///
/// Every reconcile method re-reads the record under the repository's write
/// lock, so a user mutation that landed while a remote call was in flight is
/// never overwritten.
#[async_trait]
pub trait SyncRecordRepositoryTrait<T: SyncRecord>: Send + Sync {
    /// Every locally held record, tombstones included. Unreadable entries are
    /// skipped.
    fn get_all(&self) -> Result<Vec<T>>;

    fn get_by_id(&self, id: &str) -> Result<Option<T>>;

    /// Applies a confirmed remote create of `sent` that got `server_id`.
    async fn reconcile_created(&self, sent: &T, server_id: &str) -> Result<CreateReconciliation>;

    /// Clears `updated` if the stored record still matches what was sent.
    /// Returns whether the status was cleared.
    async fn reconcile_updated(&self, sent: &T) -> Result<bool>;

    /// Purges a tombstone after the remote delete. Returns whether the record
    /// is gone locally.
    async fn reconcile_deleted(&self, id: &str) -> Result<bool>;

    /// Stores server state unless the local copy is dirty. Returns whether
    /// the record was written.
    async fn upsert_from_remote(&self, record: T) -> Result<bool>;

    /// Removes a record that the server no longer has, unless it is dirty.
    async fn remove_clean(&self, id: &str) -> Result<bool>;
}
