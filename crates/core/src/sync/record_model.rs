//! Per-record sync lifecycle.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Local sync status of a record.
///
/// `None` means the record is consistent with the server. A missing status
/// field in stored data is equivalent to `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    None,
    Created,
    Updated,
    Deleted,
}

impl SyncStatus {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// True when the record still has a change the server has not confirmed.
    pub fn is_dirty(&self) -> bool {
        !self.is_none()
    }
}

/// Decodes a status that may be missing or `null`.
pub fn deserialize_sync_status<'de, D>(deserializer: D) -> Result<SyncStatus, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<SyncStatus>::deserialize(deserializer)?.unwrap_or_default())
}

/// A record kind the repository can persist and the engine can replay.
///
/// Implementors only expose their id and sync fields; the lifecycle rules
/// live in the provided methods so every record kind follows them the same
/// way.
pub trait SyncRecord:
    Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Short label for log lines.
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn sync_status(&self) -> SyncStatus;
    fn set_sync_status(&mut self, status: SyncStatus);
    fn is_temp_id(&self) -> bool;
    fn set_temp_id(&mut self, is_temp: bool);

    /// Fresh local record under a temporary id, pending remote creation.
    fn mark_created(&mut self, temp_id: String) {
        self.set_id(temp_id);
        self.set_sync_status(SyncStatus::Created);
        self.set_temp_id(true);
    }

    /// Local edit. A pending creation is never downgraded to an update.
    fn mark_updated(&mut self) {
        if self.sync_status() != SyncStatus::Created {
            self.set_sync_status(SyncStatus::Updated);
        }
    }

    fn mark_deleted(&mut self) {
        self.set_sync_status(SyncStatus::Deleted);
    }

    /// Server confirmed the record; it now carries a server id.
    fn mark_synced(&mut self) {
        self.set_sync_status(SyncStatus::None);
        self.set_temp_id(false);
    }

    /// Compares domain fields only, ignoring id and sync bookkeeping.
    fn same_content(&self, other: &Self) -> bool {
        let mut left = self.clone();
        let mut right = other.clone();
        for record in [&mut left, &mut right] {
            record.set_id(String::new());
            record.set_sync_status(SyncStatus::None);
            record.set_temp_id(false);
        }
        left == right
    }
}
