use serde::{Deserialize, Serialize};

use crate::sync::{deserialize_sync_status, SyncRecord, SyncStatus};

/// A customer as held in the local store.
///
/// `id` is either the server-assigned identifier or a temporary local token
/// (`is_temp_id`). The sync fields use the same camelCase names as the
/// stored JSON so older entries keep decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(
        default,
        skip_serializing_if = "SyncStatus::is_none",
        deserialize_with = "deserialize_sync_status"
    )]
    pub sync_status: SyncStatus,
    #[serde(default)]
    pub is_temp_id: bool,
}

impl Customer {
    /// Builds an unsaved customer; the repository assigns the id on `add`.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            email: email.into(),
            sync_status: SyncStatus::None,
            is_temp_id: false,
        }
    }
}

impl SyncRecord for Customer {
    const KIND: &'static str = "customer";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    fn set_sync_status(&mut self, status: SyncStatus) {
        self.sync_status = status;
    }

    fn is_temp_id(&self) -> bool {
        self.is_temp_id
    }

    fn set_temp_id(&mut self, is_temp: bool) {
        self.is_temp_id = is_temp;
    }
}
