use async_trait::async_trait;
use log::{debug, warn};
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

use fieldbook_core::errors::{Error, Result};
use fieldbook_core::sync::{
    CreateReconciliation, KeyProvider, NoopSyncTrigger, SecretKey, SyncCycleTrigger, SyncRecord,
    SyncRecordRepositoryTrait, SyncStatus, SyncTrigger,
};
use fieldbook_core::utils::temp_id::TempIdGenerator;

use super::{JsonCodec, RecordCodec};
use crate::store::EncryptedStore;

/// Local-first CRUD for one record kind.
///
/// Every mutation returns once the encrypted write has landed and then asks
/// the attached [`SyncTrigger`] for a pass; it never waits for the remote.
/// Read-modify-write sequences (user mutations and engine reconciliation)
/// are serialized by one async lock per repository.
pub struct RecordRepository<T, C = JsonCodec> {
    store: Arc<EncryptedStore>,
    codec: C,
    keys: Arc<dyn KeyProvider>,
    temp_ids: TempIdGenerator,
    sync_trigger: RwLock<Arc<dyn SyncTrigger>>,
    write_lock: Mutex<()>,
    _record: PhantomData<fn() -> T>,
}

impl<T: SyncRecord> RecordRepository<T, JsonCodec> {
    pub fn new(store: Arc<EncryptedStore>, keys: Arc<dyn KeyProvider>) -> Self {
        Self::with_codec(store, keys, JsonCodec)
    }
}

impl<T, C> RecordRepository<T, C>
where
    T: SyncRecord,
    C: RecordCodec<T> + 'static,
{
    pub fn with_codec(store: Arc<EncryptedStore>, keys: Arc<dyn KeyProvider>, codec: C) -> Self {
        Self {
            store,
            codec,
            keys,
            temp_ids: TempIdGenerator::new(),
            sync_trigger: RwLock::new(Arc::new(NoopSyncTrigger)),
            write_lock: Mutex::new(()),
            _record: PhantomData,
        }
    }

    /// Routes future sync requests to `trigger`.
    pub fn attach_sync_trigger(&self, trigger: Arc<dyn SyncTrigger>) {
        let mut current = self.sync_trigger.write().unwrap_or_else(|poisoned| {
            warn!("[Store] Sync trigger lock poisoned; replacing trigger anyway");
            poisoned.into_inner()
        });
        *current = trigger;
    }

    fn request_sync(&self) {
        let trigger = self.sync_trigger.read().unwrap_or_else(|poisoned| {
            warn!("[Store] Sync trigger lock poisoned; requesting sync anyway");
            poisoned.into_inner()
        });
        trigger.request_sync(SyncCycleTrigger::LocalMutation);
    }

    fn secret_key(&self) -> Result<SecretKey> {
        self.keys.current_secret_key().ok_or_else(|| {
            Error::NoLocalSession(format!("no key material to access {} records", T::KIND))
        })
    }

    fn read_record(&self, id: &str, key: &SecretKey) -> Result<Option<T>> {
        match self.store.get(id, key)? {
            Some(bytes) => self.codec.decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Pull-side reads leave an entry they cannot open untouched instead of
    /// failing the whole pull.
    fn skip_unreadable(id: &str, err: Error) -> Result<bool> {
        if err.is_unreadable_local_data() {
            warn!(
                "[Store] Leaving unreadable {} '{}' untouched: {}",
                T::KIND,
                id,
                err
            );
            Ok(false)
        } else {
            Err(err)
        }
    }

    async fn save(&self, record: &T, key: &SecretKey) -> Result<()> {
        let bytes = self.codec.encode(record)?;
        self.store.put(record.id(), &bytes, key).await
    }

    /// Stores a new record under a fresh temporary id, pending creation.
    pub async fn add(&self, mut record: T) -> Result<T> {
        let key = self.secret_key()?;
        {
            let _guard = self.write_lock.lock().await;
            let mut temp_id = self.temp_ids.next_id();
            while self.store.contains_key(&temp_id, &key)? {
                temp_id = self.temp_ids.next_id();
            }
            record.mark_created(temp_id);
            self.save(&record, &key).await?;
        }
        debug!("[Store] Added {} {} locally", T::KIND, record.id());
        self.request_sync();
        Ok(record)
    }

    /// Saves an edit. A pending creation stays `created`; anything else
    /// becomes `updated`.
    pub async fn update(&self, mut record: T) -> Result<T> {
        let key = self.secret_key()?;
        {
            let _guard = self.write_lock.lock().await;
            let current = self
                .read_record(record.id(), &key)?
                .filter(|current| current.sync_status() != SyncStatus::Deleted)
                .ok_or_else(|| Error::NotFound(format!("{} {}", T::KIND, record.id())))?;

            record.set_sync_status(current.sync_status());
            record.set_temp_id(current.is_temp_id());
            record.mark_updated();
            self.save(&record, &key).await?;
        }
        debug!(
            "[Store] Updated {} {} locally ({:?})",
            T::KIND,
            record.id(),
            record.sync_status()
        );
        self.request_sync();
        Ok(record)
    }

    /// Deletes a record. A never-synced record is purged outright; anything
    /// else becomes a tombstone until the server confirms. Returns `false`
    /// when no record had that id.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let key = self.secret_key()?;
        let existed = {
            let _guard = self.write_lock.lock().await;
            match self.read_record(id, &key)? {
                None => false,
                Some(current) => {
                    match (current.sync_status(), current.is_temp_id()) {
                        (SyncStatus::Created, true) => {
                            self.store.remove(id, &key).await?;
                            debug!("[Store] Purged unsynced {} {}", T::KIND, id);
                        }
                        (SyncStatus::Deleted, _) => {}
                        (status, is_temp) => {
                            if status == SyncStatus::Created || is_temp {
                                warn!(
                                    "[Store] {} {} has inconsistent sync state ({:?}, temp={}); keeping a tombstone",
                                    T::KIND,
                                    id,
                                    status,
                                    is_temp
                                );
                            }
                            let mut tombstone = current;
                            tombstone.mark_deleted();
                            self.save(&tombstone, &key).await?;
                        }
                    }
                    true
                }
            }
        };
        self.request_sync();
        Ok(existed)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<T>> {
        let key = self.secret_key()?;
        self.read_record(id, &key)
    }

    /// Every readable record, tombstones included.
    pub fn get_all(&self) -> Result<Vec<T>> {
        let key = self.secret_key()?;
        let mut records = Vec::new();
        for (store_key, bytes) in self.store.list_all(&key)? {
            match self.codec.decode(&bytes) {
                Ok(mut record) => {
                    if record.id() != store_key {
                        warn!(
                            "[Store] {} stored under '{}' carries id '{}'; using the store key",
                            T::KIND,
                            store_key,
                            record.id()
                        );
                        record.set_id(store_key);
                    }
                    records.push(record);
                }
                Err(err) => warn!("[Store] Skipping {} '{}': {}", T::KIND, store_key, err),
            }
        }
        Ok(records)
    }

    /// Records a list view shows: everything except tombstones.
    pub fn list_active(&self) -> Result<Vec<T>> {
        Ok(self
            .get_all()?
            .into_iter()
            .filter(|record| record.sync_status() != SyncStatus::Deleted)
            .collect())
    }

    /// Number of records with a change the server has not confirmed.
    pub fn pending_count(&self) -> Result<usize> {
        Ok(self
            .get_all()?
            .iter()
            .filter(|record| record.sync_status().is_dirty())
            .count())
    }

    /// Wipes the whole store, every user's records and the credential table
    /// included.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store.clear().await
    }
}

#[async_trait]
impl<T, C> SyncRecordRepositoryTrait<T> for RecordRepository<T, C>
where
    T: SyncRecord,
    C: RecordCodec<T> + 'static,
{
    fn get_all(&self) -> Result<Vec<T>> {
        RecordRepository::get_all(self)
    }

    fn get_by_id(&self, id: &str) -> Result<Option<T>> {
        RecordRepository::get_by_id(self, id)
    }

    async fn reconcile_created(&self, sent: &T, server_id: &str) -> Result<CreateReconciliation> {
        if server_id.is_empty() {
            return Err(Error::NotFound(format!(
                "server id for {} {}",
                T::KIND,
                sent.id()
            )));
        }
        let key = self.secret_key()?;
        let _guard = self.write_lock.lock().await;

        let Some(mut current) = self.read_record(sent.id(), &key)? else {
            // Purged while the create was in flight: the server copy must go.
            let mut tombstone = sent.clone();
            tombstone.set_id(server_id.to_string());
            tombstone.set_temp_id(false);
            tombstone.mark_deleted();
            self.save(&tombstone, &key).await?;
            return Ok(CreateReconciliation::DeletedMeanwhile);
        };

        let outcome = if current.sync_status() == SyncStatus::Deleted {
            CreateReconciliation::DeletedMeanwhile
        } else if current.same_content(sent) {
            CreateReconciliation::Promoted
        } else {
            CreateReconciliation::EditedMeanwhile
        };

        current.set_id(server_id.to_string());
        current.mark_synced();
        match outcome {
            CreateReconciliation::Promoted => {}
            CreateReconciliation::EditedMeanwhile => current.set_sync_status(SyncStatus::Updated),
            CreateReconciliation::DeletedMeanwhile => current.mark_deleted(),
        }

        let bytes = self.codec.encode(&current)?;
        if sent.id() == server_id {
            self.store.put(server_id, &bytes, &key).await?;
        } else {
            self.store
                .rename(sent.id(), server_id, &bytes, &key)
                .await?;
        }
        Ok(outcome)
    }

    async fn reconcile_updated(&self, sent: &T) -> Result<bool> {
        let key = self.secret_key()?;
        let _guard = self.write_lock.lock().await;
        match self.read_record(sent.id(), &key)? {
            Some(mut current)
                if current.sync_status() == SyncStatus::Updated && current.same_content(sent) =>
            {
                current.mark_synced();
                self.save(&current, &key).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reconcile_deleted(&self, id: &str) -> Result<bool> {
        let key = self.secret_key()?;
        let _guard = self.write_lock.lock().await;
        match self.read_record(id, &key)? {
            None => Ok(true),
            Some(current) if current.sync_status() == SyncStatus::Deleted => {
                self.store.remove(id, &key).await?;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    async fn upsert_from_remote(&self, mut record: T) -> Result<bool> {
        if record.id().is_empty() {
            return Ok(false);
        }
        let key = self.secret_key()?;
        let _guard = self.write_lock.lock().await;
        let current = match self.read_record(record.id(), &key) {
            Ok(current) => current,
            Err(err) => return Self::skip_unreadable(record.id(), err),
        };
        if let Some(current) = current {
            if current.sync_status().is_dirty() {
                return Ok(false);
            }
            if current.same_content(&record) {
                return Ok(false);
            }
        }
        record.mark_synced();
        self.save(&record, &key).await?;
        Ok(true)
    }

    async fn remove_clean(&self, id: &str) -> Result<bool> {
        let key = self.secret_key()?;
        let _guard = self.write_lock.lock().await;
        let current = match self.read_record(id, &key) {
            Ok(current) => current,
            Err(err) => return Self::skip_unreadable(id, err),
        };
        match current {
            Some(current) if !current.sync_status().is_dirty() => {
                self.store.remove(id, &key).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldbook_core::customers::Customer;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingTrigger {
        requests: StdMutex<Vec<SyncCycleTrigger>>,
    }

    impl RecordingTrigger {
        fn count(&self) -> usize {
            self.requests.lock().expect("requests lock").len()
        }
    }

    impl SyncTrigger for RecordingTrigger {
        fn request_sync(&self, trigger: SyncCycleTrigger) {
            self.requests.lock().expect("requests lock").push(trigger);
        }
    }

    fn repository(store: Arc<EncryptedStore>, secret: &str) -> RecordRepository<Customer> {
        RecordRepository::new(store, Arc::new(SecretKey::new(secret)))
    }

    #[tokio::test]
    async fn add_assigns_temp_id_and_requests_sync() {
        let repo = repository(Arc::new(EncryptedStore::in_memory()), "alpha");
        let trigger = Arc::new(RecordingTrigger::default());
        repo.attach_sync_trigger(trigger.clone());

        let added = repo
            .add(Customer::new("Ada", "ada@example.com"))
            .await
            .expect("add");
        assert!(added.is_temp_id);
        assert_eq!(added.sync_status, SyncStatus::Created);
        assert_eq!(repo.get_by_id(&added.id).expect("get"), Some(added));
        assert_eq!(trigger.count(), 1);
    }

    #[tokio::test]
    async fn update_of_synced_record_marks_updated() {
        let repo = repository(Arc::new(EncryptedStore::in_memory()), "alpha");
        let mut synced = Customer::new("Ada", "ada@example.com");
        synced.id = "42".to_string();
        assert!(repo.upsert_from_remote(synced.clone()).await.expect("seed"));

        synced.email = "ada@lovelace.dev".to_string();
        let updated = repo.update(synced).await.expect("update");
        assert_eq!(updated.sync_status, SyncStatus::Updated);
        assert!(!updated.is_temp_id);
    }

    #[tokio::test]
    async fn update_of_pending_creation_stays_created() {
        let repo = repository(Arc::new(EncryptedStore::in_memory()), "alpha");
        let mut added = repo
            .add(Customer::new("Ada", "ada@example.com"))
            .await
            .expect("add");
        added.name = "Ada L.".to_string();
        let updated = repo.update(added).await.expect("update");
        assert_eq!(updated.sync_status, SyncStatus::Created);
        assert!(updated.is_temp_id);
    }

    #[tokio::test]
    async fn update_of_unknown_or_deleted_record_is_not_found() {
        let repo = repository(Arc::new(EncryptedStore::in_memory()), "alpha");
        let mut ghost = Customer::new("Ghost", "ghost@example.com");
        ghost.id = "7".to_string();
        assert!(matches!(
            repo.update(ghost.clone()).await,
            Err(Error::NotFound(_))
        ));

        assert!(repo.upsert_from_remote(ghost.clone()).await.expect("seed"));
        assert!(repo.delete("7").await.expect("delete"));
        assert!(matches!(repo.update(ghost).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_of_synced_record_leaves_tombstone() {
        let repo = repository(Arc::new(EncryptedStore::in_memory()), "alpha");
        let mut synced = Customer::new("Ada", "ada@example.com");
        synced.id = "42".to_string();
        repo.upsert_from_remote(synced).await.expect("seed");

        assert!(repo.delete("42").await.expect("delete"));
        let tombstone = repo.get_by_id("42").expect("get").expect("tombstone");
        assert_eq!(tombstone.sync_status, SyncStatus::Deleted);
        assert!(repo.list_active().expect("list").is_empty());
        assert_eq!(repo.pending_count().expect("pending"), 1);
    }

    #[tokio::test]
    async fn delete_of_unknown_id_returns_false_but_requests_sync() {
        let repo = repository(Arc::new(EncryptedStore::in_memory()), "alpha");
        let trigger = Arc::new(RecordingTrigger::default());
        repo.attach_sync_trigger(trigger.clone());

        assert!(!repo.delete("missing").await.expect("delete"));
        assert_eq!(trigger.count(), 1);
    }

    #[tokio::test]
    async fn operations_without_local_session_fail() {
        let repo = repository(Arc::new(EncryptedStore::in_memory()), "");
        assert!(matches!(
            repo.add(Customer::new("Ada", "ada@example.com")).await,
            Err(Error::NoLocalSession(_))
        ));
        assert!(matches!(repo.get_all(), Err(Error::NoLocalSession(_))));
    }

    #[tokio::test]
    async fn reconcile_created_promotes_under_server_id() {
        let repo = repository(Arc::new(EncryptedStore::in_memory()), "alpha");
        let added = repo
            .add(Customer::new("Ada", "ada@example.com"))
            .await
            .expect("add");

        let outcome = repo.reconcile_created(&added, "42").await.expect("reconcile");
        assert_eq!(outcome, CreateReconciliation::Promoted);
        assert_eq!(repo.get_by_id(&added.id).expect("get temp"), None);
        let promoted = repo.get_by_id("42").expect("get").expect("promoted");
        assert_eq!(promoted.sync_status, SyncStatus::None);
        assert!(!promoted.is_temp_id);
    }

    #[tokio::test]
    async fn reconcile_created_keeps_edit_made_in_flight() {
        let repo = repository(Arc::new(EncryptedStore::in_memory()), "alpha");
        let sent = repo
            .add(Customer::new("Ada", "ada@example.com"))
            .await
            .expect("add");
        let mut edited = sent.clone();
        edited.email = "ada@lovelace.dev".to_string();
        repo.update(edited).await.expect("edit");

        let outcome = repo.reconcile_created(&sent, "42").await.expect("reconcile");
        assert_eq!(outcome, CreateReconciliation::EditedMeanwhile);
        let stored = repo.get_by_id("42").expect("get").expect("stored");
        assert_eq!(stored.sync_status, SyncStatus::Updated);
        assert_eq!(stored.email, "ada@lovelace.dev");
        assert!(!stored.is_temp_id);
    }

    #[tokio::test]
    async fn reconcile_created_after_local_delete_leaves_server_tombstone() {
        let repo = repository(Arc::new(EncryptedStore::in_memory()), "alpha");
        let sent = repo
            .add(Customer::new("Ada", "ada@example.com"))
            .await
            .expect("add");
        repo.delete(&sent.id).await.expect("delete");

        let outcome = repo.reconcile_created(&sent, "42").await.expect("reconcile");
        assert_eq!(outcome, CreateReconciliation::DeletedMeanwhile);
        let tombstone = repo.get_by_id("42").expect("get").expect("tombstone");
        assert_eq!(tombstone.sync_status, SyncStatus::Deleted);
        assert!(!tombstone.is_temp_id);
    }

    #[tokio::test]
    async fn reconcile_updated_only_clears_unchanged_records() {
        let repo = repository(Arc::new(EncryptedStore::in_memory()), "alpha");
        let mut synced = Customer::new("Ada", "ada@example.com");
        synced.id = "42".to_string();
        repo.upsert_from_remote(synced.clone()).await.expect("seed");

        synced.name = "Ada L.".to_string();
        let sent = repo.update(synced).await.expect("update");
        let mut newer = sent.clone();
        newer.name = "Ada Lovelace".to_string();
        repo.update(newer).await.expect("second update");

        assert!(!repo.reconcile_updated(&sent).await.expect("reconcile"));
        let stored = repo.get_by_id("42").expect("get").expect("stored");
        assert_eq!(stored.sync_status, SyncStatus::Updated);
        assert!(repo.reconcile_updated(&stored).await.expect("reconcile"));
    }

    #[tokio::test]
    async fn upsert_and_remove_from_remote_never_touch_dirty_records() {
        let repo = repository(Arc::new(EncryptedStore::in_memory()), "alpha");
        let mut synced = Customer::new("Ada", "ada@example.com");
        synced.id = "42".to_string();
        repo.upsert_from_remote(synced.clone()).await.expect("seed");
        synced.name = "Local".to_string();
        repo.update(synced.clone()).await.expect("update");

        let mut server = synced.clone();
        server.name = "Server".to_string();
        assert!(!repo.upsert_from_remote(server).await.expect("upsert"));
        assert!(!repo.remove_clean("42").await.expect("remove"));
        assert_eq!(
            repo.get_by_id("42").expect("get").expect("kept").name,
            "Local"
        );
    }

    #[tokio::test]
    async fn two_users_on_one_store_keep_their_own_server_ids() {
        let store = Arc::new(EncryptedStore::in_memory());
        let alpha = repository(store.clone(), "alpha");
        let beta = repository(store, "beta");

        let mut theirs = Customer::new("Bea", "bea@example.com");
        theirs.id = "42".to_string();
        assert!(beta.upsert_from_remote(theirs).await.expect("seed beta"));

        let sent = alpha
            .add(Customer::new("Ada", "ada@example.com"))
            .await
            .expect("add");
        alpha.reconcile_created(&sent, "42").await.expect("reconcile");

        assert_eq!(
            alpha.get_by_id("42").expect("alpha get").expect("alpha 42").name,
            "Ada"
        );
        assert_eq!(
            beta.get_by_id("42").expect("beta get").expect("beta 42").name,
            "Bea"
        );
        assert_eq!(alpha.get_all().expect("alpha all").len(), 1);
        assert_eq!(beta.get_all().expect("beta all").len(), 1);
    }

    #[tokio::test]
    async fn pull_leaves_unreadable_entries_and_applies_the_rest() {
        let store = Arc::new(EncryptedStore::in_memory());
        let secret = SecretKey::new("alpha");
        store
            .put("42", b"not a customer", &secret)
            .await
            .expect("corrupt entry");
        let repo = repository(store, "alpha");

        let mut server = Customer::new("Ada", "ada@example.com");
        server.id = "42".to_string();
        assert!(!repo.upsert_from_remote(server).await.expect("upsert"));
        assert!(!repo.remove_clean("42").await.expect("remove"));

        let mut other = Customer::new("Bea", "bea@example.com");
        other.id = "43".to_string();
        assert!(repo.upsert_from_remote(other).await.expect("upsert"));
        assert!(repo.get_by_id("43").expect("get").is_some());
        assert!(repo
            .get_by_id("42")
            .expect_err("still unreadable")
            .is_unreadable_local_data());
    }

    #[tokio::test]
    async fn poisoned_trigger_lock_still_routes_requests() {
        let repo = Arc::new(repository(Arc::new(EncryptedStore::in_memory()), "alpha"));
        let poisoner = repo.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.sync_trigger.write().expect("trigger lock");
            panic!("poison the trigger lock");
        })
        .join();
        assert!(repo.sync_trigger.is_poisoned());

        let trigger = Arc::new(RecordingTrigger::default());
        repo.attach_sync_trigger(trigger.clone());
        repo.add(Customer::new("Ada", "ada@example.com"))
            .await
            .expect("add");
        assert_eq!(trigger.count(), 1);
    }
}
