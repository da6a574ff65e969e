//! Customer persistence.

use fieldbook_core::customers::Customer;

use crate::records::RecordRepository;

pub type CustomerRepository = RecordRepository<Customer>;

#[cfg(test)]
mod tests {
    use super::*;
    use fieldbook_core::sync::{SecretKey, SyncRecordRepositoryTrait, SyncStatus};
    use std::sync::Arc;
    use tempfile::tempdir;

    use crate::store::{EncryptedStore, SqliteBackend};

    fn in_memory(secret: &str) -> (Arc<EncryptedStore>, CustomerRepository) {
        let store = Arc::new(EncryptedStore::in_memory());
        let repo = CustomerRepository::new(store.clone(), Arc::new(SecretKey::new(secret)));
        (store, repo)
    }

    #[tokio::test]
    async fn offline_mutations_are_immediately_visible() {
        let (_store, repo) = in_memory("alpha");

        let ada = repo
            .add(Customer::new("Ada", "ada@example.com"))
            .await
            .expect("add ada");
        let grace = repo
            .add(Customer::new("Grace", "grace@example.com"))
            .await
            .expect("add grace");
        assert_ne!(ada.id, grace.id);

        let mut renamed = grace.clone();
        renamed.name = "Grace Hopper".to_string();
        repo.update(renamed).await.expect("update");
        repo.delete(&ada.id).await.expect("delete");

        let all = repo.get_all().expect("get all");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Grace Hopper");
        assert_eq!(all[0].sync_status, SyncStatus::Created);
        assert_eq!(repo.get_by_id(&ada.id).expect("get"), None);
    }

    #[tokio::test]
    async fn delete_before_sync_leaves_nothing_behind() {
        let (store, repo) = in_memory("alpha");
        let added = repo
            .add(Customer::new("Ada", "ada@example.com"))
            .await
            .expect("add");
        assert!(repo.delete(&added.id).await.expect("delete"));

        assert!(!store
            .contains_key(&added.id, &SecretKey::new("alpha"))
            .expect("contains"));
        assert!(repo.get_all().expect("get all").is_empty());
        assert_eq!(repo.pending_count().expect("pending"), 0);
    }

    #[tokio::test]
    async fn users_sharing_a_store_only_see_their_own_records() {
        let store = Arc::new(EncryptedStore::in_memory());
        let mine = CustomerRepository::new(store.clone(), Arc::new(SecretKey::new("alpha")));
        let theirs = CustomerRepository::new(store.clone(), Arc::new(SecretKey::new("beta")));

        mine.add(Customer::new("Ada", "ada@example.com"))
            .await
            .expect("add");
        theirs
            .add(Customer::new("Mallory", "mallory@example.com"))
            .await
            .expect("add foreign");
        mine.add(Customer::new("Grace", "grace@example.com"))
            .await
            .expect("add");

        let mut names: Vec<String> = mine
            .get_all()
            .expect("get all")
            .into_iter()
            .map(|customer| customer.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["Ada".to_string(), "Grace".to_string()]);
    }

    #[tokio::test]
    async fn sqlite_store_survives_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().to_string_lossy().to_string();
        let key = Arc::new(SecretKey::new("alpha"));

        let added = {
            let backend = SqliteBackend::open(&path).expect("open");
            let repo = CustomerRepository::new(
                Arc::new(EncryptedStore::new(Arc::new(backend))),
                key.clone(),
            );
            let added = repo
                .add(Customer::new("Ada", "ada@example.com"))
                .await
                .expect("add");
            repo.reconcile_created(&added, "42").await.expect("promote");
            added
        };

        let backend = SqliteBackend::open(&path).expect("reopen");
        let repo = CustomerRepository::new(Arc::new(EncryptedStore::new(Arc::new(backend))), key);
        assert_eq!(repo.get_by_id(&added.id).expect("get temp"), None);
        let stored = repo.get_by_id("42").expect("get").expect("stored");
        assert_eq!(stored.name, "Ada");
        assert_eq!(stored.sync_status, SyncStatus::None);
        assert!(!stored.is_temp_id);
    }

    #[tokio::test]
    async fn sqlite_users_promoted_to_the_same_server_id_stay_apart() {
        let dir = tempdir().expect("tempdir");
        let backend = SqliteBackend::open(&dir.path().to_string_lossy()).expect("open");
        let store = Arc::new(EncryptedStore::new(Arc::new(backend)));
        let ada = CustomerRepository::new(store.clone(), Arc::new(SecretKey::new("alpha")));
        let bea = CustomerRepository::new(store, Arc::new(SecretKey::new("beta")));

        let mut synced = Customer::new("Bea's client", "client@example.com");
        synced.id = "42".to_string();
        bea.upsert_from_remote(synced).await.expect("seed");

        let added = ada
            .add(Customer::new("Ada's client", "other@example.com"))
            .await
            .expect("add");
        ada.reconcile_created(&added, "42").await.expect("promote");

        let bea_record = bea.get_by_id("42").expect("get").expect("kept");
        assert_eq!(bea_record.name, "Bea's client");
        assert_eq!(bea.list_active().expect("list").len(), 1);
        assert_eq!(
            ada.get_by_id("42").expect("get").expect("promoted").name,
            "Ada's client"
        );
    }
}
