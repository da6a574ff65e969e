//! Wires the store, session, connectivity and engine together and owns the
//! background tasks.

use log::info;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use fieldbook_core::customers::Customer;
use fieldbook_core::sync::{SyncCycleTrigger, SyncTrigger};
use fieldbook_storage_sqlite::{CustomerRepository, EncryptedStore, SqliteBackend};

use crate::client::CustomerApiClient;
use crate::config::SyncConfig;
use crate::connectivity::{spawn_reconnect_listener, ConnectivityMonitor};
use crate::engine::{sync_request_channel, SyncEngine, SyncRequestReceiver};
use crate::error::{Result, SyncError};
use crate::remote::{RemoteAuthenticator, RemoteStore};
use crate::session::SessionManager;

pub struct SyncRuntime {
    pub customers: Arc<CustomerRepository>,
    pub session: Arc<SessionManager>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub engine: Arc<SyncEngine<Customer>>,
    config: SyncConfig,
    requests: Mutex<Option<SyncRequestReceiver>>,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncRuntime {
    /// Opens the SQLite store under `config.db_path` and talks to
    /// `config.api_url`. Starts offline; publish reachability through
    /// [`SyncRuntime::connectivity`].
    pub fn open(config: SyncConfig) -> Result<Self> {
        let backend = SqliteBackend::open(&config.db_path)?;
        let client = Arc::new(CustomerApiClient::with_timeout(
            &config.api_url,
            config.remote_call_timeout,
        )?);
        let store = Arc::new(EncryptedStore::new(Arc::new(backend)));
        Ok(Self::assemble(
            config,
            store,
            client.clone(),
            client,
            false,
        ))
    }

    pub fn assemble(
        config: SyncConfig,
        store: Arc<EncryptedStore>,
        remote: Arc<dyn RemoteStore<Customer>>,
        authenticator: Arc<dyn RemoteAuthenticator>,
        initially_reachable: bool,
    ) -> Self {
        let session = Arc::new(SessionManager::new(store.clone(), authenticator));
        let customers = Arc::new(CustomerRepository::new(store, session.clone()));
        let connectivity = Arc::new(ConnectivityMonitor::new(initially_reachable));
        let (requester, requests) = sync_request_channel();
        customers.attach_sync_trigger(Arc::new(requester.clone()));

        let engine = Arc::new(SyncEngine::new(
            customers.clone(),
            remote,
            session.clone(),
            connectivity.subscribe(),
            requester,
            config.remote_call_timeout,
        ));

        Self {
            customers,
            session,
            connectivity,
            engine,
            config,
            requests: Mutex::new(Some(requests)),
            background_tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the pass worker and the reconnect listener, then requests a
    /// startup pass. Can only be started once.
    pub fn start(&self) -> Result<()> {
        let requests = self
            .requests
            .lock()
            .map_err(|_| SyncError::Config("runtime lock poisoned".to_string()))?
            .take()
            .ok_or_else(|| SyncError::Config("sync runtime already started".to_string()))?;

        let worker = self
            .engine
            .spawn_worker(requests, self.config.periodic_interval);
        let listener = spawn_reconnect_listener(
            self.connectivity.subscribe_reconnects(),
            self.session.clone(),
            Arc::new(self.engine.requester()),
        );

        if let Ok(mut tasks) = self.background_tasks.lock() {
            tasks.push(worker);
            tasks.push(listener);
        }
        self.engine
            .requester()
            .request_sync(SyncCycleTrigger::Startup);
        info!(
            "[Sync] Background sync started (periodic: {:?})",
            self.config.periodic_interval
        );
        Ok(())
    }

    /// Aborts the background tasks. An in-flight pass is dropped at its next
    /// await point; records it had not reconciled stay dirty.
    pub fn shutdown(&self) {
        if let Ok(mut tasks) = self.background_tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        info!("[Sync] Background sync stopped");
    }
}

impl Drop for SyncRuntime {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.background_tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    use crate::session::CredentialPrompt;

    #[derive(Default)]
    struct InMemoryRemote {
        records: Mutex<Vec<Customer>>,
        authenticated: AtomicBool,
    }

    #[async_trait]
    impl RemoteStore<Customer> for InMemoryRemote {
        async fn create(&self, record: &Customer) -> Result<Customer> {
            let mut records = self.records.lock().expect("records lock");
            let created = Customer {
                id: (records.len() + 42).to_string(),
                name: record.name.clone(),
                email: record.email.clone(),
                ..Customer::default()
            };
            records.push(created.clone());
            Ok(created)
        }

        async fn update(&self, _id: &str, _record: &Customer) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _id: &str) -> Result<()> {
            Ok(())
        }

        async fn list_all(&self) -> Result<Vec<Customer>> {
            Ok(self.records.lock().expect("records lock").clone())
        }
    }

    #[async_trait]
    impl RemoteAuthenticator for InMemoryRemote {
        async fn login(&self, _username: &str, password: &str) -> Result<()> {
            if password == "pw" {
                self.authenticated.store(true, Ordering::SeqCst);
                Ok(())
            } else {
                Err(SyncError::api(401, "bad credentials"))
            }
        }

        fn is_authenticated(&self) -> bool {
            self.authenticated.load(Ordering::SeqCst)
        }

        fn logout(&self) {
            self.authenticated.store(false, Ordering::SeqCst);
        }
    }

    struct PasswordPrompt;

    #[async_trait]
    impl CredentialPrompt for PasswordPrompt {
        async fn prompt_password(&self, _username: &str) -> Option<String> {
            Some("pw".to_string())
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn offline_work_syncs_after_reconnect() {
        let dir = tempdir().expect("tempdir");
        let backend =
            SqliteBackend::open(&dir.path().to_string_lossy()).expect("open sqlite backend");
        let store = Arc::new(EncryptedStore::new(Arc::new(backend)));
        let remote = Arc::new(InMemoryRemote::default());
        let runtime = SyncRuntime::assemble(
            SyncConfig::default(),
            store,
            remote.clone(),
            remote.clone(),
            false,
        );
        runtime.session.set_prompt(Arc::new(PasswordPrompt));
        runtime.start().expect("start");
        assert!(runtime.start().is_err());

        runtime.session.register("ada", "pw").await.expect("register");
        assert!(runtime.session.login_locally("ada", "pw").expect("login"));
        let added = runtime
            .customers
            .add(Customer::new("Ada", "ada@example.com"))
            .await
            .expect("add");
        assert!(added.is_temp_id);

        runtime.connectivity.set_reachable(true);
        let customers = runtime.customers.clone();
        assert!(
            wait_until(|| customers
                .get_by_id("42")
                .map(|found| found.is_some())
                .unwrap_or(false))
            .await
        );
        assert_eq!(runtime.customers.get_by_id(&added.id).expect("get"), None);
        assert_eq!(remote.records.lock().expect("records lock").len(), 1);

        runtime.shutdown();
    }
}
