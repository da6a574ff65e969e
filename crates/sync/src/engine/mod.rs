//! Sync engine: replays local changes against the remote store.
//!
//! One pass enumerates fresh local state, partitions it by sync status and
//! replays each partition. Passes never overlap: `cycle_mutex` guards the
//! pass, and anything requested meanwhile is queued on the request channel
//! for a single follow-up pass run by the worker.

mod requests;


pub use requests::{sync_request_channel, SyncRequestReceiver, SyncRequester};

use chrono::Utc;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use uuid::Uuid;

use fieldbook_core::sync::{
    CreateReconciliation, PullSummary, SessionProvider, SyncCycleTrigger, SyncEngineStatus,
    SyncPassResult, SyncPassStatus, SyncRecord, SyncRecordRepositoryTrait, SyncRetryClass,
    SyncStatus, SyncTrigger,
};

use crate::error::{Result, SyncError};
use crate::remote::RemoteStore;

enum WorkerWake {
    Request(SyncCycleTrigger),
    Tick,
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Mutable progress of one pass.
struct PassState {
    result: SyncPassResult,
    started_at: Instant,
    last_error: Option<String>,
    reauth_required: bool,
    follow_up: bool,
}

impl PassState {
    fn new(trigger: SyncCycleTrigger) -> Self {
        Self {
            result: SyncPassResult::new(Uuid::new_v4().to_string(), trigger),
            started_at: Instant::now(),
            last_error: None,
            reauth_required: false,
            follow_up: false,
        }
    }

    fn fail(&mut self, message: String) {
        self.result.failed_count += 1;
        self.last_error = Some(message);
    }
}

pub struct SyncEngine<T: SyncRecord> {
    repository: Arc<dyn SyncRecordRepositoryTrait<T>>,
    remote: Arc<dyn RemoteStore<T>>,
    session: Arc<dyn SessionProvider>,
    connectivity: watch::Receiver<bool>,
    requester: SyncRequester,
    cycle_mutex: Mutex<()>,
    status: RwLock<SyncEngineStatus>,
    remote_call_timeout: Duration,
}

impl<T: SyncRecord> SyncEngine<T> {
    pub fn new(
        repository: Arc<dyn SyncRecordRepositoryTrait<T>>,
        remote: Arc<dyn RemoteStore<T>>,
        session: Arc<dyn SessionProvider>,
        connectivity: watch::Receiver<bool>,
        requester: SyncRequester,
        remote_call_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            remote,
            session,
            connectivity,
            requester,
            cycle_mutex: Mutex::new(()),
            status: RwLock::new(SyncEngineStatus::default()),
            remote_call_timeout,
        }
    }

    pub fn requester(&self) -> SyncRequester {
        self.requester.clone()
    }

    pub fn status(&self) -> SyncEngineStatus {
        self.status
            .read()
            .map(|status| status.clone())
            .unwrap_or_default()
    }

    /// Runs a pass now unless one is in flight, in which case a follow-up is
    /// queued and `Coalesced` is returned immediately.
    pub async fn sync_now(&self, trigger: SyncCycleTrigger) -> SyncPassResult {
        match self.cycle_mutex.try_lock() {
            Ok(_guard) => self.run_locked(trigger).await,
            Err(_) => {
                debug!("[Sync] Pass in flight; queueing {:?} follow-up", trigger);
                self.requester.request_sync(trigger);
                SyncPassResult::new(Uuid::new_v4().to_string(), trigger)
                    .with_status(SyncPassStatus::Coalesced)
            }
        }
    }

    /// Runs a pass, waiting for any in-flight pass to finish first.
    pub async fn run_pass(&self, trigger: SyncCycleTrigger) -> SyncPassResult {
        let _guard = self.cycle_mutex.lock().await;
        self.run_locked(trigger).await
    }

    /// Pulls the remote list. Clean local records take server state, clean
    /// records the server no longer has are dropped, dirty ones are left
    /// alone.
    pub async fn refresh_from_remote(&self) -> Result<PullSummary> {
        let _guard = self.cycle_mutex.lock().await;
        if let Err(status) = self.check_preconditions(SyncCycleTrigger::Manual).await {
            return Err(SyncError::unavailable(status.as_str()));
        }

        let remote_records = match self.call(self.remote.list_all()).await {
            Ok(records) => records,
            Err(err) => {
                if err.retry_class() == SyncRetryClass::ReauthRequired {
                    self.session.invalidate_remote_session();
                }
                return Err(err);
            }
        };
        let local_records = self.repository.get_all()?;

        let mut summary = PullSummary::default();
        let mut remote_ids = HashSet::with_capacity(remote_records.len());
        for record in remote_records {
            remote_ids.insert(record.id().to_string());
            if self.repository.upsert_from_remote(record).await? {
                summary.upserted += 1;
            }
        }
        for record in &local_records {
            if record.sync_status().is_dirty() {
                summary.kept_dirty += 1;
            } else if !remote_ids.contains(record.id())
                && self.repository.remove_clean(record.id()).await?
            {
                summary.removed += 1;
            }
        }

        info!(
            "[Sync] Pulled {} {} record(s): upserted={} removed={} kept_dirty={}",
            remote_ids.len(),
            T::KIND,
            summary.upserted,
            summary.removed,
            summary.kept_dirty
        );
        Ok(summary)
    }

    /// Spawns the worker that drains sync requests, one pass at a time.
    ///
    /// The engine holds a sender for follow-up passes, so the request channel
    /// stays open while the engine lives; the worker runs until its handle is
    /// aborted.
    pub fn spawn_worker(
        self: &Arc<Self>,
        mut requests: SyncRequestReceiver,
        periodic_interval: Option<Duration>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = periodic_interval.map(|every| {
                let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker
            });

            loop {
                let wake = tokio::select! {
                    Some(request) = requests.next() => WorkerWake::Request(request),
                    _ = next_tick(&mut ticker) => WorkerWake::Tick,
                };
                let trigger = match wake {
                    WorkerWake::Request(trigger) => trigger,
                    WorkerWake::Tick => requests.drain_pending(SyncCycleTrigger::Periodic),
                };

                let result = engine.run_pass(trigger).await;
                debug!(
                    "[Sync] Worker pass {} status={}",
                    result.pass_id,
                    result.status.as_str()
                );
            }
        })
    }

    async fn call<F, R>(&self, operation: F) -> Result<R>
    where
        F: Future<Output = Result<R>>,
    {
        match tokio::time::timeout(self.remote_call_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(self.remote_call_timeout.as_secs())),
        }
    }

    /// Reachability, local session, then remote session (prompting only for
    /// triggers that allow it).
    async fn check_preconditions(
        &self,
        trigger: SyncCycleTrigger,
    ) -> std::result::Result<(), SyncPassStatus> {
        let reachable = *self.connectivity.borrow();
        if !reachable {
            return Err(SyncPassStatus::SkippedOffline);
        }
        if !self.session.local_user_present() {
            return Err(SyncPassStatus::SkippedNoLocalSession);
        }
        if self.session.is_remote_authenticated() {
            return Ok(());
        }
        if !trigger.allows_reauth() {
            return Err(SyncPassStatus::SkippedUnauthenticated);
        }

        match tokio::time::timeout(
            self.remote_call_timeout,
            self.session.attempt_remote_authentication(),
        )
        .await
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(SyncPassStatus::SkippedUnauthenticated),
            Err(_) => {
                warn!("[Sync] Remote authentication timed out");
                Err(SyncPassStatus::SkippedUnauthenticated)
            }
        }
    }

    async fn run_locked(&self, trigger: SyncCycleTrigger) -> SyncPassResult {
        let mut state = PassState::new(trigger);

        if let Err(status) = self.check_preconditions(trigger).await {
            debug!("[Sync] Pass skipped ({:?}): {}", trigger, status.as_str());
            return self.finish(state, status);
        }

        let records = match self.repository.get_all() {
            Ok(records) => records,
            Err(err) => {
                warn!("[Sync] Failed to enumerate local {} records: {}", T::KIND, err);
                state.last_error = Some(err.to_string());
                return self.finish(state, SyncPassStatus::Failed);
            }
        };

        let mut created = Vec::new();
        let mut updated = Vec::new();
        let mut deleted = Vec::new();
        for record in records {
            match record.sync_status() {
                SyncStatus::None => {}
                SyncStatus::Created => created.push(record),
                SyncStatus::Updated => updated.push(record),
                SyncStatus::Deleted => deleted.push(record),
            }
        }

        if created.is_empty() && updated.is_empty() && deleted.is_empty() {
            return self.finish(state, SyncPassStatus::Ok);
        }
        debug!(
            "[Sync] Pass {} ({:?}): {} created, {} updated, {} deleted pending",
            state.result.pass_id,
            trigger,
            created.len(),
            updated.len(),
            deleted.len()
        );

        for record in &created {
            self.replay_create(&mut state, record).await;
        }
        for record in &updated {
            self.replay_update(&mut state, record).await;
        }
        for record in &deleted {
            self.replay_delete(&mut state, record).await;
        }

        if state.follow_up {
            self.requester.request_sync(SyncCycleTrigger::LocalMutation);
        }
        let status = if state.result.failed_count > 0 {
            SyncPassStatus::Partial
        } else {
            SyncPassStatus::Ok
        };
        self.finish(state, status)
    }

    fn remote_failed(&self, state: &mut PassState, action: &str, id: &str, err: SyncError) {
        warn!(
            "[Sync] Remote {} of {} {} failed ({:?}): {}",
            action,
            T::KIND,
            id,
            err.retry_class(),
            err
        );
        if err.retry_class() == SyncRetryClass::ReauthRequired && !state.reauth_required {
            state.reauth_required = true;
            self.session.invalidate_remote_session();
        }
        state.fail(err.to_string());
    }

    async fn replay_create(&self, state: &mut PassState, record: &T) {
        if state.reauth_required {
            state.result.failed_count += 1;
            return;
        }
        let server = match self.call(self.remote.create(record)).await {
            Ok(server) if !server.id().is_empty() => server,
            Ok(_) => {
                warn!("[Sync] Remote create of {} {} returned no id", T::KIND, record.id());
                state.fail(format!("create of {} returned no id", record.id()));
                return;
            }
            Err(err) => {
                self.remote_failed(state, "create", record.id(), err);
                return;
            }
        };

        match self.repository.reconcile_created(record, server.id()).await {
            Ok(outcome) => {
                state.result.created_count += 1;
                if outcome != CreateReconciliation::Promoted {
                    state.follow_up = true;
                }
                debug!(
                    "[Sync] {} {} created remotely as {} ({:?})",
                    T::KIND,
                    record.id(),
                    server.id(),
                    outcome
                );
            }
            Err(err) => {
                warn!(
                    "[Sync] Created {} {} remotely as {} but could not store it: {}",
                    T::KIND,
                    record.id(),
                    server.id(),
                    err
                );
                state.fail(err.to_string());
            }
        }
    }

    async fn replay_update(&self, state: &mut PassState, record: &T) {
        if state.reauth_required {
            state.result.failed_count += 1;
            return;
        }
        if let Err(err) = self.call(self.remote.update(record.id(), record)).await {
            self.remote_failed(state, "update", record.id(), err);
            return;
        }

        match self.repository.reconcile_updated(record).await {
            Ok(cleared) => {
                state.result.updated_count += 1;
                if !cleared {
                    state.follow_up = true;
                }
            }
            Err(err) => {
                warn!("[Sync] Could not clear {} {}: {}", T::KIND, record.id(), err);
                state.fail(err.to_string());
            }
        }
    }

    async fn replay_delete(&self, state: &mut PassState, record: &T) {
        if record.is_temp_id() {
            // Never existed remotely.
            match self.repository.reconcile_deleted(record.id()).await {
                Ok(_) => debug!("[Sync] Purged unsynced {} {}", T::KIND, record.id()),
                Err(err) => state.fail(err.to_string()),
            }
            return;
        }
        if state.reauth_required {
            state.result.failed_count += 1;
            return;
        }
        if let Err(err) = self.call(self.remote.delete(record.id())).await {
            self.remote_failed(state, "delete", record.id(), err);
            return;
        }

        match self.repository.reconcile_deleted(record.id()).await {
            Ok(gone) => {
                state.result.deleted_count += 1;
                if !gone {
                    state.follow_up = true;
                }
            }
            Err(err) => {
                warn!("[Sync] Could not purge {} {}: {}", T::KIND, record.id(), err);
                state.fail(err.to_string());
            }
        }
    }

    fn finish(&self, mut state: PassState, status: SyncPassStatus) -> SyncPassResult {
        state.result.status = status;
        state.result.duration_ms = state.started_at.elapsed().as_millis() as i64;

        if let Ok(mut engine_status) = self.status.write() {
            engine_status.last_pass_at = Some(Utc::now().to_rfc3339());
            engine_status.last_pass_status = Some(status);
            match status {
                SyncPassStatus::Ok => {
                    engine_status.consecutive_failures = 0;
                    engine_status.last_error = None;
                    engine_status.passes_completed += 1;
                }
                SyncPassStatus::Partial | SyncPassStatus::Failed => {
                    engine_status.consecutive_failures += 1;
                    engine_status.last_error = state.last_error.clone();
                    engine_status.passes_completed += 1;
                }
                _ => {}
            }
        }

        let result = state.result;
        if !status.is_skipped() {
            info!(
                "[Sync] Pass {} ({:?}) {}: created={} updated={} deleted={} failed={} in {}ms",
                result.pass_id,
                result.trigger,
                status.as_str(),
                result.created_count,
                result.updated_count,
                result.deleted_count,
                result.failed_count,
                result.duration_ms
            );
        }
        result
    }
}
