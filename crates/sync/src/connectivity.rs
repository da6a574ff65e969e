//! Network reachability signal.
//!
//! The monitor is a de-duplicating `watch` channel: publishing the current
//! value again wakes nobody. The engine holds a receiver to check
//! reachability before a pass.
//!
//! A `watch` only keeps the latest value, so an offline and online pair
//! published back to back looks like no change at all. Offline to online
//! transitions are therefore also counted on a second channel, and
//! [`spawn_reconnect_listener`] turns every counted transition into one
//! reconnect request.

use futures::{Stream, StreamExt};
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use fieldbook_core::sync::{SessionProvider, SyncCycleTrigger, SyncTrigger};

#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
    reconnects: watch::Sender<u64>,
}

impl ConnectivityMonitor {
    pub fn new(initially_reachable: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_reachable);
        let (reconnects, _rx) = watch::channel(0);
        Self { tx, reconnects }
    }

    /// Publishes reachability. Returns whether the value changed.
    pub fn set_reachable(&self, reachable: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == reachable {
                false
            } else {
                *current = reachable;
                true
            }
        });
        if changed && reachable {
            self.reconnects.send_modify(|count| *count += 1);
        }
        if changed {
            info!(
                "[Connectivity] Network {}",
                if reachable { "reachable" } else { "unreachable" }
            );
        }
        changed
    }

    pub fn is_reachable(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Running count of offline to online transitions.
    pub fn subscribe_reconnects(&self) -> watch::Receiver<u64> {
        self.reconnects.subscribe()
    }

    /// Feeds a platform event source into the monitor until it ends.
    pub fn follow<S>(self: &Arc<Self>, source: S) -> JoinHandle<()>
    where
        S: Stream<Item = bool> + Send + 'static,
    {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut source = Box::pin(source);
            while let Some(reachable) = source.next().await {
                monitor.set_reachable(reachable);
            }
            debug!("[Connectivity] Event source ended");
        })
    }
}

/// Requests a reconnect pass on every offline to online transition while a
/// local session exists. The pass itself attempts remote authentication.
///
/// Transitions counted after `reconnects` was subscribed are honored even if
/// they happen before the task first runs.
pub fn spawn_reconnect_listener(
    mut reconnects: watch::Receiver<u64>,
    session: Arc<dyn SessionProvider>,
    trigger: Arc<dyn SyncTrigger>,
) -> JoinHandle<()> {
    let mut seen = *reconnects.borrow();
    tokio::spawn(async move {
        while reconnects.changed().await.is_ok() {
            let count = *reconnects.borrow_and_update();
            let transitions = count.saturating_sub(seen);
            seen = count;
            if transitions == 0 {
                continue;
            }
            if session.local_user_present() {
                for _ in 0..transitions {
                    trigger.request_sync(SyncCycleTrigger::Reconnect);
                }
            } else {
                debug!("[Connectivity] Back online without a local session; not syncing");
            }
        }
    })
}
