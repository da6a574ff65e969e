//! Sync request channel.
//!
//! Local mutations, reconnects and timers push triggers; a single worker
//! drains them. Everything queued while a pass runs collapses into one
//! follow-up pass.

use log::debug;
use tokio::sync::mpsc;

use fieldbook_core::sync::{SyncCycleTrigger, SyncTrigger};

pub fn sync_request_channel() -> (SyncRequester, SyncRequestReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SyncRequester { tx }, SyncRequestReceiver { rx })
}

/// Cheap, cloneable sending half.
#[derive(Debug, Clone)]
pub struct SyncRequester {
    tx: mpsc::UnboundedSender<SyncCycleTrigger>,
}

impl SyncTrigger for SyncRequester {
    fn request_sync(&self, trigger: SyncCycleTrigger) {
        if self.tx.send(trigger).is_err() {
            debug!("[Sync] Worker stopped; dropping {:?} request", trigger);
        }
    }
}

#[derive(Debug)]
pub struct SyncRequestReceiver {
    rx: mpsc::UnboundedReceiver<SyncCycleTrigger>,
}

impl SyncRequestReceiver {
    /// Waits for the next request and folds in everything already queued.
    /// `None` once every sender is gone.
    pub async fn next(&mut self) -> Option<SyncCycleTrigger> {
        let first = self.rx.recv().await?;
        Some(self.drain_pending(first))
    }

    /// Non-blocking variant of [`SyncRequestReceiver::next`].
    pub fn try_next(&mut self) -> Option<SyncCycleTrigger> {
        let first = self.rx.try_recv().ok()?;
        Some(self.drain_pending(first))
    }

    pub fn drain_pending(&mut self, mut trigger: SyncCycleTrigger) -> SyncCycleTrigger {
        while let Ok(next) = self.rx.try_recv() {
            trigger = trigger.merge(next);
        }
        trigger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_requests_collapse_into_one() {
        let (requester, mut receiver) = sync_request_channel();
        requester.request_sync(SyncCycleTrigger::LocalMutation);
        requester.request_sync(SyncCycleTrigger::Reconnect);
        requester.request_sync(SyncCycleTrigger::LocalMutation);

        assert_eq!(receiver.next().await, Some(SyncCycleTrigger::Reconnect));
        assert_eq!(receiver.try_next(), None);
    }

    #[tokio::test]
    async fn receiver_ends_when_senders_drop() {
        let (requester, mut receiver) = sync_request_channel();
        drop(requester);
        assert_eq!(receiver.next().await, None);
    }
}
