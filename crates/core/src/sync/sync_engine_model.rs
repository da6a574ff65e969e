//! Sync pass triggers, outcomes and engine status.

use serde::{Deserialize, Serialize};

/// Why a sync pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCycleTrigger {
    Startup,
    LocalMutation,
    Reconnect,
    Periodic,
    Manual,
}

impl SyncCycleTrigger {
    /// Whether a pass under this trigger may ask for remote authentication.
    /// Mutation and periodic passes never prompt the user.
    pub fn allows_reauth(self) -> bool {
        matches!(self, Self::Reconnect | Self::Manual)
    }

    /// Trigger for a follow-up pass that coalesces `self` and `other`.
    /// A trigger that may re-authenticate is never lost to one that may not.
    pub fn merge(self, other: Self) -> Self {
        if self.allows_reauth() && !other.allows_reauth() {
            self
        } else {
            other
        }
    }
}

/// Handle that requests a sync pass without waiting for it.
pub trait SyncTrigger: Send + Sync {
    fn request_sync(&self, trigger: SyncCycleTrigger);
}

/// Trigger that drops every request. Used when no engine is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSyncTrigger;

impl SyncTrigger for NoopSyncTrigger {
    fn request_sync(&self, _trigger: SyncCycleTrigger) {}
}

/// Retry policy classification for remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Classify an HTTP status into retry behavior.
pub fn classify_http_status(status: u16) -> SyncRetryClass {
    match status {
        401 | 403 => SyncRetryClass::ReauthRequired,
        408 | 409 | 423 | 425 | 429 => SyncRetryClass::Retryable,
        500..=599 => SyncRetryClass::Retryable,
        _ => SyncRetryClass::Permanent,
    }
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPassStatus {
    /// Every dirty record was reconciled (or there was nothing to do).
    Ok,
    /// At least one remote call failed; those records stay dirty.
    Partial,
    SkippedOffline,
    SkippedNoLocalSession,
    SkippedUnauthenticated,
    /// Another pass was in flight; a follow-up was queued instead.
    Coalesced,
    /// Local state could not be enumerated.
    Failed,
}

impl SyncPassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Partial => "partial",
            Self::SkippedOffline => "skipped_offline",
            Self::SkippedNoLocalSession => "skipped_no_local_session",
            Self::SkippedUnauthenticated => "skipped_unauthenticated",
            Self::Coalesced => "coalesced",
            Self::Failed => "failed",
        }
    }

    /// True when the pass did not touch the remote store at all.
    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            Self::SkippedOffline
                | Self::SkippedNoLocalSession
                | Self::SkippedUnauthenticated
                | Self::Coalesced
        )
    }
}

/// Counters and outcome of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPassResult {
    pub pass_id: String,
    pub trigger: SyncCycleTrigger,
    pub status: SyncPassStatus,
    pub created_count: usize,
    pub updated_count: usize,
    pub deleted_count: usize,
    pub failed_count: usize,
    pub duration_ms: i64,
}

impl SyncPassResult {
    pub fn new(pass_id: impl Into<String>, trigger: SyncCycleTrigger) -> Self {
        Self {
            pass_id: pass_id.into(),
            trigger,
            status: SyncPassStatus::Ok,
            created_count: 0,
            updated_count: 0,
            deleted_count: 0,
            failed_count: 0,
            duration_ms: 0,
        }
    }

    pub fn with_status(mut self, status: SyncPassStatus) -> Self {
        self.status = status;
        self
    }

    /// Records reconciled successfully during the pass.
    pub fn reconciled_count(&self) -> usize {
        self.created_count + self.updated_count + self.deleted_count
    }
}

/// Lightweight engine status kept across passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEngineStatus {
    pub last_pass_at: Option<String>,
    pub last_pass_status: Option<SyncPassStatus>,
    pub last_error: Option<String>,
    pub consecutive_failures: i32,
    pub passes_completed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_http_status_for_retry_policy() {
        assert_eq!(classify_http_status(500), SyncRetryClass::Retryable);
        assert_eq!(classify_http_status(429), SyncRetryClass::Retryable);
        assert_eq!(classify_http_status(401), SyncRetryClass::ReauthRequired);
        assert_eq!(classify_http_status(400), SyncRetryClass::Permanent);
    }

    #[test]
    fn merge_keeps_reauth_capable_trigger() {
        use SyncCycleTrigger::*;
        assert_eq!(Reconnect.merge(LocalMutation), Reconnect);
        assert_eq!(LocalMutation.merge(Reconnect), Reconnect);
        assert_eq!(LocalMutation.merge(Periodic), Periodic);
        assert_eq!(Manual.merge(Reconnect), Reconnect);
    }

    #[test]
    fn pass_status_serialization_matches_labels() {
        for status in [
            SyncPassStatus::Ok,
            SyncPassStatus::Partial,
            SyncPassStatus::SkippedOffline,
            SyncPassStatus::SkippedNoLocalSession,
            SyncPassStatus::SkippedUnauthenticated,
            SyncPassStatus::Coalesced,
            SyncPassStatus::Failed,
        ] {
            let encoded = serde_json::to_string(&status).expect("serialize status");
            assert_eq!(encoded, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn skipped_statuses_do_not_touch_remote() {
        assert!(SyncPassStatus::SkippedOffline.is_skipped());
        assert!(SyncPassStatus::Coalesced.is_skipped());
        assert!(!SyncPassStatus::Partial.is_skipped());
        assert!(!SyncPassStatus::Ok.is_skipped());
    }
}
