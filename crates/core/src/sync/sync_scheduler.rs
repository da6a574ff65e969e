//! Scheduler constants for the sync worker.

/// Upper bound for a single remote call. A call that exceeds it counts as a
/// failed call and leaves the record dirty.
pub const DEFAULT_REMOTE_CALL_TIMEOUT_SECS: u64 = 30;

/// Shortest periodic pass interval accepted from configuration.
pub const MIN_PERIODIC_SYNC_INTERVAL_SECS: u64 = 15;
