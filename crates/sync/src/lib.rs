//! Offline-first synchronization for Fieldbook.
//!
//! Local mutations land in the encrypted store first; the [`SyncEngine`]
//! replays them against a [`RemoteStore`] whenever the network is reachable
//! and a remote session is available.

pub mod client;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod remote;
pub mod runtime;
pub mod session;

pub use client::CustomerApiClient;
pub use config::SyncConfig;
pub use connectivity::{spawn_reconnect_listener, ConnectivityMonitor};
pub use engine::{sync_request_channel, SyncEngine, SyncRequestReceiver, SyncRequester};
pub use error::{Result, SyncError};
pub use remote::{RemoteAuthenticator, RemoteStore};
pub use runtime::SyncRuntime;
pub use session::{CredentialPrompt, SessionManager};
