//! Error types for the sync crate.

use fieldbook_core::sync::{classify_http_status, SyncRetryClass};
use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised while talking to the remote store or driving a pass.
///
/// The engine absorbs every one of these at the pass boundary; they only
/// decide what gets logged and whether the remote session is dropped.
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-2xx reply from the remote store
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or rejected remote credentials
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Remote call timed out after {0}s")]
    Timeout(u64),

    /// Offline, or no usable session for the remote store
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Local(#[from] fieldbook_core::Error),
}

impl SyncError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::RemoteUnavailable(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> SyncRetryClass {
        match self {
            Self::Api { status, .. } => classify_http_status(*status),
            Self::Http(_) | Self::Timeout(_) | Self::RemoteUnavailable(_) => {
                SyncRetryClass::Retryable
            }
            Self::Auth(_) => SyncRetryClass::ReauthRequired,
            Self::Json(_) | Self::InvalidRequest(_) | Self::Config(_) | Self::Local(_) => {
                SyncRetryClass::Permanent
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_class_for_auth_error_is_reauth() {
        assert_eq!(
            SyncError::api(401, "unauthorized").retry_class(),
            SyncRetryClass::ReauthRequired
        );
        assert_eq!(
            SyncError::auth("no token").retry_class(),
            SyncRetryClass::ReauthRequired
        );
    }

    #[test]
    fn timeouts_and_server_errors_are_retryable() {
        assert_eq!(SyncError::Timeout(30).retry_class(), SyncRetryClass::Retryable);
        assert_eq!(
            SyncError::api(503, "maintenance").retry_class(),
            SyncRetryClass::Retryable
        );
        assert_eq!(
            SyncError::api(422, "bad email").retry_class(),
            SyncRetryClass::Permanent
        );
    }
}
