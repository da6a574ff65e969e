//! Error taxonomy shared by the storage and sync crates.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the local cipher layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Serialization or sealing failed before anything was written.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Stored bytes could not be opened or parsed under the supplied key.
    #[error("Unable to read local data: {0}")]
    Decryption(String),
}

/// Failures reported by a local storage backend.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Top-level error for local operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// No locally authenticated user, so no key material is available.
    #[error("No local session: {0}")]
    NoLocalSession(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Crypto(CryptoError::Encryption(message.into()))
    }

    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Crypto(CryptoError::Decryption(message.into()))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Database(DatabaseError::Internal(message.into()))
    }

    /// True when the error means the local data cannot be read with the
    /// current key (corruption or key mismatch).
    pub fn is_unreadable_local_data(&self) -> bool {
        matches!(self, Self::Crypto(CryptoError::Decryption(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decryption_error_reads_as_unreadable_local_data() {
        let err = Error::decryption("bad tag");
        assert!(err.is_unreadable_local_data());
        assert_eq!(err.to_string(), "Unable to read local data: bad tag");
    }

    #[test]
    fn encryption_error_is_not_unreadable_local_data() {
        assert!(!Error::encryption("empty key").is_unreadable_local_data());
    }
}
