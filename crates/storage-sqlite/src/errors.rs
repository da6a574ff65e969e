//! Storage-layer errors and their mapping into core errors.

use fieldbook_core::errors::{DatabaseError, Error};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Writer unavailable: {0}")]
    Writer(String),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Query(e) => Error::Database(DatabaseError::Query(e.to_string())),
            StorageError::Connection(e) => {
                Error::Database(DatabaseError::Connection(e.to_string()))
            }
            StorageError::Pool(e) => Error::Database(DatabaseError::Connection(e.to_string())),
            StorageError::Migration(message) => Error::Database(DatabaseError::Migration(message)),
            StorageError::Writer(message) => Error::Database(DatabaseError::Internal(message)),
        }
    }
}
