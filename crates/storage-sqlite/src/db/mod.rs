//! SQLite connection management: file location, migrations and pooled readers.
//!
//! Reads go through the r2d2 pool; every write is funnelled through the single
//! writer actor in [`write_actor`] so SQLite never sees competing writers.

pub mod write_actor;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;
use std::path::Path;
use std::sync::Arc;

use fieldbook_core::errors::{DatabaseError, Error, Result};

use crate::errors::StorageError;

pub use write_actor::{spawn_writer, WriteHandle};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const DB_FILE_NAME: &str = "fieldbook.db";
const POOL_MAX_SIZE: u32 = 8;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), r2d2::Error> {
        conn.batch_execute(
            "PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000; PRAGMA synchronous = NORMAL;",
        )
        .map_err(r2d2::Error::QueryError)
    }
}

/// Ensures the data directory exists and returns the database file path.
pub fn init(app_data_dir: &str) -> Result<String> {
    let dir = Path::new(app_data_dir);
    std::fs::create_dir_all(dir).map_err(|e| {
        Error::Database(DatabaseError::Connection(format!(
            "Failed to create data directory '{}': {}",
            app_data_dir, e
        )))
    })?;
    Ok(dir.join(DB_FILE_NAME).to_string_lossy().to_string())
}

pub fn run_migrations(db_path: &str) -> Result<()> {
    let mut conn = SqliteConnection::establish(db_path).map_err(StorageError::from)?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| StorageError::Migration(e.to_string()))?;
    if !applied.is_empty() {
        info!("[Store] Applied {} migration(s) to {}", applied.len(), db_path);
    }
    Ok(())
}

pub fn create_pool(db_path: &str) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = Pool::builder()
        .max_size(POOL_MAX_SIZE)
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)
        .map_err(StorageError::from)?;
    Ok(Arc::new(pool))
}

pub fn get_connection(pool: &DbPool) -> Result<DbConnection> {
    Ok(pool.get().map_err(StorageError::from)?)
}
