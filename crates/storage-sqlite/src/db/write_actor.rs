//! Single writer for the SQLite database.

use diesel::sqlite::SqliteConnection;
use log::error;
use tokio::sync::{mpsc, oneshot};

use fieldbook_core::errors::Result;

use super::DbPool;
use crate::errors::StorageError;

type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

/// Cloneable handle that submits write jobs to the writer thread.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl WriteHandle {
    /// Runs `job` on the writer connection and waits for its result.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Box::new(move |conn: &mut SqliteConnection| {
                let _ = reply_tx.send(job(conn));
            }))
            .map_err(|_| StorageError::Writer("write actor is not running".to_string()))?;

        reply_rx
            .await
            .map_err(|_| StorageError::Writer("write actor dropped the job".to_string()))?
    }
}

/// Spawns the writer thread. It holds one pooled connection for its lifetime
/// and exits once every [`WriteHandle`] is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

    let spawned = std::thread::Builder::new()
        .name("fieldbook-db-writer".to_string())
        .spawn(move || {
            let mut conn = match pool.get() {
                Ok(conn) => conn,
                Err(err) => {
                    error!("[Store] Writer could not acquire a connection: {}", err);
                    return;
                }
            };
            while let Some(job) = rx.blocking_recv() {
                job(&mut *conn);
            }
        });
    if let Err(err) = spawned {
        error!("[Store] Failed to spawn writer thread: {}", err);
    }

    WriteHandle { tx }
}
