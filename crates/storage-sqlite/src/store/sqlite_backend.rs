//! SQLite-backed key-value table.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use fieldbook_core::errors::Result;

use super::KvBackend;
use crate::db::{create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::store_entries;

#[derive(Queryable, Insertable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::store_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StoreEntryDB {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

impl StoreEntryDB {
    fn new(key: String, value: String) -> Self {
        Self {
            key,
            value,
            updated_at: Utc::now().to_rfc3339(),
        }
    }
}

fn upsert_entry(conn: &mut SqliteConnection, row: &StoreEntryDB) -> QueryResult<usize> {
    diesel::insert_into(store_entries::table)
        .values(row)
        .on_conflict(store_entries::key)
        .do_update()
        .set((
            store_entries::value.eq(&row.value),
            store_entries::updated_at.eq(&row.updated_at),
        ))
        .execute(conn)
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

pub struct SqliteBackend {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteBackend {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    /// Opens the store under `app_data_dir`, creating and migrating the
    /// database file when needed.
    pub fn open(app_data_dir: &str) -> Result<Self> {
        let db_path = init(app_data_dir)?;
        run_migrations(&db_path)?;
        let pool = create_pool(&db_path)?;
        let writer = spawn_writer(pool.as_ref().clone());
        Ok(Self::new(pool, writer))
    }
}

#[async_trait]
impl KvBackend for SqliteBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let mut conn = get_connection(&self.pool)?;
        let value = store_entries::table
            .find(key)
            .select(store_entries::value)
            .first::<String>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(value)
    }

    fn entries(&self) -> Result<Vec<(String, String)>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = store_entries::table
            .select((store_entries::key, store_entries::value))
            .order(store_entries::key.asc())
            .load::<(String, String)>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows)
    }

    fn entries_with_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = store_entries::table
            .filter(
                store_entries::key
                    .like(format!("{}%", escape_like(prefix)))
                    .escape('\\'),
            )
            .select((store_entries::key, store_entries::value))
            .order(store_entries::key.asc())
            .load::<(String, String)>(&mut conn)
            .map_err(StorageError::from)?;
        // LIKE ignores ASCII case.
        Ok(rows
            .into_iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .collect())
    }

    async fn write(&self, key: String, value: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                upsert_entry(conn, &StoreEntryDB::new(key, value)).map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn remove(&self, key: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::delete(store_entries::table.find(key))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn rename(&self, old_key: String, new_key: String, value: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                conn.immediate_transaction::<_, StorageError, _>(|conn| {
                    diesel::delete(store_entries::table.find(&old_key)).execute(conn)?;
                    upsert_entry(conn, &StoreEntryDB::new(new_key, value))?;
                    Ok(())
                })?;
                Ok(())
            })
            .await
    }

    async fn clear(&self) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::delete(store_entries::table)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}
