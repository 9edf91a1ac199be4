//! SQLite backend for the storage port.

use crate::error::{StorageError, StorageResult};
use crate::port::{StoragePort, Table, WriteOp};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Durable [`StoragePort`] backed by a single SQLite file.
///
/// Every row lives in one `records` table keyed by `(tbl, key)`; `seq`
/// preserves first-insertion order for `list_by_index`.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Opens or creates a store at the given path (WAL journal).
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        debug!("opened sqlite store at {} (journal_mode={mode})", path.display());
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("sqlite connection lock poisoned".into()))
    }
}

impl StoragePort for SqliteBackend {
    fn get(&self, table: Table, key: &str) -> StorageResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM records WHERE tbl = ?1 AND key = ?2",
                params![table.as_str(), key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn list_by_index(&self, table: Table, partition: &str) -> StorageResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT value FROM records WHERE tbl = ?1 AND partition = ?2 ORDER BY seq",
        )?;
        let values = stmt
            .query_map(params![table.as_str(), partition], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    }

    fn write_batch(&self, ops: &[WriteOp]) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for op in ops {
            match op {
                WriteOp::Put {
                    table,
                    key,
                    partition,
                    value,
                } => {
                    tx.execute(
                        r#"
                        INSERT INTO records (tbl, key, partition, value, seq)
                        VALUES (?1, ?2, ?3, ?4, (SELECT COALESCE(MAX(seq), 0) + 1 FROM records))
                        ON CONFLICT(tbl, key) DO UPDATE SET
                            partition = excluded.partition,
                            value = excluded.value
                        "#,
                        params![table.as_str(), key, partition, value],
                    )?;
                }
                WriteOp::Delete { table, key } => {
                    tx.execute(
                        "DELETE FROM records WHERE tbl = ?1 AND key = ?2",
                        params![table.as_str(), key],
                    )?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            tbl TEXT NOT NULL,
            key TEXT NOT NULL,
            partition TEXT NOT NULL,
            value TEXT NOT NULL,
            seq INTEGER NOT NULL,
            PRIMARY KEY (tbl, key)
        );
        CREATE INDEX IF NOT EXISTS idx_records_partition ON records(tbl, partition, seq);
        "#,
    )?;
    Ok(())
}
