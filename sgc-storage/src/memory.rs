//! In-memory backend, used by tests and by hosts without durable storage.

use crate::error::{StorageError, StorageResult};
use crate::port::{StoragePort, Table, WriteOp};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct Row {
    partition: String,
    value: String,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    rows: HashMap<(Table, String), Row>,
    next_seq: u64,
}

/// Process-local [`StoragePort`]. Batches are atomic because every call
/// holds the single lock for its whole duration.
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StorageError::Unavailable("memory backend lock poisoned".into()))
    }

    /// Number of rows in a table, across all organizations.
    pub fn len(&self, table: Table) -> usize {
        self.lock()
            .map(|inner| inner.rows.keys().filter(|(t, _)| *t == table).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, table: Table) -> bool {
        self.len(table) == 0
    }
}

impl StoragePort for MemoryBackend {
    fn get(&self, table: Table, key: &str) -> StorageResult<Option<String>> {
        let inner = self.lock()?;
        Ok(inner
            .rows
            .get(&(table, key.to_string()))
            .map(|row| row.value.clone()))
    }

    fn list_by_index(&self, table: Table, partition: &str) -> StorageResult<Vec<String>> {
        let inner = self.lock()?;
        let mut rows: Vec<&Row> = inner
            .rows
            .iter()
            .filter(|((t, _), row)| *t == table && row.partition == partition)
            .map(|(_, row)| row)
            .collect();
        rows.sort_by_key(|row| row.seq);
        Ok(rows.into_iter().map(|row| row.value.clone()).collect())
    }

    fn write_batch(&self, ops: &[WriteOp]) -> StorageResult<()> {
        let mut inner = self.lock()?;
        for op in ops {
            match op {
                WriteOp::Put {
                    table,
                    key,
                    partition,
                    value,
                } => {
                    let map_key = (*table, key.clone());
                    let seq = match inner.rows.get(&map_key) {
                        Some(existing) => existing.seq,
                        None => {
                            inner.next_seq += 1;
                            inner.next_seq
                        }
                    };
                    inner.rows.insert(
                        map_key,
                        Row {
                            partition: partition.clone(),
                            value: value.clone(),
                            seq,
                        },
                    );
                }
                WriteOp::Delete { table, key } => {
                    inner.rows.remove(&(*table, key.clone()));
                }
            }
        }
        Ok(())
    }
}
