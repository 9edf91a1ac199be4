//! Key-value storage port.
//!
//! The entity store and the outbox never talk to a database directly; they
//! go through [`StoragePort`], so any key-value backend can hold them. Rows
//! are addressed by `(table, key)` and carry one secondary index, the
//! organization id (`partition`), which is the only way to list rows.

use crate::error::StorageResult;
use std::fmt;

/// Logical tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Entities,
    Outbox,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Entities => "entities",
            Table::Outbox => "outbox",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put {
        table: Table,
        key: String,
        partition: String,
        value: String,
    },
    Delete {
        table: Table,
        key: String,
    },
}

/// Minimal storage contract: `get / put / delete / list_by_index` plus an
/// all-or-nothing `write_batch`.
///
/// `list_by_index` returns values in first-insertion order. Overwriting a key
/// keeps its original position.
pub trait StoragePort: Send + Sync {
    fn get(&self, table: Table, key: &str) -> StorageResult<Option<String>>;

    fn list_by_index(&self, table: Table, partition: &str) -> StorageResult<Vec<String>>;

    /// Applies every op or none of them.
    fn write_batch(&self, ops: &[WriteOp]) -> StorageResult<()>;

    fn put(&self, table: Table, key: &str, partition: &str, value: &str) -> StorageResult<()> {
        self.write_batch(&[WriteOp::Put {
            table,
            key: key.to_string(),
            partition: partition.to_string(),
            value: value.to_string(),
        }])
    }

    fn delete(&self, table: Table, key: &str) -> StorageResult<()> {
        self.write_batch(&[WriteOp::Delete {
            table,
            key: key.to_string(),
        }])
    }
}
