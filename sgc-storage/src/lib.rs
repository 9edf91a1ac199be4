//! Durable local storage for the SGC sync engine.
//!
//! Provides the two device-owned tables the sync engine works on:
//! - The entity store: versioned clients and visits, stale writes refused
//! - The outbox queue: mutations awaiting server confirmation
//!
//! Both sit on the [`StoragePort`] key-value contract, with an in-memory
//! backend for tests and a SQLite backend for devices.

mod capture;
mod entity_store;
mod error;
mod memory;
mod outbox;
mod port;
mod sqlite;

pub use capture::{LocalStore, ServerState, WriteLock};
pub use entity_store::EntityStore;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use outbox::{OutboxCounts, OutboxQueue};
pub use port::{StoragePort, Table, WriteOp};
pub use sqlite::SqliteBackend;
