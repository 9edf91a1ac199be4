//! Offline-first sync engine for the SGC field-sales app.
//!
//! Drains the device outbox against the backend:
//! - [`SyncOrchestrator`]: single-flight drains, per-entity ordering,
//!   retry backoff and a lifecycle event stream
//! - [`Reconciler`]: absorbs acknowledged server versions, replaying
//!   still-queued local mutations on top
//! - [`NetworkMonitor`]: connectivity signal pushed by the host
//! - [`RemoteGateway`]: the backend seam; `sgc-cloud` provides the HTTP one

mod backoff;
mod config;
mod error;
mod events;
mod gateway;
mod network;
mod orchestrator;
mod reconciler;

pub use backoff::{RetryPolicy, RetrySchedule};
pub use config::SyncConfig;
pub use error::{FailureClass, GatewayError, SyncError, SyncResult};
pub use events::{RunReport, SyncEvent, SyncStatus};
pub use gateway::{GatewayAck, GatewayRequest, RemoteGateway};
pub use network::{NetworkMonitor, NetworkState};
pub use orchestrator::{RunTrigger, Session, SyncOrchestrator, TriggerLoop};
pub use reconciler::{ReconcileOutcome, Reconciler};
