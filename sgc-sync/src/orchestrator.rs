//! Sync orchestrator: drains the outbox against the remote gateway.
//!
//! - Single-flight: concurrent triggers join the drain already running
//! - Same-entity items are delivered in queue order; an entity whose item
//!   failed is skipped for the rest of the run
//! - Lifecycle events go out on a broadcast channel
//!
//! Storage backends are synchronous, so every store call runs on the
//! blocking pool.

use crate::backoff::RetrySchedule;
use crate::config::SyncConfig;
use crate::error::{FailureClass, GatewayError, SyncError, SyncResult};
use crate::events::{RunReport, SyncEvent, SyncStatus};
use crate::gateway::{GatewayRequest, RemoteGateway};
use crate::network::{NetworkMonitor, NetworkState};
use crate::reconciler::Reconciler;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use sgc_storage::{LocalStore, StorageError, StorageResult};
use sgc_types::{
    AttachmentPayload, Entity, EntityId, OrganizationId, SyncItemKind, SyncQueueItem, VendorId,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// What started a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTrigger {
    /// `force_sync`. May ignore backoff windows.
    Manual,
    /// Periodic timer while online.
    Timer,
    /// Debounced transition to online.
    Reconnect,
}

/// Tenant and sales rep the orchestrator works for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub organization_id: OrganizationId,
    pub vendor_id: VendorId,
}

type SharedRun = Shared<BoxFuture<'static, RunReport>>;

struct InFlight {
    id: u64,
    run: SharedRun,
}

struct Inner {
    store: LocalStore,
    reconciler: Reconciler,
    gateway: Arc<dyn RemoteGateway>,
    network: NetworkMonitor,
    session: Session,
    config: SyncConfig,
    events: broadcast::Sender<SyncEvent>,
    schedule: Mutex<RetrySchedule>,
    in_flight: Mutex<Option<InFlight>>,
    next_run_id: AtomicU64,
    last_sync_at: Mutex<Option<DateTime<Utc>>>,
}

/// Handle to the sync orchestrator. Cheap to clone; all clones share one
/// drain slot and one event channel.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

/// Recovers from a poisoned lock; the guarded state stays consistent
/// because no critical section can panic halfway.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl SyncOrchestrator {
    pub fn new(
        store: LocalStore,
        gateway: Arc<dyn RemoteGateway>,
        network: NetworkMonitor,
        session: Session,
        config: SyncConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            inner: Arc::new(Inner {
                reconciler: Reconciler::new(store.clone()),
                store,
                gateway,
                network,
                session,
                schedule: Mutex::new(RetrySchedule::new(config.retry_policy())),
                config,
                events,
                in_flight: Mutex::new(None),
                next_run_id: AtomicU64::new(1),
                last_sync_at: Mutex::new(None),
            }),
        }
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.inner.network
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Lifecycle events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        lock(&self.inner.in_flight).is_some()
    }

    /// Drains the outbox now and resolves when that drain finishes. Joins
    /// the running drain instead when there is one.
    pub async fn force_sync(&self) -> RunReport {
        self.start_run(RunTrigger::Manual).await
    }

    /// Starts a drain, or returns the one in flight.
    fn start_run(&self, trigger: RunTrigger) -> SharedRun {
        let mut slot = lock(&self.inner.in_flight);
        if let Some(in_flight) = slot.as_ref() {
            debug!("[SYNC] Drain already running, joining it ({trigger:?})");
            return in_flight.run.clone();
        }

        let id = self.inner.next_run_id.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let report = inner.clone().drain(trigger).await;
            inner.finish_run(id);
            report
        });

        let inner = self.inner.clone();
        let run = async move {
            let report = task.await.unwrap_or_else(|e| RunReport {
                aborted: Some(format!("drain task failed: {e}")),
                ..RunReport::default()
            });
            inner.finish_run(id);
            report
        }
        .boxed()
        .shared();

        *slot = Some(InFlight {
            id,
            run: run.clone(),
        });
        run
    }

    /// User retry: every `error` item goes back to `pending`, attempts kept,
    /// and becomes due immediately. Returns how many items were reset.
    pub async fn retry_failed(&self) -> SyncResult<usize> {
        let org = self.inner.session.organization_id.clone();
        let (ids, reset) = self
            .inner
            .blocking(move |store| {
                let ids: Vec<_> = store
                    .outbox()
                    .list_all(&org)?
                    .into_iter()
                    .filter(|item| item.is_error())
                    .map(|item| item.id)
                    .collect();
                let reset = store.reset_errors(&org)?;
                Ok((ids, reset))
            })
            .await?;

        let now = Instant::now();
        let mut schedule = lock(&self.inner.schedule);
        for id in ids {
            schedule.release(id, now);
        }
        Ok(reset)
    }

    pub async fn status(&self) -> SyncResult<SyncStatus> {
        let org = self.inner.session.organization_id.clone();
        let counts = self
            .inner
            .blocking(move |store| store.outbox().counts(&org))
            .await?;
        Ok(SyncStatus {
            is_syncing: self.is_syncing(),
            is_online: self.inner.network.is_online(),
            pending: counts.pending + counts.syncing,
            errors: counts.error,
            last_sync_at: *lock(&self.inner.last_sync_at),
        })
    }

    // ── Capture path ─────────────────────────────────────────────

    /// Applies `patch` to `entity`, stores it and queues the mutation.
    pub async fn capture(
        &self,
        entity: Entity,
        patch: serde_json::Value,
    ) -> SyncResult<(Entity, SyncQueueItem)> {
        if entity.organization_id != self.inner.session.organization_id {
            return Err(StorageError::TenantMismatch(entity.id.to_string()).into());
        }
        let max_attempts = self.inner.config.max_attempts;
        self.inner
            .blocking(move |store| store.capture(&entity, patch, max_attempts))
            .await
    }

    pub async fn capture_attachment(
        &self,
        kind: SyncItemKind,
        attachment: AttachmentPayload,
    ) -> SyncResult<SyncQueueItem> {
        let org = self.inner.session.organization_id.clone();
        let max_attempts = self.inner.config.max_attempts;
        self.inner
            .blocking(move |store| store.capture_attachment(&org, kind, &attachment, max_attempts))
            .await
    }

    pub async fn get_entity(&self, id: EntityId) -> SyncResult<Option<Entity>> {
        let org = self.inner.session.organization_id.clone();
        let entity = self
            .inner
            .blocking(move |store| store.entities().get(&id))
            .await?;
        Ok(entity.filter(|e| e.organization_id == org))
    }

    pub async fn list_entities(&self) -> SyncResult<Vec<Entity>> {
        let org = self.inner.session.organization_id.clone();
        self.inner
            .blocking(move |store| store.entities().list(&org))
            .await
    }

    pub async fn outbox(&self) -> SyncResult<Vec<SyncQueueItem>> {
        let org = self.inner.session.organization_id.clone();
        self.inner
            .blocking(move |store| store.outbox().list_all(&org))
            .await
    }

    // ── Automatic triggers ───────────────────────────────────────

    /// Spawns the loop that drains on the periodic timer (while online) and
    /// on debounced reconnects.
    pub fn spawn_triggers(&self) -> TriggerLoop {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        // Subscribe before spawning so transitions reported right after this
        // call are not missed.
        let changes = self.inner.network.subscribe();
        let orchestrator = self.clone();
        let task =
            tokio::spawn(async move { orchestrator.run_triggers(changes, shutdown_rx).await });
        TriggerLoop {
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    async fn run_triggers(
        self,
        mut changes: watch::Receiver<NetworkState>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let network = self.inner.network.clone();
        let mut timer = tokio::time::interval(self.inner.config.sync_interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip first immediate tick
        timer.tick().await;

        let mut reconnect_at: Option<Instant> = None;
        info!(
            "[SYNC] Triggers started for {} (interval {:?}, debounce {:?})",
            self.inner.session.organization_id,
            self.inner.config.sync_interval(),
            network.debounce()
        );

        loop {
            let reconnect = async move {
                match reconnect_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = &mut shutdown => {
                    info!("[SYNC] Triggers shutting down");
                    break;
                }
                _ = timer.tick() => {
                    if network.is_online() {
                        debug!("[SYNC] Periodic drain");
                        drop(self.start_run(RunTrigger::Timer));
                    }
                }
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = changes.borrow_and_update().online;
                    reconnect_at = online.then(|| network.next_trigger_at());
                }
                _ = reconnect => {
                    reconnect_at = None;
                    if network.is_online() {
                        info!("[SYNC] Connectivity stable, draining outbox");
                        drop(self.start_run(RunTrigger::Reconnect));
                    }
                }
            }
        }
    }
}

/// Running trigger loop. Dropping it also stops the loop, without waiting.
pub struct TriggerLoop {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TriggerLoop {
    /// Stops the loop. A drain already running is not interrupted.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!("[SYNC] Trigger loop ended abnormally: {e}");
        }
    }
}

// ── Drain ────────────────────────────────────────────────────────

impl Inner {
    async fn blocking<T, F>(&self, f: F) -> SyncResult<T>
    where
        F: FnOnce(&LocalStore) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        Ok(tokio::task::spawn_blocking(move || f(&store)).await??)
    }

    fn emit(&self, event: SyncEvent) {
        debug!("[SYNC] Event {event:?}");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn finish_run(&self, id: u64) {
        let mut slot = lock(&self.in_flight);
        if slot.as_ref().is_some_and(|in_flight| in_flight.id == id) {
            *slot = None;
        }
    }

    async fn drain(self: Arc<Self>, trigger: RunTrigger) -> RunReport {
        let org = self.session.organization_id.clone();
        info!("[SYNC] Drain started for {org} ({trigger:?})");
        self.emit(SyncEvent::Start);

        let mut report = RunReport::default();
        if let Err(e) = self.process(trigger, &mut report).await {
            error!("[SYNC] Drain aborted: {e}");
            report.aborted = Some(e.to_string());
        }

        let counts = self
            .blocking({
                let org = org.clone();
                move |store| store.outbox().counts(&org)
            })
            .await;
        match counts {
            Ok(counts) => {
                report.remaining = counts.total();
                report.errors = counts.error;
            }
            Err(e) => {
                error!("[SYNC] Failed to count outbox after drain: {e}");
                report.aborted.get_or_insert_with(|| e.to_string());
            }
        }

        let event = if let Some(reason) = &report.aborted {
            SyncEvent::Error {
                failed_count: report.errors,
                reason: Some(reason.clone()),
            }
        } else if report.errors > 0 {
            SyncEvent::Error {
                failed_count: report.errors,
                reason: None,
            }
        } else if report.remaining == 0 {
            SyncEvent::Complete {
                synced: report.synced,
            }
        } else {
            SyncEvent::Incomplete {
                synced: report.synced,
                remaining: report.remaining,
            }
        };
        info!(
            "[SYNC] Drain finished for {org}: {} synced, {} failed, {} remaining",
            report.synced, report.failed, report.remaining
        );
        self.emit(event);
        report
    }

    async fn process(&self, trigger: RunTrigger, report: &mut RunReport) -> SyncResult<()> {
        let org = self.session.organization_id.clone();
        let recovered = self
            .blocking({
                let org = org.clone();
                move |store| store.outbox().recover_in_flight(&org)
            })
            .await?;
        if recovered > 0 {
            info!("[SYNC] Resending {recovered} interrupted items");
        }

        let items = self
            .blocking(move |store| store.outbox().list_pending(&org))
            .await?;
        let total = items.iter().filter(|item| !item.is_error()).count();
        let ignore_backoff = trigger == RunTrigger::Manual && self.config.force_ignores_backoff;

        let mut blocked: HashSet<EntityId> = HashSet::new();
        let mut done = 0;
        // `done` counts skipped items too, so it reaches `total` unless the
        // run stops early.
        for item in items {
            if item.is_error() {
                blocked.insert(item.entity_id);
                continue;
            }
            if !self.network.is_online() {
                info!("[SYNC] Offline, leaving {} items queued", total - done);
                break;
            }

            let entity_id = item.entity_id;
            if blocked.contains(&entity_id) {
                debug!("[SYNC] Item {} waits for an earlier item of its entity", item.id);
            } else if !ignore_backoff && !lock(&self.schedule).is_due(&item, Instant::now()) {
                debug!("[SYNC] Item {} still backing off", item.id);
                blocked.insert(entity_id);
            } else if !self.deliver(item, report).await? {
                // Later items of this entity must wait for it.
                blocked.insert(entity_id);
            }
            done += 1;
            self.emit(SyncEvent::Progress { done, total });
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    /// Sends one item. Returns whether it was confirmed; per-item failures
    /// are recorded on the item, only local-storage failures are errors.
    async fn deliver(&self, item: SyncQueueItem, report: &mut RunReport) -> SyncResult<bool> {
        let id = item.id;
        let item = self
            .blocking(move |store| store.outbox().mark_syncing(&id))
            .await?;

        let request = GatewayRequest::for_item(&item, &self.session.vendor_id);
        let ack = match self.gateway.submit(request).await {
            Ok(ack) => ack,
            Err(e) => {
                self.record_failure(&item, &e, report).await?;
                return Ok(false);
            }
        };

        let reconciler = self.reconciler.clone();
        let confirmed = item.clone();
        let synced_at = ack.synced_at;
        let result =
            tokio::task::spawn_blocking(move || reconciler.reconcile(&confirmed, &ack)).await?;
        match result {
            Ok(outcome) => {
                debug!("[SYNC] Item {id} confirmed: {outcome:?}");
                report.synced += 1;
                lock(&self.schedule).forget(&id);
                *lock(&self.last_sync_at) = Some(synced_at);
                Ok(true)
            }
            Err(SyncError::Storage(e)) => Err(SyncError::Storage(e)),
            Err(e) => {
                warn!("[SYNC] Item {id} acknowledged but not absorbed: {e}");
                self.record_transient(&item, &e.to_string(), report).await?;
                Ok(false)
            }
        }
    }

    async fn record_failure(
        &self,
        item: &SyncQueueItem,
        e: &GatewayError,
        report: &mut RunReport,
    ) -> SyncResult<()> {
        match e.class() {
            FailureClass::Transient => self.record_transient(item, &e.to_string(), report).await,
            FailureClass::Rejected => {
                let id = item.id;
                let status = e.status().unwrap_or(400);
                let reason = e.to_string();
                warn!("[SYNC] Item {id} rejected by server: {reason}");
                self.blocking(move |store| store.outbox().mark_rejected(&id, status, &reason))
                    .await?;
                report.failed += 1;
                Ok(())
            }
        }
    }

    async fn record_transient(
        &self,
        item: &SyncQueueItem,
        reason: &str,
        report: &mut RunReport,
    ) -> SyncResult<()> {
        let id = item.id;
        let reason = reason.to_string();
        let updated = self
            .blocking(move |store| store.outbox().mark_failed(&id, &reason))
            .await?;
        report.failed += 1;
        if !updated.is_error() {
            let at = lock(&self.schedule).record_failure(id, updated.attempts(), Instant::now());
            debug!(
                "[SYNC] Item {id} failed (attempt {}/{}), next try in {:?}",
                updated.attempts(),
                updated.max_attempts(),
                at.saturating_duration_since(Instant::now())
            );
        }
        Ok(())
    }
}
