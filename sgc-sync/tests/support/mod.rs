#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use sgc_storage::{LocalStore, MemoryBackend, StorageError, StoragePort, StorageResult, Table, WriteOp};
use sgc_sync::{
    GatewayAck, GatewayError, GatewayRequest, NetworkMonitor, RemoteGateway, Session, SyncConfig,
    SyncEvent, SyncOrchestrator,
};
use sgc_types::{Entity, EntityId, EntityKind, OrganizationId, VendorId, merge_patch};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

// ── Fake backend ─────────────────────────────────────────────────

/// Scripted behavior for the next request that is not a duplicate.
#[derive(Debug, Clone)]
pub enum Step {
    /// Fail without applying anything.
    Fail(GatewayError),
    /// Apply the item, then lose the response on the way back.
    LoseAck,
    /// Answer with a version that does not follow the item's base.
    StaleAck,
}

#[derive(Default)]
struct Server {
    entities: HashMap<EntityId, (u64, serde_json::Value)>,
    acks: HashMap<String, GatewayAck>,
    attachments: Vec<serde_json::Value>,
    requests: Vec<GatewayRequest>,
    script: VecDeque<Step>,
    applied: usize,
}

impl Server {
    fn apply(&mut self, request: &GatewayRequest) -> GatewayAck {
        self.applied += 1;
        let synced_at = Utc::now();
        let ack = if request.kind.is_attachment() {
            self.attachments.push(request.payload.clone());
            GatewayAck {
                entity_id: request.entity_id,
                version: 1,
                synced_at,
                payload: None,
            }
        } else {
            let (version, data) = self
                .entities
                .entry(request.entity_id)
                .or_insert_with(|| (0, serde_json::json!({})));
            merge_patch(data, &request.payload);
            *version += 1;
            GatewayAck {
                entity_id: request.entity_id,
                version: *version,
                synced_at,
                payload: Some(data.clone()),
            }
        };
        self.acks.insert(request.idempotency_key.clone(), ack.clone());
        ack
    }
}

/// In-process backend: applies merge patches, deduplicates by idempotency
/// key, and can be scripted to fail.
pub struct FakeGateway {
    server: Mutex<Server>,
    gate: watch::Sender<bool>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        let (gate, _) = watch::channel(true);
        Arc::new(Self {
            server: Mutex::new(Server::default()),
            gate,
        })
    }

    pub fn seed(&self, entity_id: EntityId, version: u64, data: serde_json::Value) {
        self.server.lock().unwrap().entities.insert(entity_id, (version, data));
    }

    /// Another writer changes the entity on the server. Returns the new version.
    pub fn edit_out_of_band(&self, entity_id: EntityId, patch: serde_json::Value) -> u64 {
        let mut server = self.server.lock().unwrap();
        let (version, data) = server
            .entities
            .get_mut(&entity_id)
            .expect("entity must exist on the server");
        merge_patch(data, &patch);
        *version += 1;
        *version
    }

    pub fn push(&self, step: Step) {
        self.server.lock().unwrap().script.push_back(step);
    }

    pub fn fail_next(&self, times: usize, error: GatewayError) {
        for _ in 0..times {
            self.push(Step::Fail(error.clone()));
        }
    }

    pub fn entity(&self, entity_id: &EntityId) -> Option<(u64, serde_json::Value)> {
        self.server.lock().unwrap().entities.get(entity_id).cloned()
    }

    pub fn requests(&self) -> Vec<GatewayRequest> {
        self.server.lock().unwrap().requests.clone()
    }

    pub fn applied(&self) -> usize {
        self.server.lock().unwrap().applied
    }

    pub fn attachments(&self) -> Vec<serde_json::Value> {
        self.server.lock().unwrap().attachments.clone()
    }

    /// Holds every request until [`FakeGateway::open`] is called.
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn open(&self) {
        self.gate.send_replace(true);
    }
}

#[async_trait]
impl RemoteGateway for FakeGateway {
    async fn submit(&self, request: GatewayRequest) -> Result<GatewayAck, GatewayError> {
        self.server.lock().unwrap().requests.push(request.clone());

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let mut server = self.server.lock().unwrap();
        if let Some(ack) = server.acks.get(&request.idempotency_key) {
            return Ok(ack.clone());
        }
        match server.script.pop_front() {
            Some(Step::Fail(e)) => Err(e),
            Some(Step::LoseAck) => {
                server.apply(&request);
                Err(GatewayError::Network("connection reset by peer".into()))
            }
            Some(Step::StaleAck) => Ok(GatewayAck {
                entity_id: request.entity_id,
                version: request.base_version,
                synced_at: Utc::now(),
                payload: None,
            }),
            None => Ok(server.apply(&request)),
        }
    }
}

// ── Failing storage ──────────────────────────────────────────────

/// Memory backend whose writes can be switched off.
#[derive(Default)]
pub struct FlakyPort {
    inner: MemoryBackend,
    fail_writes: AtomicBool,
}

impl FlakyPort {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl StoragePort for FlakyPort {
    fn get(&self, table: Table, key: &str) -> StorageResult<Option<String>> {
        self.inner.get(table, key)
    }

    fn list_by_index(&self, table: Table, partition: &str) -> StorageResult<Vec<String>> {
        self.inner.list_by_index(table, partition)
    }

    fn write_batch(&self, ops: &[WriteOp]) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("disk quota exceeded".into()));
        }
        self.inner.write_batch(ops)
    }
}

// ── Harness ──────────────────────────────────────────────────────

pub fn org() -> OrganizationId {
    OrganizationId::new("org-norte")
}

pub fn session_for(org: &OrganizationId) -> Session {
    Session {
        organization_id: org.clone(),
        vendor_id: VendorId::new("vend-17"),
    }
}

pub struct Harness {
    pub store: LocalStore,
    pub gateway: Arc<FakeGateway>,
    pub network: NetworkMonitor,
    pub engine: SyncOrchestrator,
}

pub fn harness(config: SyncConfig) -> Harness {
    harness_on(Arc::new(MemoryBackend::new()), FakeGateway::new(), &org(), config)
}

pub fn harness_on(
    port: Arc<dyn StoragePort>,
    gateway: Arc<FakeGateway>,
    org: &OrganizationId,
    config: SyncConfig,
) -> Harness {
    let store = LocalStore::new(port);
    let network = NetworkMonitor::new(true, config.network_debounce());
    let engine = SyncOrchestrator::new(
        store.clone(),
        gateway.clone(),
        network.clone(),
        session_for(org),
        config,
    );
    Harness {
        store,
        gateway,
        network,
        engine,
    }
}

impl Harness {
    /// A client already known to the server at version 1.
    pub fn synced_client(&self, data: serde_json::Value) -> Entity {
        let stored = self
            .store
            .entities()
            .put(&Entity::new(EntityKind::Client, org(), data.clone()))
            .unwrap();
        self.gateway.seed(stored.id, 1, data);
        self.store
            .entities()
            .apply_server_version(&stored.id, 1, Utc::now(), None)
            .unwrap()
    }

    pub fn new_visit(&self) -> Entity {
        Entity::new(EntityKind::Visit, self.engine.session().organization_id.clone(), serde_json::json!({}))
    }

    pub fn local(&self, id: &EntityId) -> Entity {
        self.store.entities().get(id).unwrap().unwrap()
    }
}

/// Everything already sent on the channel.
pub fn drain_events(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Waits for the next terminal event, skipping progress.
pub async fn next_terminal(rx: &mut broadcast::Receiver<SyncEvent>, within: Duration) -> SyncEvent {
    tokio::time::timeout(within, async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if event.is_terminal() {
                return event;
            }
        }
    })
    .await
    .expect("no terminal event in time")
}

pub fn fast_config() -> SyncConfig {
    SyncConfig {
        max_attempts: 3,
        ..SyncConfig::default()
    }
}
