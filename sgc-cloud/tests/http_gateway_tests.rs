use chrono::Utc;
use pretty_assertions::assert_eq;
use sgc_cloud::{CloudConfig, CloudError, HttpGateway};
use sgc_storage::{LocalStore, MemoryBackend};
use sgc_sync::{
    FailureClass, GatewayError, GatewayRequest, NetworkMonitor, RemoteGateway, Session,
    SyncConfig, SyncOrchestrator,
};
use sgc_types::{Entity, EntityId, EntityKind, OrganizationId, SyncItemKind, VendorId};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{bearer_token, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(server: &MockServer) -> HttpGateway {
    HttpGateway::new(CloudConfig {
        api_base_url: server.uri(),
        request_timeout_secs: 1,
    })
    .unwrap()
}

fn request(kind: SyncItemKind) -> GatewayRequest {
    GatewayRequest {
        organization_id: OrganizationId::new("org-norte"),
        vendor_id: VendorId::new("vend-17"),
        kind,
        payload: serde_json::json!({ "cliente": "Ferretería Sur" }),
        idempotency_key: "5f2b".repeat(16),
        entity_id: EntityId::new(),
        base_version: 0,
    }
}

fn ack_body(request: &GatewayRequest, version: u64) -> serde_json::Value {
    serde_json::json!({
        "entityId": request.entity_id,
        "version": version,
        "syncedAt": Utc::now(),
        "payload": request.payload,
    })
}

// ── Config ────────────────────────────────────────────────────

#[test]
fn empty_base_url_is_rejected() {
    let result = HttpGateway::new(CloudConfig {
        api_base_url: "  ".into(),
        request_timeout_secs: 5,
    });
    assert!(matches!(result, Err(CloudError::Config(_))));
}

#[test]
fn config_defaults_and_partial_json() {
    let config: CloudConfig =
        serde_json::from_str(r#"{ "api_base_url": "https://sgc.test" }"#).unwrap();
    assert_eq!(config.api_base_url, "https://sgc.test");
    assert_eq!(config.request_timeout_secs, 30);
}

#[test]
fn endpoint_uses_item_kind() {
    let gateway = HttpGateway::new(CloudConfig {
        api_base_url: "https://sgc.test/".into(),
        request_timeout_secs: 5,
    })
    .unwrap();
    assert_eq!(
        gateway.endpoint(&request(SyncItemKind::Audio)),
        "https://sgc.test/api/vendedor/sync/audio"
    );
}

// ── Success ───────────────────────────────────────────────────

#[tokio::test]
async fn submit_posts_item_with_key_and_token() {
    let server = MockServer::start().await;
    let req = request(SyncItemKind::Visita);
    Mock::given(method("POST"))
        .and(path("/api/vendedor/sync/visita"))
        .and(header("Idempotency-Key", req.idempotency_key.as_str()))
        .and(bearer_token("tok-1"))
        .and(body_partial_json(serde_json::json!({
            "organizationId": "org-norte",
            "vendedorId": "vend-17",
            "tipo": "visita",
            "baseVersion": 0,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(ack_body(&req, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    gateway.set_token("tok-1").await;
    let ack = gateway.submit(req.clone()).await.unwrap();
    assert_eq!(ack.entity_id, req.entity_id);
    assert_eq!(ack.version, 1);
    assert_eq!(ack.payload, Some(req.payload));
}

#[tokio::test]
async fn ack_without_payload_is_accepted() {
    let server = MockServer::start().await;
    let req = request(SyncItemKind::Foto);
    Mock::given(method("POST"))
        .and(path("/api/vendedor/sync/foto"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "entityId": req.entity_id,
            "version": 1,
            "syncedAt": "2026-10-18T12:00:00Z",
        })))
        .mount(&server)
        .await;

    let ack = gateway(&server).submit(req).await.unwrap();
    assert_eq!(ack.payload, None);
}

// ── Failure classification ────────────────────────────────────

async fn submit_with_status(status: u16) -> GatewayError {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(status).set_body_string("detalle"))
        .mount(&server)
        .await;
    gateway(&server)
        .submit(request(SyncItemKind::Visita))
        .await
        .unwrap_err()
}

#[tokio::test]
async fn server_errors_are_transient() {
    for status in [500, 502, 503, 408, 429] {
        let err = submit_with_status(status).await;
        assert_eq!(err.class(), FailureClass::Transient, "status {status}");
        assert_eq!(err.status(), Some(status));
    }
}

#[tokio::test]
async fn client_errors_are_rejected() {
    for status in [400, 401, 404, 409, 422] {
        let err = submit_with_status(status).await;
        assert_eq!(
            err,
            GatewayError::Rejected {
                status,
                body: "detalle".into()
            }
        );
        assert_eq!(err.class(), FailureClass::Rejected);
    }
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .submit(request(SyncItemKind::Visita))
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::Timeout);
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let gateway = HttpGateway::new(CloudConfig {
        api_base_url: uri,
        request_timeout_secs: 1,
    })
    .unwrap();
    let err = gateway.submit(request(SyncItemKind::Visita)).await.unwrap_err();
    assert!(matches!(err, GatewayError::Network(_) | GatewayError::Timeout));
    assert_eq!(err.class(), FailureClass::Transient);
}

#[tokio::test]
async fn malformed_ack_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .submit(request(SyncItemKind::Visita))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Protocol(_)));
    assert_eq!(err.class(), FailureClass::Transient);
}

#[tokio::test]
async fn ack_for_other_entity_is_protocol_error() {
    let server = MockServer::start().await;
    let req = request(SyncItemKind::Visita);
    let mut other = req.clone();
    other.entity_id = EntityId::new();
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ack_body(&other, 1)))
        .mount(&server)
        .await;

    let err = gateway(&server).submit(req).await.unwrap_err();
    assert!(matches!(err, GatewayError::Protocol(_)));
}

// ── With the orchestrator ─────────────────────────────────────

#[tokio::test]
async fn orchestrator_drains_through_http() {
    let server = MockServer::start().await;
    let store = LocalStore::new(Arc::new(MemoryBackend::new()));
    let org = OrganizationId::new("org-norte");
    let draft = Entity::new(EntityKind::Visit, org.clone(), serde_json::json!({}));
    let (visit, _) = store
        .capture(&draft, serde_json::json!({ "cliente": "A" }), 5)
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/api/vendedor/sync/visita"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entityId": visit.id,
            "version": 1,
            "syncedAt": "2026-10-18T12:00:00Z",
            "payload": { "cliente": "A", "folio": "V-0091" },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let engine = SyncOrchestrator::new(
        store.clone(),
        Arc::new(gateway(&server)),
        NetworkMonitor::new(true, Duration::from_secs(2)),
        Session {
            organization_id: org,
            vendor_id: VendorId::new("vend-17"),
        },
        SyncConfig::default(),
    );
    let report = engine.force_sync().await;
    assert!(report.is_complete());

    let stored = store.entities().get(&visit.id).unwrap().unwrap();
    assert_eq!(stored.data["folio"], "V-0091");
    assert!(stored.has_synced());
}
