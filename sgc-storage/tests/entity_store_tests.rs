use chrono::Utc;
use pretty_assertions::assert_eq;
use sgc_storage::{EntityStore, MemoryBackend, SqliteBackend, StorageError, StoragePort};
use sgc_types::{Entity, EntityId, EntityKind, OrganizationId};
use std::sync::Arc;

fn backends() -> Vec<Arc<dyn StoragePort>> {
    vec![
        Arc::new(MemoryBackend::new()),
        Arc::new(SqliteBackend::open_in_memory().unwrap()),
    ]
}

fn org() -> OrganizationId {
    OrganizationId::new("org-norte")
}

fn client(name: &str) -> Entity {
    Entity::new(
        EntityKind::Client,
        org(),
        serde_json::json!({ "nombre": name, "estado": "prospecto" }),
    )
}

// ── Versioning ───────────────────────────────────────────────────

#[test]
fn first_put_stores_version_one() {
    for port in backends() {
        let store = EntityStore::new(port);
        let stored = store.put(&client("Ferretería Sur")).unwrap();
        assert_eq!(stored.version, 1);
        assert!(stored.last_sync_at.is_none());

        let read = store.get(&stored.id).unwrap().unwrap();
        assert_eq!(read, stored);
    }
}

#[test]
fn every_put_bumps_version() {
    for port in backends() {
        let store = EntityStore::new(port);
        let mut entity = store.put(&client("A")).unwrap();
        for expected in 2..=5 {
            entity.data["estado"] = serde_json::json!(format!("paso-{expected}"));
            entity = store.put(&entity).unwrap();
            assert_eq!(entity.version, expected);
        }
    }
}

#[test]
fn put_from_stale_copy_is_refused() {
    for port in backends() {
        let store = EntityStore::new(port);
        let v1 = store.put(&client("A")).unwrap();
        let v2 = store.put(&v1).unwrap();
        assert_eq!(v2.version, 2);

        let mut stale = v1.clone();
        stale.version = 0;
        match store.put(&stale) {
            Err(StorageError::StaleWrite {
                entity_id,
                stored,
                attempted,
            }) => {
                assert_eq!(entity_id, v1.id);
                assert_eq!(stored, 2);
                assert_eq!(attempted, 0);
            }
            other => panic!("expected StaleWrite, got {other:?}"),
        }
        assert_eq!(store.get(&v1.id).unwrap().unwrap().version, 2);
    }
}

#[test]
fn put_keeps_last_sync_at() {
    for port in backends() {
        let store = EntityStore::new(port);
        let v1 = store.put(&client("A")).unwrap();
        let synced_at = Utc::now();
        let confirmed = store.apply_server_version(&v1.id, 1, synced_at, None).unwrap();

        let mut edited = confirmed.clone();
        edited.last_sync_at = None;
        let v2 = store.put(&edited).unwrap();
        assert_eq!(v2.last_sync_at, Some(synced_at));
    }
}

#[test]
fn put_across_tenants_is_refused() {
    for port in backends() {
        let store = EntityStore::new(port);
        let stored = store.put(&client("A")).unwrap();
        let mut foreign = stored.clone();
        foreign.organization_id = OrganizationId::new("org-sur");
        assert!(matches!(
            store.put(&foreign),
            Err(StorageError::TenantMismatch(_))
        ));
    }
}

// ── Server versions ──────────────────────────────────────────────

#[test]
fn apply_server_version_sets_sync_stamp_and_payload() {
    for port in backends() {
        let store = EntityStore::new(port);
        let stored = store.put(&client("A")).unwrap();
        let synced_at = Utc::now();
        let data = serde_json::json!({ "nombre": "A", "estado": "activo", "codigo": 77 });

        let applied = store
            .apply_server_version(&stored.id, 4, synced_at, Some(data.clone()))
            .unwrap();
        assert_eq!(applied.version, 4);
        assert_eq!(applied.last_sync_at, Some(synced_at));
        assert_eq!(applied.data, data);
        assert!(applied.has_synced());
    }
}

#[test]
fn apply_server_version_never_lowers_version() {
    for port in backends() {
        let store = EntityStore::new(port);
        let mut entity = store.put(&client("A")).unwrap();
        entity = store.put(&entity).unwrap();
        entity = store.put(&entity).unwrap();
        assert_eq!(entity.version, 3);

        let result = store.apply_server_version(&entity.id, 2, Utc::now(), None);
        assert!(matches!(result, Err(StorageError::StaleWrite { stored: 3, attempted: 2, .. })));
    }
}

#[test]
fn apply_server_version_unknown_entity_is_not_found() {
    for port in backends() {
        let store = EntityStore::new(port);
        let result = store.apply_server_version(&EntityId::new(), 1, Utc::now(), None);
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }
}

// ── Listing ──────────────────────────────────────────────────────

#[test]
fn list_is_scoped_to_organization() {
    for port in backends() {
        let store = EntityStore::new(port);
        let a = store.put(&client("A")).unwrap();
        let b = store.put(&client("B")).unwrap();
        store
            .put(&Entity::new(
                EntityKind::Visit,
                OrganizationId::new("org-sur"),
                serde_json::json!({ "cliente": "X" }),
            ))
            .unwrap();

        let listed: Vec<EntityId> = store.list(&org()).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(listed, vec![a.id, b.id]);
        assert_eq!(store.list(&OrganizationId::new("org-sur")).unwrap().len(), 1);
        assert!(store.list(&OrganizationId::new("org-vacia")).unwrap().is_empty());
    }
}

#[test]
fn get_nonexistent_returns_none() {
    for port in backends() {
        let store = EntityStore::new(port);
        assert!(store.get(&EntityId::new()).unwrap().is_none());
    }
}
