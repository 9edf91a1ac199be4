//! Capture and read FFI exports for visits, clients and attachments.

use crate::{SgcError, engine, parse_cstr, sync_err, write_json_out};
use serde::Serialize;
use sgc_types::{AttachmentPayload, Entity, EntityId, EntityKind, SyncItemId, SyncItemKind};
use std::ffi::c_char;
use tracing::warn;

/// Result of `sgc_capture_visit`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CapturedEntity {
    entity: Entity,
    item_id: SyncItemId,
}

unsafe fn parse_entity_id(ptr: *const c_char) -> Result<EntityId, SgcError> {
    let s = unsafe { parse_cstr(ptr) }?;
    s.parse().map_err(|_| SgcError::InvalidArgument)
}

/// Applies a JSON merge patch to an entity and queues it for sync.
///
/// With a null `entity_id` a new visit is created from the patch. Otherwise
/// the stored entity (visit or client) is updated. On success writes
/// `{ "entity": …, "itemId": … }` to `out_json`.
///
/// # Safety
/// - `entity_id` must be a valid null-terminated UTF-8 string, or null.
/// - `patch_json` must be a valid null-terminated UTF-8 string.
/// - `out_json` must be a valid pointer. Result must be freed with `sgc_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sgc_capture_visit(
    entity_id: *const c_char,
    patch_json: *const c_char,
    out_json: *mut *mut c_char,
) -> SgcError {
    let id = if entity_id.is_null() {
        None
    } else {
        match unsafe { parse_entity_id(entity_id) } {
            Ok(id) => Some(id),
            Err(e) => return e,
        }
    };
    let patch_str = match unsafe { parse_cstr(patch_json) } {
        Ok(s) => s,
        Err(e) => return e,
    };
    if out_json.is_null() {
        return SgcError::NullPointer;
    }

    let patch: serde_json::Value = match serde_json::from_str(patch_str) {
        Ok(p) => p,
        Err(_) => return SgcError::JsonError,
    };
    if !patch.is_object() {
        return SgcError::InvalidArgument;
    }

    let (rt, engine) = match engine() {
        Ok(e) => e,
        Err(e) => return e,
    };

    let result = rt.block_on(async {
        let entity = match id {
            Some(id) => match engine.get_entity(id).await? {
                Some(entity) => entity,
                None => return Ok(None),
            },
            None => Entity::new(
                EntityKind::Visit,
                engine.session().organization_id.clone(),
                serde_json::json!({}),
            ),
        };
        engine
            .capture(entity, patch)
            .await
            .map(|(entity, item)| Some(CapturedEntity { entity, item_id: item.id }))
    });

    match result {
        Ok(Some(captured)) => write_json_out(out_json, &captured),
        Ok(None) => SgcError::NotFound,
        Err(e) => sync_err(&e),
    }
}

/// Queues a photo (`"foto"`) or audio note (`"audio"`). `attachment_json` is
/// an `AttachmentPayload`; its content hash is checked before queuing. On
/// success writes the queued item JSON to `out_json`.
///
/// # Safety
/// - `kind` and `attachment_json` must be valid null-terminated UTF-8 strings.
/// - `out_json` must be a valid pointer. Result must be freed with `sgc_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sgc_capture_attachment(
    kind: *const c_char,
    attachment_json: *const c_char,
    out_json: *mut *mut c_char,
) -> SgcError {
    let kind_str = match unsafe { parse_cstr(kind) } {
        Ok(s) => s,
        Err(e) => return e,
    };
    let attachment_str = match unsafe { parse_cstr(attachment_json) } {
        Ok(s) => s,
        Err(e) => return e,
    };
    if out_json.is_null() {
        return SgcError::NullPointer;
    }

    let kind: SyncItemKind =
        match serde_json::from_value(serde_json::Value::String(kind_str.to_string())) {
            Ok(k) => k,
            Err(_) => return SgcError::InvalidArgument,
        };
    let attachment: AttachmentPayload = match serde_json::from_str(attachment_str) {
        Ok(a) => a,
        Err(_) => return SgcError::JsonError,
    };
    if let Err(e) = attachment.decode() {
        warn!("[FFI] refusing attachment for visit {}: {e}", attachment.visita_id);
        return SgcError::InvalidArgument;
    }

    let (rt, engine) = match engine() {
        Ok(e) => e,
        Err(e) => return e,
    };

    match rt.block_on(engine.capture_attachment(kind, attachment)) {
        Ok(item) => write_json_out(out_json, &item),
        Err(e) => sync_err(&e),
    }
}

/// Gets an entity of the session's organization by id.
///
/// # Safety
/// - `entity_id` must be a valid null-terminated UTF-8 string.
/// - `out_json` must be a valid pointer. Result must be freed with `sgc_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sgc_get_entity(
    entity_id: *const c_char,
    out_json: *mut *mut c_char,
) -> SgcError {
    let id = match unsafe { parse_entity_id(entity_id) } {
        Ok(id) => id,
        Err(e) => return e,
    };
    if out_json.is_null() {
        return SgcError::NullPointer;
    }
    let (rt, engine) = match engine() {
        Ok(e) => e,
        Err(e) => return e,
    };

    match rt.block_on(engine.get_entity(id)) {
        Ok(Some(entity)) => write_json_out(out_json, &entity),
        Ok(None) => SgcError::NotFound,
        Err(e) => sync_err(&e),
    }
}

/// Lists the session organization's entities as a JSON array.
///
/// # Safety
/// - `out_json` must be a valid pointer. Result must be freed with `sgc_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sgc_list_entities(out_json: *mut *mut c_char) -> SgcError {
    if out_json.is_null() {
        return SgcError::NullPointer;
    }
    let (rt, engine) = match engine() {
        Ok(e) => e,
        Err(e) => return e,
    };

    match rt.block_on(engine.list_entities()) {
        Ok(entities) => write_json_out(out_json, &entities),
        Err(e) => sync_err(&e),
    }
}
