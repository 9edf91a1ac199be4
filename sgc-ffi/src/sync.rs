//! Sync control FFI exports: connectivity, manual drains, status, events.

use crate::{SgcError, engine, gateway, lock_handle, parse_cstr, sync_err, write_json_out};
use std::ffi::c_char;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::warn;

/// Reports a connectivity change from the platform network callback.
/// Going online schedules a drain after the debounce window.
#[unsafe(no_mangle)]
pub extern "C" fn sgc_set_online(online: bool) -> SgcError {
    let handle = lock_handle();
    let handle = match handle.as_ref() {
        Some(h) => h,
        None => return SgcError::NotInitialized,
    };
    handle.engine.network().report(online);
    SgcError::Ok
}

/// Sets the bearer token for the sync API. Null clears it.
///
/// # Safety
/// - `token` must be a valid null-terminated UTF-8 string, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sgc_set_token(token: *const c_char) -> SgcError {
    let token = if token.is_null() {
        None
    } else {
        match unsafe { parse_cstr(token) } {
            Ok(s) => Some(s.to_string()),
            Err(e) => return e,
        }
    };

    let (rt, gateway) = match gateway() {
        Ok(g) => g,
        Err(e) => return e,
    };
    rt.block_on(async move {
        match token {
            Some(token) => gateway.set_token(token).await,
            None => gateway.clear_token().await,
        }
    });
    SgcError::Ok
}

/// Drains the outbox now and writes the `RunReport` JSON when it finishes.
/// Joins the drain already running, if any.
///
/// # Safety
/// - `out_json` must be a valid pointer. Result must be freed with `sgc_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sgc_force_sync(out_json: *mut *mut c_char) -> SgcError {
    if out_json.is_null() {
        return SgcError::NullPointer;
    }
    let (rt, engine) = match engine() {
        Ok(e) => e,
        Err(e) => return e,
    };

    let report = rt.block_on(engine.force_sync());
    write_json_out(out_json, &report)
}

/// Moves every `error` item back to `pending`. Writes the number reset to
/// `out_count` when it is not null.
///
/// # Safety
/// - `out_count` must be a valid pointer, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sgc_retry_failed(out_count: *mut u32) -> SgcError {
    let (rt, engine) = match engine() {
        Ok(e) => e,
        Err(e) => return e,
    };

    match rt.block_on(engine.retry_failed()) {
        Ok(reset) => {
            if !out_count.is_null() {
                unsafe { *out_count = u32::try_from(reset).unwrap_or(u32::MAX) };
            }
            SgcError::Ok
        }
        Err(e) => sync_err(&e),
    }
}

/// Writes the `SyncStatus` JSON (pending and error counts, connectivity).
///
/// # Safety
/// - `out_json` must be a valid pointer. Result must be freed with `sgc_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sgc_sync_status(out_json: *mut *mut c_char) -> SgcError {
    if out_json.is_null() {
        return SgcError::NullPointer;
    }
    let (rt, engine) = match engine() {
        Ok(e) => e,
        Err(e) => return e,
    };

    match rt.block_on(engine.status()) {
        Ok(status) => write_json_out(out_json, &status),
        Err(e) => sync_err(&e),
    }
}

/// Polls all buffered sync events (non-blocking). Returns a JSON array.
///
/// # Safety
/// - `out_json` must be a valid pointer. Result must be freed with `sgc_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sgc_poll_events(out_json: *mut *mut c_char) -> SgcError {
    if out_json.is_null() {
        return SgcError::NullPointer;
    }

    let mut handle = lock_handle();
    let handle = match handle.as_mut() {
        Some(h) => h,
        None => return SgcError::NotInitialized,
    };

    let mut events = Vec::new();
    loop {
        match handle.events.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(skipped)) => {
                warn!("[FFI] dropped {skipped} sync events, poll more often");
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }

    write_json_out(out_json, &events)
}
