//! C ABI exports for the SGC vendedor apps (Android JNI, iOS Swift interop).
//!
//! All functions use C-compatible types and report failures through
//! [`SgcError`] return codes. Structured results are written as JSON strings
//! to out-pointers and must be released with [`sgc_free_string`].
//!
//! Pattern: acquire HANDLE → validate inputs → block_on async call → write JSON to out pointer.

mod entities;
mod sync;

pub use entities::*;
pub use sync::*;

use serde::Deserialize;
use sgc_cloud::{CloudConfig, HttpGateway};
use sgc_storage::{LocalStore, SqliteBackend, StorageError};
use sgc_sync::{
    NetworkMonitor, Session, SyncConfig, SyncError, SyncEvent, SyncOrchestrator, TriggerLoop,
};
use sgc_types::{OrganizationId, VendorId};
use std::ffi::{CStr, CString, c_char};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Error codes returned by FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SgcError {
    /// Operation succeeded.
    Ok = 0,
    /// Null pointer argument.
    NullPointer = 1,
    /// Invalid UTF-8 string.
    InvalidUtf8 = 2,
    /// JSON serialization error.
    JsonError = 3,
    /// Local storage error.
    StorageError = 4,
    /// Entity not found.
    NotFound = 5,
    /// Handle not initialized.
    NotInitialized = 6,
    /// The entity changed since the caller read it.
    StaleWrite = 7,
    /// Record belongs to another organization.
    TenantMismatch = 8,
    /// Sync engine error.
    SyncError = 9,
    /// Invalid argument.
    InvalidArgument = 10,
    /// Unknown error.
    Unknown = 99,
}

/// Options accepted by [`sgc_init`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitOptions {
    organization_id: String,
    vendor_id: String,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default = "default_online")]
    online: bool,
    #[serde(default)]
    sync: SyncConfig,
    #[serde(default)]
    cloud: CloudConfig,
}

fn default_online() -> bool {
    true
}

/// Opaque handle to the SGC runtime.
pub struct SgcHandle {
    runtime: Runtime,
    engine: SyncOrchestrator,
    gateway: HttpGateway,
    triggers: Option<TriggerLoop>,
    /// Events buffered for `sgc_poll_events`.
    events: broadcast::Receiver<SyncEvent>,
}

impl SgcHandle {
    fn close(mut self) {
        if let Some(triggers) = self.triggers.take() {
            self.runtime.block_on(triggers.shutdown());
        }
        self.runtime.shutdown_timeout(Duration::from_secs(2));
    }
}

/// Global handle storage (single instance).
static HANDLE: Mutex<Option<SgcHandle>> = Mutex::new(None);

/// Acquire the HANDLE lock, recovering from poison.
pub(crate) fn lock_handle() -> std::sync::MutexGuard<'static, Option<SgcHandle>> {
    HANDLE.lock().unwrap_or_else(|poisoned| {
        warn!("[FFI] recovering from poisoned HANDLE mutex");
        poisoned.into_inner()
    })
}

/// Clones what an async call needs so the HANDLE lock is not held while it runs.
pub(crate) fn engine() -> Result<(tokio::runtime::Handle, SyncOrchestrator), SgcError> {
    let handle = lock_handle();
    let handle = handle.as_ref().ok_or(SgcError::NotInitialized)?;
    Ok((handle.runtime.handle().clone(), handle.engine.clone()))
}

/// Same as [`engine`], for calls that go to the HTTP gateway directly.
pub(crate) fn gateway() -> Result<(tokio::runtime::Handle, HttpGateway), SgcError> {
    let handle = lock_handle();
    let handle = handle.as_ref().ok_or(SgcError::NotInitialized)?;
    Ok((handle.runtime.handle().clone(), handle.gateway.clone()))
}

/// Helper: parse a C string pointer to &str.
pub(crate) unsafe fn parse_cstr<'a>(ptr: *const c_char) -> Result<&'a str, SgcError> {
    if ptr.is_null() {
        return Err(SgcError::NullPointer);
    }
    unsafe { CStr::from_ptr(ptr).to_str().map_err(|_| SgcError::InvalidUtf8) }
}

/// Helper: write a JSON-serializable value to an out pointer.
pub(crate) fn write_json_out(out: *mut *mut c_char, value: &impl serde::Serialize) -> SgcError {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(_) => return SgcError::JsonError,
    };
    match CString::new(json) {
        Ok(c_json) => {
            unsafe { *out = c_json.into_raw() };
            SgcError::Ok
        }
        Err(_) => SgcError::JsonError,
    }
}

/// Converts a `SyncError` to the appropriate FFI error code.
pub(crate) fn sync_err(e: &SyncError) -> SgcError {
    warn!("[FFI] {e}");
    match e {
        SyncError::Storage(StorageError::StaleWrite { .. }) => SgcError::StaleWrite,
        SyncError::Storage(StorageError::TenantMismatch(_)) => SgcError::TenantMismatch,
        SyncError::Storage(StorageError::NotFound(_)) => SgcError::NotFound,
        SyncError::Storage(StorageError::InvalidInput(_)) => SgcError::InvalidArgument,
        SyncError::Storage(_) => SgcError::StorageError,
        _ => SgcError::SyncError,
    }
}

// ============================================================================
// Core Functions
// ============================================================================

/// Initializes the SGC runtime. Replaces any previous instance.
///
/// `options_json` is an object with `organizationId`, `vendorId`, optional
/// `accessToken`, optional `online` (default true), optional `sync`
/// (`SyncConfig`) and optional `cloud` (`CloudConfig`).
/// `db_path` is a SQLite file path, or `:memory:`.
///
/// # Safety
/// - `db_path` and `options_json` must be valid null-terminated UTF-8 strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sgc_init(db_path: *const c_char, options_json: *const c_char) -> SgcError {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let path = match unsafe { parse_cstr(db_path) } {
        Ok(s) => s,
        Err(e) => return e,
    };
    let options_str = match unsafe { parse_cstr(options_json) } {
        Ok(s) => s,
        Err(e) => return e,
    };
    let options: InitOptions = match serde_json::from_str(options_str) {
        Ok(o) => o,
        Err(e) => {
            warn!("[FFI] invalid init options: {e}");
            return SgcError::InvalidArgument;
        }
    };

    init_core(path, options)
}

fn init_core(path: &str, options: InitOptions) -> SgcError {
    if options.organization_id.trim().is_empty() || options.vendor_id.trim().is_empty() {
        return SgcError::InvalidArgument;
    }

    // Stop the previous instance before opening the same database again.
    let previous = lock_handle().take();
    if let Some(previous) = previous {
        info!("[FFI] replacing running instance");
        previous.close();
    }

    let backend = if path == ":memory:" {
        SqliteBackend::open_in_memory()
    } else {
        SqliteBackend::open(Path::new(path))
    };
    let backend = match backend {
        Ok(b) => b,
        Err(e) => {
            error!("[FFI] failed to open store at {path}: {e}");
            return SgcError::StorageError;
        }
    };

    let runtime = match Runtime::new() {
        Ok(rt) => rt,
        Err(_) => return SgcError::Unknown,
    };

    let gateway = match HttpGateway::new(options.cloud) {
        Ok(g) => g,
        Err(e) => {
            warn!("[FFI] invalid cloud config: {e}");
            return SgcError::InvalidArgument;
        }
    };
    if let Some(token) = options.access_token {
        runtime.block_on(gateway.set_token(token));
    }

    let session = Session {
        organization_id: OrganizationId::new(options.organization_id),
        vendor_id: VendorId::new(options.vendor_id),
    };
    let network = NetworkMonitor::new(options.online, options.sync.network_debounce());
    let engine = SyncOrchestrator::new(
        LocalStore::new(Arc::new(backend)),
        Arc::new(gateway.clone()),
        network,
        session,
        options.sync,
    );
    let events = engine.subscribe();
    let triggers = {
        let _guard = runtime.enter();
        engine.spawn_triggers()
    };

    info!(
        "[FFI] initialized for {} (db {path})",
        engine.session().organization_id
    );
    *lock_handle() = Some(SgcHandle {
        runtime,
        engine,
        gateway,
        triggers: Some(triggers),
        events,
    });

    SgcError::Ok
}

/// Shuts down the SGC runtime and frees resources. Queued items stay on disk.
#[unsafe(no_mangle)]
pub extern "C" fn sgc_shutdown() {
    let handle = lock_handle().take();
    if let Some(handle) = handle {
        handle.close();
    }
}

/// Returns the library version as a string.
///
/// # Safety
/// - The returned string is statically allocated and must not be freed.
#[unsafe(no_mangle)]
pub extern "C" fn sgc_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

/// Frees a string allocated by this library.
///
/// # Safety
/// - `s` must be a string allocated by this library, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sgc_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}
