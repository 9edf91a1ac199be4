//! Sync engine configuration.

use crate::backoff::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the sync orchestrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval of the periodic drain while online (seconds).
    pub sync_interval_secs: u64,

    /// Connectivity must hold this long before a reconnect triggers a drain.
    pub network_debounce_ms: u64,

    /// Backoff base delay (milliseconds).
    pub base_delay_ms: u64,

    /// Backoff ceiling (milliseconds).
    pub cap_delay_ms: u64,

    /// `maxIntentos` given to newly captured items.
    pub max_attempts: u32,

    /// Whether `force_sync` also attempts items still inside their backoff window.
    pub force_ignores_backoff: bool,

    /// Capacity of the lifecycle event channel.
    pub event_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: 300,
            network_debounce_ms: 2_000,
            base_delay_ms: 2_000,
            cap_delay_ms: 300_000, // 5 minutes
            max_attempts: 5,
            force_ignores_backoff: true,
            event_buffer: 64,
        }
    }
}

impl SyncConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    pub fn network_debounce(&self) -> Duration {
        Duration::from_millis(self.network_debounce_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.cap_delay_ms),
        )
    }
}
