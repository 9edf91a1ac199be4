//! Connectivity signal.
//!
//! The host pushes platform connectivity changes with [`NetworkMonitor::report`];
//! the orchestrator reads the current value and listens for transitions.
//! The monitor never triggers anything itself.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::info;

/// Current connectivity and when it last changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkState {
    pub online: bool,
    pub changed_at: Instant,
}

#[derive(Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<NetworkState>>,
    debounce: Duration,
}

impl NetworkMonitor {
    pub fn new(online: bool, debounce: Duration) -> Self {
        let (tx, _) = watch::channel(NetworkState {
            online,
            changed_at: Instant::now(),
        });
        Self {
            tx: Arc::new(tx),
            debounce,
        }
    }

    /// Records a platform connectivity event. Repeats of the current value
    /// are ignored and do not notify subscribers.
    pub fn report(&self, online: bool) {
        let changed = self.tx.send_if_modified(|state| {
            if state.online == online {
                return false;
            }
            state.online = online;
            state.changed_at = Instant::now();
            true
        });
        if changed {
            info!("network {}", if online { "online" } else { "offline" });
        }
    }

    pub fn is_online(&self) -> bool {
        self.tx.borrow().online
    }

    pub fn state(&self) -> NetworkState {
        *self.tx.borrow()
    }

    /// Change notifications. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.tx.subscribe()
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Earliest instant the current connectivity may trigger a drain: the
    /// state must have held for the debounce window.
    pub fn next_trigger_at(&self) -> Instant {
        self.state().changed_at + self.debounce
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn repeated_reports_do_not_notify() {
        let monitor = NetworkMonitor::new(false, Duration::from_secs(2));
        let mut rx = monitor.subscribe();

        monitor.report(false);
        assert!(!rx.has_changed().unwrap());

        monitor.report(true);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().online);
        assert!(monitor.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn flapping_pushes_trigger_deadline() {
        let monitor = NetworkMonitor::new(false, Duration::from_secs(2));
        monitor.report(true);
        let first = monitor.next_trigger_at();

        tokio::time::advance(Duration::from_secs(1)).await;
        monitor.report(false);
        monitor.report(true);

        assert_eq!(monitor.next_trigger_at(), first + Duration::from_secs(1));
    }
}
