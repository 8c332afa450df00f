//! The single source of truth for what is being watched.
//!
//! The registry maps `BroadcastId` → running monitor and is the only
//! structure shared between tasks; every mutation goes through one
//! `tokio::sync::Mutex`. Start and stop are idempotent so the command
//! interface and group discovery can race each other harmlessly.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::telegram::NotificationSink;
use crate::vk::{BroadcastId, PlatformClient, PlatformError};

use super::stream::{SharedState, StreamMonitor};
use super::{MonitorOrigin, MonitorSettings, MonitorStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotFound,
}

/// One row of `list()` output.
#[derive(Debug, Clone)]
pub struct MonitorSnapshot {
    pub id: BroadcastId,
    pub origin: MonitorOrigin,
    pub status: MonitorStatus,
    pub last_pair: Option<(u32, u32)>,
}

struct MonitorEntry {
    origin: MonitorOrigin,
    shared: Arc<RwLock<SharedState>>,
    stop_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

pub struct MonitorRegistry {
    client: Arc<dyn PlatformClient>,
    sink: Arc<dyn NotificationSink>,
    settings: MonitorSettings,
    monitors: Mutex<HashMap<BroadcastId, MonitorEntry>>,
    /// Monitors report their own end here; the reaper task performs the
    /// removal so a monitor never races its own deregistration.
    ended_tx: mpsc::UnboundedSender<BroadcastId>,
}

impl MonitorRegistry {
    pub fn new(
        client: Arc<dyn PlatformClient>,
        sink: Arc<dyn NotificationSink>,
        settings: MonitorSettings,
    ) -> Arc<Self> {
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(MonitorRegistry {
            client,
            sink,
            settings,
            monitors: Mutex::new(HashMap::new()),
            ended_tx,
        });
        tokio::spawn(reap_ended(Arc::downgrade(&registry), ended_rx));
        registry
    }

    /// Start a monitor for `id` unless one is already running.
    ///
    /// A broadcast that does not exist (or is inaccessible) fails the start
    /// request; that is the one moment `NotFound` reaches a caller.
    pub async fn start(
        &self,
        id: BroadcastId,
        origin: MonitorOrigin,
    ) -> Result<StartOutcome, PlatformError> {
        let mut monitors = self.monitors.lock().await;
        if monitors.contains_key(&id) {
            debug!("Monitor for {id} already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        // Surface not-found to the requester now; a stream that exists but
        // already finished still gets a monitor, whose first liveness check
        // ends it with the usual notification.
        self.client.is_live(id).await?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let shared = Arc::new(RwLock::new(SharedState {
            status: MonitorStatus::Initializing,
            last_pair: None,
        }));
        let monitor = StreamMonitor::new(
            id,
            Arc::clone(&self.client),
            Arc::clone(&self.sink),
            self.settings.clone(),
            Arc::clone(&shared),
            stop_rx,
            self.ended_tx.clone(),
        );
        let task = tokio::spawn(monitor.run());
        monitors.insert(
            id,
            MonitorEntry {
                origin,
                shared,
                stop_tx,
                task,
            },
        );
        info!("Registered monitor for {id} ({origin:?})");
        Ok(StartOutcome::Started)
    }

    /// Stop and deregister the monitor for `id`, if any. Unknown ids are a
    /// reportable outcome, not an error.
    pub async fn stop(&self, id: BroadcastId) -> StopOutcome {
        let mut monitors = self.monitors.lock().await;
        match monitors.remove(&id) {
            Some(entry) => {
                // The monitor observes the signal, marks itself Stopped and
                // exits; an in-flight fetch result gets discarded there.
                let _ = entry.stop_tx.send(true);
                info!("Deregistered monitor for {id}");
                StopOutcome::Stopped
            }
            None => {
                debug!("Stop requested for unknown broadcast {id}");
                StopOutcome::NotFound
            }
        }
    }

    pub async fn contains(&self, id: BroadcastId) -> bool {
        self.monitors.lock().await.contains_key(&id)
    }

    /// Stable snapshot of all registered monitors.
    pub async fn list(&self) -> Vec<MonitorSnapshot> {
        let monitors = self.monitors.lock().await;
        let mut out = Vec::with_capacity(monitors.len());
        for (id, entry) in monitors.iter() {
            let shared = entry.shared.read().await;
            out.push(MonitorSnapshot {
                id: *id,
                origin: entry.origin,
                status: shared.status,
                last_pair: shared.last_pair,
            });
        }
        out.sort_by_key(|s| s.id);
        out
    }

    async fn remove_ended(&self, id: BroadcastId) {
        let mut monitors = self.monitors.lock().await;
        // Only reap a terminal monitor: the id may have been restarted
        // since the end signal was sent, and that entry must survive.
        let terminal = match monitors.get(&id) {
            Some(entry) => entry.shared.read().await.status.is_terminal(),
            None => return,
        };
        if terminal {
            if let Some(entry) = monitors.remove(&id) {
                entry.task.abort();
                info!("Reaped ended monitor for {id}");
            }
        } else {
            warn!("End signal for {id} but its monitor is not terminal, keeping it");
        }
    }
}

/// Drains end-of-broadcast signals and removes the matching entries.
/// Holds only a weak reference so dropping the registry shuts this down.
async fn reap_ended(
    registry: Weak<MonitorRegistry>,
    mut ended_rx: mpsc::UnboundedReceiver<BroadcastId>,
) {
    while let Some(id) = ended_rx.recv().await {
        let Some(registry) = registry.upgrade() else {
            break;
        };
        registry.remove_ended(id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{MockPlatform, RecordingSink};
    use super::super::HomeSide;
    use super::*;
    use std::time::Duration;

    fn registry_with(platform: Arc<MockPlatform>) -> Arc<MonitorRegistry> {
        MonitorRegistry::new(
            platform,
            Arc::new(RecordingSink::new()),
            MonitorSettings {
                poll_interval: Duration::from_secs(30),
                fetch_limit: 100,
                home_side: HomeSide::First,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let platform = Arc::new(MockPlatform::new());
        let id = BroadcastId::new(-5, 1);
        platform.set_live(id, true).await;
        let registry = registry_with(platform);

        let first = registry.start(id, MonitorOrigin::UserRequested).await.unwrap();
        let second = registry.start(id, MonitorOrigin::AutoDiscovered).await.unwrap();
        assert_eq!(first, StartOutcome::Started);
        assert_eq!(second, StartOutcome::AlreadyRunning);

        let snap = registry.list().await;
        assert_eq!(snap.len(), 1);
        // The original registration wins, including its origin.
        assert_eq!(snap[0].origin, MonitorOrigin::UserRequested);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_unknown_is_not_found() {
        let platform = Arc::new(MockPlatform::new());
        let registry = registry_with(platform);
        let outcome = registry.stop(BroadcastId::new(-5, 99)).await;
        assert_eq!(outcome, StopOutcome::NotFound);
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_removes_entry() {
        let platform = Arc::new(MockPlatform::new());
        let id = BroadcastId::new(-5, 2);
        platform.set_live(id, true).await;
        let registry = registry_with(platform);

        registry.start(id, MonitorOrigin::UserRequested).await.unwrap();
        assert!(registry.contains(id).await);
        assert_eq!(registry.stop(id).await, StopOutcome::Stopped);
        assert!(!registry.contains(id).await);
        // Stopping again stays idempotent.
        assert_eq!(registry.stop(id).await, StopOutcome::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_unknown_broadcast_fails() {
        let platform = Arc::new(MockPlatform::new());
        let id = BroadcastId::new(-5, 3);
        platform.set_missing(id, true).await;
        let registry = registry_with(platform);

        let err = registry.start(id, MonitorOrigin::UserRequested).await.unwrap_err();
        assert!(matches!(err, PlatformError::NotFound));
        assert!(registry.list().await.is_empty());
    }
}
