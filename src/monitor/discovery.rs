//! Automatic broadcast discovery over one VK group.
//!
//! A single process-wide poller: every cycle it fetches the group's live
//! broadcasts, starts monitors for new ones and withdraws monitors it
//! started for broadcasts that left the live set. Monitors the user asked
//! for explicitly are never withdrawn here; only their own liveness check
//! may end them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::telegram::NotificationSink;
use crate::vk::{PlatformClient, PlatformError};

use super::{MonitorOrigin, MonitorRegistry, StartOutcome};

/// Answer to the `group_status` control call.
#[derive(Debug, Clone)]
pub struct GroupStatus {
    pub group_id: i64,
    pub running: bool,
    pub auto_discovered: usize,
}

pub struct GroupDiscovery {
    group_id: i64,
    registry: Arc<MonitorRegistry>,
    client: Arc<dyn PlatformClient>,
    sink: Arc<dyn NotificationSink>,
    poll_interval: Duration,
    running: AtomicBool,
}

impl GroupDiscovery {
    pub fn new(
        group_id: i64,
        registry: Arc<MonitorRegistry>,
        client: Arc<dyn PlatformClient>,
        sink: Arc<dyn NotificationSink>,
        poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(GroupDiscovery {
            group_id,
            registry,
            client,
            sink,
            poll_interval,
            running: AtomicBool::new(false),
        })
    }

    /// Spawn the polling loop on the runtime.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self: Arc<Self>) {
        info!(
            "Group discovery started for group {} (interval={:?})",
            self.group_id, self.poll_interval
        );
        self.running.store(true, Ordering::Relaxed);

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.cycle().await;
        }
    }

    /// One discovery cycle. Failures here only cost us this cycle.
    pub(crate) async fn cycle(&self) {
        let live = match self.client.list_live(self.group_id).await {
            Ok(live) => live,
            Err(e) => {
                warn!("Group {} live listing failed: {e}", self.group_id);
                return;
            }
        };

        for &id in &live {
            if self.registry.contains(id).await {
                continue;
            }
            info!("New live broadcast discovered in group {}: {id}", self.group_id);
            self.announce(id.url()).await;
            if let Err(e) = self.registry.start(id, MonitorOrigin::AutoDiscovered).await {
                warn!("Failed to start discovered monitor for {id}: {e}");
            }
        }

        // Withdraw only what discovery itself started. This overlaps with
        // each monitor's own liveness check; both sides are idempotent.
        for snapshot in self.registry.list().await {
            if snapshot.origin == MonitorOrigin::AutoDiscovered && !live.contains(&snapshot.id) {
                info!(
                    "Broadcast {} left the live set of group {}, withdrawing its monitor",
                    snapshot.id, self.group_id
                );
                self.registry.stop(snapshot.id).await;
            }
        }
    }

    /// One-shot: start monitors for everything currently live in the group.
    /// Returns how many monitors were started.
    pub async fn catch_existing(&self) -> Result<usize, PlatformError> {
        let live = self.client.list_live(self.group_id).await?;
        let mut started = 0;
        for id in live {
            match self.registry.start(id, MonitorOrigin::AutoDiscovered).await {
                Ok(StartOutcome::Started) => {
                    self.announce(id.url()).await;
                    started += 1;
                }
                Ok(StartOutcome::AlreadyRunning) => {}
                Err(e) => warn!("Failed to start monitor for existing broadcast {id}: {e}"),
            }
        }
        info!("catch_existing started {started} monitor(s) in group {}", self.group_id);
        Ok(started)
    }

    async fn announce(&self, url: String) {
        if let Err(e) = self
            .sink
            .notify(&format!("Ссылка на трансляцию матча: {url}"), None)
            .await
        {
            warn!("Failed to announce broadcast link: {e:#}");
        }
    }

    pub async fn status(&self) -> GroupStatus {
        let auto_discovered = self
            .registry
            .list()
            .await
            .iter()
            .filter(|s| s.origin == MonitorOrigin::AutoDiscovered)
            .count();
        GroupStatus {
            group_id: self.group_id,
            running: self.running.load(Ordering::Relaxed),
            auto_discovered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{MockPlatform, RecordingSink};
    use super::super::{HomeSide, MonitorSettings, MonitorStatus};
    use super::*;
    use crate::vk::BroadcastId;

    fn settings() -> MonitorSettings {
        MonitorSettings {
            poll_interval: Duration::from_secs(30),
            fetch_limit: 100,
            home_side: HomeSide::First,
        }
    }

    async fn setup() -> (Arc<MockPlatform>, Arc<RecordingSink>, Arc<MonitorRegistry>, Arc<GroupDiscovery>) {
        let platform = Arc::new(MockPlatform::new());
        let sink = Arc::new(RecordingSink::new());
        let registry = MonitorRegistry::new(platform.clone(), sink.clone(), settings());
        let discovery = GroupDiscovery::new(
            777,
            Arc::clone(&registry),
            platform.clone(),
            sink.clone(),
            Duration::from_secs(15),
        );
        (platform, sink, registry, discovery)
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_starts_and_withdraws_auto_monitors() {
        let (platform, sink, registry, discovery) = setup().await;
        let b = BroadcastId::new(-777, 100);

        platform.set_group_live([b]).await;
        discovery.cycle().await;

        let snap = registry.list().await;
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].id, b);
        assert_eq!(snap[0].origin, MonitorOrigin::AutoDiscovered);
        // The broadcast link goes to the channel once.
        let notes = sink.notifications().await;
        assert_eq!(notes.iter().filter(|n| n.0.contains(&b.url())).count(), 1);

        // B drops out of the live set: its monitor is withdrawn.
        platform.set_group_live([]).await;
        discovery.cycle().await;
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_requested_monitor_survives_discovery() {
        let (platform, _sink, registry, discovery) = setup().await;
        let b = BroadcastId::new(-777, 101);
        let c = BroadcastId::new(-777, 102);

        platform.set_group_live([b]).await;
        platform.set_live(c, true).await;
        registry.start(c, MonitorOrigin::UserRequested).await.unwrap();
        discovery.cycle().await;
        assert_eq!(registry.list().await.len(), 2);

        // Neither B nor C is in the live set now; only B goes away.
        platform.set_group_live([]).await;
        discovery.cycle().await;

        let snap = registry.list().await;
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].id, c);
        assert_eq!(snap[0].origin, MonitorOrigin::UserRequested);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_does_not_double_start() {
        let (platform, _sink, registry, discovery) = setup().await;
        let b = BroadcastId::new(-777, 103);

        platform.set_group_live([b]).await;
        discovery.cycle().await;
        discovery.cycle().await;
        assert_eq!(registry.list().await.len(), 1);
        // Let the single monitor establish its baseline.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(registry.list().await[0].status, MonitorStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_catch_existing_counts_new_monitors() {
        let (platform, _sink, registry, discovery) = setup().await;
        let b1 = BroadcastId::new(-777, 104);
        let b2 = BroadcastId::new(-777, 105);

        platform.set_group_live([b1, b2]).await;
        assert_eq!(discovery.catch_existing().await.unwrap(), 2);
        // All already running: nothing new to start.
        assert_eq!(discovery.catch_existing().await.unwrap(), 0);
        assert_eq!(registry.list().await.len(), 2);
    }
}
