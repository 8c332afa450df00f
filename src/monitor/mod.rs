pub mod discovery;
pub mod registry;
pub mod stream;

#[cfg(test)]
pub(crate) mod testutil;

pub use discovery::{GroupDiscovery, GroupStatus};
pub use registry::{MonitorRegistry, MonitorSnapshot, StartOutcome, StopOutcome};

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::vk;

/// How a monitor came to exist. User-requested monitors are never torn
/// down by group discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOrigin {
    UserRequested,
    AutoDiscovered,
}

/// Stream monitor lifecycle. `Stopped` and `Ended` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    Initializing,
    Running,
    Stopped,
    Ended,
}

impl MonitorStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, MonitorStatus::Stopped | MonitorStatus::Ended)
    }
}

/// Which element of a `{a}-{b}` score comment is our team's tally.
/// The comment convention is not something the parser can infer, so it is
/// explicit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum HomeSide {
    /// Our goals are the first number (`1-0` means we lead).
    First,
    /// Our goals are the second number.
    Second,
}

/// Knobs shared by every stream monitor.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub fetch_limit: u32,
    pub home_side: HomeSide,
}

/// Control API over the engine, consumed by the command interface.
pub struct MonitorEngine {
    registry: Arc<MonitorRegistry>,
    discovery: Option<Arc<GroupDiscovery>>,
}

impl MonitorEngine {
    pub fn new(registry: Arc<MonitorRegistry>, discovery: Option<Arc<GroupDiscovery>>) -> Self {
        MonitorEngine {
            registry,
            discovery,
        }
    }

    /// Start monitoring the broadcast behind a user-supplied URL.
    pub async fn start_monitor(&self, url: &str) -> Result<StartOutcome> {
        let id = vk::url::parse_video_url(url)?;
        self.registry
            .start(id, MonitorOrigin::UserRequested)
            .await
            .with_context(|| format!("could not start monitoring {id}"))
    }

    /// Stop monitoring the broadcast behind a user-supplied URL.
    pub async fn stop_monitor(&self, url: &str) -> Result<StopOutcome> {
        let id = vk::url::parse_video_url(url)?;
        Ok(self.registry.stop(id).await)
    }

    /// Snapshot of everything currently monitored.
    pub async fn list_monitors(&self) -> Vec<MonitorSnapshot> {
        self.registry.list().await
    }

    /// Group discovery status, if discovery is configured.
    pub async fn group_status(&self) -> Option<GroupStatus> {
        match &self.discovery {
            Some(d) => Some(d.status().await),
            None => None,
        }
    }

    /// Start monitors for every broadcast currently live in the group.
    /// Returns how many monitors were actually started.
    pub async fn catch_existing(&self) -> Result<usize> {
        match &self.discovery {
            Some(d) => d.catch_existing().await.map_err(Into::into),
            None => bail!("group discovery is not configured"),
        }
    }
}
