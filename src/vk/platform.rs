use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Composite key identifying one VK broadcast.
///
/// `owner_id` is negative for group-owned videos; `video_id` is the
/// per-owner video number. Derived once from a URL or a discovery result,
/// never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BroadcastId {
    pub owner_id: i64,
    pub video_id: i64,
}

impl BroadcastId {
    pub fn new(owner_id: i64, video_id: i64) -> Self {
        BroadcastId { owner_id, video_id }
    }

    /// Canonical watch URL for this broadcast.
    pub fn url(&self) -> String {
        format!("https://vk.com/video{}_{}", self.owner_id, self.video_id)
    }
}

impl fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.owner_id, self.video_id)
    }
}

/// One comment on a broadcast as returned by the platform.
///
/// `id` is assigned by VK and is monotonically increasing per broadcast;
/// it is treated as an opaque cursor (monotonic, not contiguous).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Errors from the remote platform, split along the taxonomy the engine
/// cares about: transient failures skip a poll cycle, `NotFound` ends a
/// monitor (or fails a start request).
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Broadcast does not exist, was removed, or access is denied.
    #[error("broadcast not found or access denied")]
    NotFound,

    /// Network error, timeout, rate limit — retry on the next tick.
    #[error("transient platform error: {0}")]
    Transient(String),

    /// Any other VK API error code.
    #[error("VK API error {code}: {message}")]
    Api { code: i64, message: String },
}

impl PlatformError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::Transient(_))
    }
}

/// Trait every broadcast platform backend must implement.
///
/// The engine only ever talks to the platform through this trait, which is
/// what the tests mock.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Fetch comments with id strictly greater than `since_id`, oldest
    /// first, at most `limit` of them. `since_id = 0` returns the most
    /// recent page (used to establish the baseline cursor).
    async fn fetch_comments(
        &self,
        id: BroadcastId,
        since_id: i64,
        limit: u32,
    ) -> Result<Vec<Comment>, PlatformError>;

    /// Whether the broadcast is currently live.
    async fn is_live(&self, id: BroadcastId) -> Result<bool, PlatformError>;

    /// Set of broadcasts currently live in the given group.
    async fn list_live(&self, group_id: i64) -> Result<HashSet<BroadcastId>, PlatformError>;
}
