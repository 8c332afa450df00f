//! Scriptable platform and sink fakes for engine tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use crate::telegram::NotificationSink;
use crate::vk::{BroadcastId, Comment, PlatformClient, PlatformError};

pub(crate) fn comment(id: i64, text: &str) -> Comment {
    Comment {
        id,
        author: "Тестовый Зритель".to_string(),
        text: text.to_string(),
        created_at: Utc::now(),
    }
}

#[derive(Default)]
struct MockState {
    comments: HashMap<BroadcastId, Vec<Comment>>,
    live: HashSet<BroadcastId>,
    missing: HashSet<BroadcastId>,
    failing: HashSet<BroadcastId>,
    group_live: HashSet<BroadcastId>,
}

/// In-memory stand-in for the VK client, mutated by tests between cycles.
#[derive(Default)]
pub(crate) struct MockPlatform {
    state: Mutex<MockState>,
}

impl MockPlatform {
    pub(crate) fn new() -> Self {
        MockPlatform::default()
    }

    pub(crate) async fn push_comment(&self, id: BroadcastId, comment: Comment) {
        self.state
            .lock()
            .await
            .comments
            .entry(id)
            .or_default()
            .push(comment);
    }

    pub(crate) async fn set_live(&self, id: BroadcastId, live: bool) {
        let mut state = self.state.lock().await;
        if live {
            state.live.insert(id);
        } else {
            state.live.remove(&id);
        }
    }

    pub(crate) async fn set_missing(&self, id: BroadcastId, missing: bool) {
        let mut state = self.state.lock().await;
        if missing {
            state.missing.insert(id);
        } else {
            state.missing.remove(&id);
        }
    }

    /// Make every call about `id` fail transiently.
    pub(crate) async fn set_failing(&self, id: BroadcastId, failing: bool) {
        let mut state = self.state.lock().await;
        if failing {
            state.failing.insert(id);
        } else {
            state.failing.remove(&id);
        }
    }

    pub(crate) async fn set_group_live(&self, ids: impl IntoIterator<Item = BroadcastId>) {
        let mut state = self.state.lock().await;
        state.group_live = ids.into_iter().collect();
        // Anything live in the group is live as a broadcast too.
        let group_live = state.group_live.clone();
        state.live.extend(group_live);
    }

    async fn check(&self, id: BroadcastId) -> Result<(), PlatformError> {
        let state = self.state.lock().await;
        if state.failing.contains(&id) {
            return Err(PlatformError::Transient("scripted failure".into()));
        }
        if state.missing.contains(&id) {
            return Err(PlatformError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    async fn fetch_comments(
        &self,
        id: BroadcastId,
        since_id: i64,
        limit: u32,
    ) -> Result<Vec<Comment>, PlatformError> {
        self.check(id).await?;
        let state = self.state.lock().await;
        let all = state.comments.get(&id).cloned().unwrap_or_default();
        let mut newer: Vec<Comment> = all.into_iter().filter(|c| c.id > since_id).collect();
        newer.sort_by_key(|c| c.id);
        newer.truncate(limit as usize);
        Ok(newer)
    }

    async fn is_live(&self, id: BroadcastId) -> Result<bool, PlatformError> {
        self.check(id).await?;
        Ok(self.state.lock().await.live.contains(&id))
    }

    async fn list_live(&self, _group_id: i64) -> Result<HashSet<BroadcastId>, PlatformError> {
        let state = self.state.lock().await;
        if !state.failing.is_empty() {
            return Err(PlatformError::Transient("scripted failure".into()));
        }
        Ok(state.group_live.clone())
    }
}

/// Sink that records everything instead of talking to Telegram.
#[derive(Default)]
pub(crate) struct RecordingSink {
    notifications: Mutex<Vec<(String, Option<String>)>>,
    admin: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        RecordingSink::default()
    }

    pub(crate) async fn notifications(&self) -> Vec<(String, Option<String>)> {
        self.notifications.lock().await.clone()
    }

    pub(crate) async fn admin_messages(&self) -> Vec<String> {
        self.admin.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, text: &str, media: Option<&str>) -> anyhow::Result<()> {
        self.notifications
            .lock()
            .await
            .push((text.to_string(), media.map(str::to_string)));
        Ok(())
    }

    async fn notify_admin(&self, text: &str) -> anyhow::Result<()> {
        self.admin.lock().await.push(text.to_string());
        Ok(())
    }
}
