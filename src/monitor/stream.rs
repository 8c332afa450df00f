//! Per-broadcast polling task.
//!
//! One `StreamMonitor` owns one broadcast: it establishes a comment-id
//! baseline, polls for new comments on a fixed interval, turns score
//! comments into channel notifications, and detects the end of the
//! broadcast. The registry owns its lifetime; the monitor only ever
//! signals termination, it never deregisters itself.

use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::score::{parse_score, select_celebration, ScoreEvent};
use crate::telegram::NotificationSink;
use crate::vk::{BroadcastId, Comment, PlatformClient, PlatformError};

use super::{HomeSide, MonitorSettings, MonitorStatus};

/// The slice of monitor state the registry reads for `list()`. Written
/// only by the owning monitor task.
#[derive(Debug)]
pub(crate) struct SharedState {
    pub status: MonitorStatus,
    pub last_pair: Option<(u32, u32)>,
}

enum CycleOutcome {
    Continue,
    Ended,
    Stopped,
}

pub(crate) struct StreamMonitor {
    id: BroadcastId,
    client: Arc<dyn PlatformClient>,
    sink: Arc<dyn NotificationSink>,
    settings: MonitorSettings,
    shared: Arc<RwLock<SharedState>>,
    stop_rx: watch::Receiver<bool>,
    ended_tx: mpsc::UnboundedSender<BroadcastId>,
    /// Monotonic comment-id cursor; comments at or below it are never
    /// re-examined.
    last_seen: i64,
    baseline_set: bool,
}

impl StreamMonitor {
    pub(crate) fn new(
        id: BroadcastId,
        client: Arc<dyn PlatformClient>,
        sink: Arc<dyn NotificationSink>,
        settings: MonitorSettings,
        shared: Arc<RwLock<SharedState>>,
        stop_rx: watch::Receiver<bool>,
        ended_tx: mpsc::UnboundedSender<BroadcastId>,
    ) -> Self {
        StreamMonitor {
            id,
            client,
            sink,
            settings,
            shared,
            stop_rx,
            ended_tx,
            last_seen: 0,
            baseline_set: false,
        }
    }

    /// Main loop. Runs until stopped externally or the broadcast ends.
    pub(crate) async fn run(mut self) {
        info!("Monitor started for {}", self.id);
        if let Err(e) = self
            .sink
            .notify_admin(&format!(
                "✅ Начат мониторинг трансляции\n🔗 {}\n⏱ Проверка каждые {} сек.",
                self.id.url(),
                self.settings.poll_interval.as_secs()
            ))
            .await
        {
            warn!("[{}] Failed to send start notification: {e:#}", self.id);
        }

        let mut interval = tokio::time::interval(self.settings.poll_interval);
        // A cycle in flight must suppress the next tick, never overlap it.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stop_rx = self.stop_rx.clone();

        loop {
            tokio::select! {
                res = stop_rx.changed() => {
                    // A closed channel means the registry is gone; exit too.
                    if res.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    match self.cycle().await {
                        CycleOutcome::Continue => {}
                        CycleOutcome::Stopped => break,
                        CycleOutcome::Ended => {
                            self.finish_ended().await;
                            return;
                        }
                    }
                }
            }
        }

        self.set_status(MonitorStatus::Stopped).await;
        info!("Monitor stopped for {}", self.id);
    }

    fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    async fn set_status(&self, status: MonitorStatus) {
        self.shared.write().await.status = status;
    }

    /// One poll cycle: baseline if needed, otherwise fetch → parse → emit,
    /// then a liveness check. Transient platform failures skip the rest of
    /// the cycle and we retry on the next tick.
    async fn cycle(&mut self) -> CycleOutcome {
        if !self.baseline_set {
            return self.establish_baseline().await;
        }

        let comments = match self
            .client
            .fetch_comments(self.id, self.last_seen, self.settings.fetch_limit)
            .await
        {
            Ok(c) => c,
            Err(e) => return self.classify_failure("comment fetch", e),
        };
        // An in-flight fetch may race a stop request; discard its result.
        if self.stop_requested() {
            return CycleOutcome::Stopped;
        }

        for comment in &comments {
            if self.stop_requested() {
                return CycleOutcome::Stopped;
            }
            self.process_comment(comment).await;
            self.last_seen = self.last_seen.max(comment.id);
        }

        match self.client.is_live(self.id).await {
            Ok(true) => CycleOutcome::Continue,
            Ok(false) => {
                if self.stop_requested() {
                    CycleOutcome::Stopped
                } else {
                    CycleOutcome::Ended
                }
            }
            Err(e) => self.classify_failure("liveness check", e),
        }
    }

    /// First cycle: record the newest existing comment id so that comments
    /// predating the monitor are never reported, then go `Running`.
    async fn establish_baseline(&mut self) -> CycleOutcome {
        let comments = match self
            .client
            .fetch_comments(self.id, 0, self.settings.fetch_limit)
            .await
        {
            Ok(c) => c,
            Err(e) => return self.classify_failure("baseline fetch", e),
        };
        if self.stop_requested() {
            return CycleOutcome::Stopped;
        }

        self.last_seen = comments.iter().map(|c| c.id).max().unwrap_or(0);
        self.baseline_set = true;
        self.set_status(MonitorStatus::Running).await;
        info!(
            "[{}] Baseline established at comment id {} ({} existing comments skipped)",
            self.id,
            self.last_seen,
            comments.len()
        );
        CycleOutcome::Continue
    }

    /// A vanished broadcast mid-monitoring counts as ended; everything else
    /// is a skipped cycle, never a dead monitor.
    fn classify_failure(&self, what: &str, e: PlatformError) -> CycleOutcome {
        match e {
            PlatformError::NotFound => {
                info!("[{}] Broadcast gone during {what}, treating as ended", self.id);
                CycleOutcome::Ended
            }
            e => {
                warn!("[{}] {what} failed, skipping cycle: {e}", self.id);
                CycleOutcome::Continue
            }
        }
    }

    /// Parse one comment and emit a notification if it reports a score we
    /// have not seen yet. Repeated or edited comments with the same pair
    /// are deduplicated.
    async fn process_comment(&mut self, comment: &Comment) {
        let Some(event) = parse_score(&comment.text) else {
            debug!(
                "[{}] Skipping comment {} from {}: not a score",
                self.id, comment.id, comment.author
            );
            return;
        };

        let last_pair = self.shared.read().await.last_pair;
        if last_pair == Some(event.pair) {
            debug!(
                "[{}] Duplicate score {}-{} in comment {}, ignoring",
                self.id, event.pair.0, event.pair.1, comment.id
            );
            return;
        }

        let (text, media) = self.render_notification(&event, last_pair.unwrap_or((0, 0)));
        if let Err(e) = self.sink.notify(&text, media).await {
            warn!("[{}] Failed to deliver notification: {e:#}", self.id);
        } else {
            info!(
                "[{}] Posted score update: {} (comment {} at {})",
                self.id, text, comment.id, comment.created_at
            );
        }
        self.shared.write().await.last_pair = Some(event.pair);
    }

    /// Build the notification text and optional celebration clip for a new
    /// score. The clip is attached only when our side's tally increased.
    fn render_notification(
        &self,
        event: &ScoreEvent,
        prev: (u32, u32),
    ) -> (String, Option<&'static str>) {
        let (a, b) = event.pair;
        let (ours, theirs) = orient(event.pair, self.settings.home_side);
        let (prev_ours, prev_theirs) = orient(prev, self.settings.home_side);

        if ours > prev_ours {
            let text = match event.player.as_deref() {
                Some(player) => format!(
                    "⚽ Забиваем! Гол забил {}. Счет: {a}-{b}",
                    capitalize(player)
                ),
                None => format!("⚽ Забиваем! Счет: {a}-{b}"),
            };
            (text, Some(select_celebration(event.player.as_deref())))
        } else if theirs > prev_theirs {
            (format!("Пропускаем. Счет: {a}-{b}"), None)
        } else {
            // A correction (score went down or was re-stated); report, no clip.
            (format!("Счет обновлен: {a}-{b}"), None)
        }
    }

    async fn finish_ended(&self) {
        self.set_status(MonitorStatus::Ended).await;
        info!("Broadcast ended: {}", self.id);

        if let Err(e) = self
            .sink
            .notify("🔴 Трансляция завершена. Мониторинг остановлен.", None)
            .await
        {
            warn!("[{}] Failed to send end notification: {e:#}", self.id);
        }
        if let Err(e) = self
            .sink
            .notify_admin(&format!(
                "🔴 <b>ТРАНСЛЯЦИЯ ЗАВЕРШЕНА!</b>\n\n📺 {}\n⏹ Мониторинг остановлен автоматически",
                self.id.url()
            ))
            .await
        {
            warn!("[{}] Failed to send admin end notification: {e:#}", self.id);
        }

        // The registry's reaper removes the entry; never deregister directly.
        let _ = self.ended_tx.send(self.id);
    }
}

fn orient(pair: (u32, u32), side: HomeSide) -> (u32, u32) {
    match side {
        HomeSide::First => pair,
        HomeSide::Second => (pair.1, pair.0),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
