use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Where the engine's notifications go.
///
/// `notify` feeds the destination channel; `notify_admin` reaches the
/// operator directly (monitor lifecycle messages). `media` is a clip file
/// name from the celebration selector, resolved against the configured
/// clips directory by the implementation.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, text: &str, media: Option<&str>) -> Result<()>;

    async fn notify_admin(&self, text: &str) -> Result<()>;
}

/// Notification sink backed by the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramSink {
    http: Client,
    /// `https://api.telegram.org/bot<token>`
    bot_url: String,
    channel_id: String,
    admin_id: i64,
    celebrations_dir: PathBuf,
}

impl TelegramSink {
    pub fn new(
        api_url: &str,
        bot_token: &str,
        channel_id: &str,
        admin_id: i64,
        celebrations_dir: &str,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(TelegramSink {
            http,
            bot_url: format!("{}/bot{}", api_url.trim_end_matches('/'), bot_token),
            channel_id: channel_id.to_string(),
            admin_id,
            celebrations_dir: PathBuf::from(celebrations_dir),
        })
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/sendMessage", self.bot_url);
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Telegram sendMessage request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram sendMessage error {}: {}", status, body);
        }
        Ok(())
    }

    async fn send_video(&self, chat_id: &str, caption: &str, clip: &str) -> Result<()> {
        let path = self.celebrations_dir.join(clip);
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("celebration clip not readable: {}", path.display()))?;

        let url = format!("{}/sendVideo", self.bot_url);
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", "HTML")
            .part(
                "video",
                reqwest::multipart::Part::bytes(bytes).file_name(clip.to_string()),
            );

        let resp = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .context("Telegram sendVideo request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram sendVideo error {}: {}", status, body);
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn notify(&self, text: &str, media: Option<&str>) -> Result<()> {
        debug!("notify channel: {} (media: {:?})", text, media);
        match media {
            Some(clip) => match self.send_video(&self.channel_id, text, clip).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    // A missing clip must not cost us the notification itself.
                    warn!("Falling back to text notification: {e:#}");
                    self.send_message(&self.channel_id, text).await
                }
            },
            None => self.send_message(&self.channel_id, text).await,
        }
    }

    async fn notify_admin(&self, text: &str) -> Result<()> {
        self.send_message(&self.admin_id.to_string(), text).await
    }
}
