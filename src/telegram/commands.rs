//! Telegram bot command interface.
//!
//! A long-polling `getUpdates` loop that translates chat commands into
//! engine control calls. This is deliberately thin glue: all lifecycle
//! logic lives in the monitor engine.

use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::monitor::{MonitorEngine, MonitorStatus, StartOutcome, StopOutcome};

const HELP_TEXT: &str = "👋 Бот мониторинга трансляций VK\n\n\
Команды:\n\
/monitor <ссылка> — начать мониторинг трансляции\n\
/stop <ссылка> — остановить мониторинг\n\
/list — активные трансляции\n\
/group_status — состояние мониторинга группы\n\
/catch_existing — подхватить уже идущие трансляции\n\n\
Пример:\n\
/monitor https://vk.com/video-123456789_456123789";

/// Seconds Telegram holds a getUpdates request open.
const LONG_POLL_SECS: u64 = 25;

pub struct CommandListener {
    http: Client,
    bot_url: String,
    engine: Arc<MonitorEngine>,
}

impl CommandListener {
    pub fn new(api_url: &str, bot_token: &str, engine: Arc<MonitorEngine>) -> Result<Self> {
        let http = Client::builder()
            // Must outlive the long-poll hold time.
            .timeout(std::time::Duration::from_secs(LONG_POLL_SECS + 10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(CommandListener {
            http,
            bot_url: format!("{}/bot{}", api_url.trim_end_matches('/'), bot_token),
            engine,
        })
    }

    /// Poll for updates forever. Transient Telegram failures back off and
    /// retry; nothing here is fatal.
    pub async fn run(self) {
        let mut offset: i64 = 0;
        loop {
            match self.get_updates(offset).await {
                Ok(updates) => {
                    for update in updates {
                        if let Some(update_id) = update["update_id"].as_i64() {
                            offset = offset.max(update_id + 1);
                        }
                        let message = &update["message"];
                        let (Some(chat_id), Some(text)) = (
                            message["chat"]["id"].as_i64(),
                            message["text"].as_str(),
                        ) else {
                            continue;
                        };
                        self.handle_command(chat_id, text).await;
                    }
                }
                Err(e) => {
                    warn!("getUpdates failed: {e:#}");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                }
            }
        }
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<serde_json::Value>> {
        let url = format!("{}/getUpdates", self.bot_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", LONG_POLL_SECS.to_string()),
                ("allowed_updates", r#"["message"]"#.to_string()),
            ])
            .send()
            .await
            .context("Telegram getUpdates request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("Telegram getUpdates error: {}", resp.status());
        }
        let raw: serde_json::Value = resp.json().await?;
        Ok(raw["result"].as_array().cloned().unwrap_or_default())
    }

    async fn handle_command(&self, chat_id: i64, text: &str) {
        let mut parts = text.split_whitespace();
        let Some(command) = parts.next() else { return };
        // Group chats address commands as /cmd@BotName.
        let command = command.split('@').next().unwrap_or(command);
        let arg = parts.next();
        debug!("Command from {chat_id}: {command} {arg:?}");

        let reply = match command {
            "/start" | "/help" => HELP_TEXT.to_string(),
            "/monitor" => self.cmd_monitor(arg).await,
            "/stop" => self.cmd_stop(arg).await,
            "/list" => self.cmd_list().await,
            "/group_status" => self.cmd_group_status().await,
            "/catch_existing" => self.cmd_catch_existing().await,
            _ => return,
        };
        self.reply(chat_id, &reply).await;
    }

    async fn cmd_monitor(&self, arg: Option<&str>) -> String {
        let Some(url) = arg else {
            return "❌ Укажите ссылку на трансляцию\n\
                    Пример: /monitor https://vk.com/video-123456789_456123789"
                .to_string();
        };
        match self.engine.start_monitor(url).await {
            Ok(StartOutcome::Started) => "✅ Начинаю мониторинг трансляции...".to_string(),
            Ok(StartOutcome::AlreadyRunning) => {
                "⚠️ Эта трансляция уже отслеживается".to_string()
            }
            Err(e) => format!("❌ Ошибка: {e:#}"),
        }
    }

    async fn cmd_stop(&self, arg: Option<&str>) -> String {
        let Some(url) = arg else {
            return "❌ Укажите ссылку на трансляцию\n\
                    Пример: /stop https://vk.com/video-123456789_456123789"
                .to_string();
        };
        match self.engine.stop_monitor(url).await {
            Ok(StopOutcome::Stopped) => "✅ Мониторинг трансляции остановлен".to_string(),
            Ok(StopOutcome::NotFound) => "⚠️ Эта трансляция не отслеживается".to_string(),
            Err(e) => format!("❌ Ошибка: {e:#}"),
        }
    }

    async fn cmd_list(&self) -> String {
        let monitors = self.engine.list_monitors().await;
        if monitors.is_empty() {
            return "📭 Нет отслеживаемых трансляций".to_string();
        }
        let mut out = String::from("📊 Отслеживаемые трансляции:\n\n");
        for (i, m) in monitors.iter().enumerate() {
            let status = match m.status {
                MonitorStatus::Initializing => "запускается",
                MonitorStatus::Running => "активна",
                MonitorStatus::Stopped => "остановлена",
                MonitorStatus::Ended => "завершена",
            };
            let score = match m.last_pair {
                Some((a, b)) => format!(", счет {a}-{b}"),
                None => String::new(),
            };
            out.push_str(&format!("{}. {} — {status}{score}\n", i + 1, m.id.url()));
        }
        out
    }

    async fn cmd_group_status(&self) -> String {
        match self.engine.group_status().await {
            Some(status) => format!(
                "📊 <b>Мониторинг группы VK</b>\n\n\
                 🔍 Группа: {}\n\
                 📈 Статус: {}\n\
                 📺 Автоматически отслеживается: {}",
                status.group_id,
                if status.running { "✅ активен" } else { "❌ не запущен" },
                status.auto_discovered
            ),
            None => "❌ Мониторинг группы VK не настроен".to_string(),
        }
    }

    async fn cmd_catch_existing(&self) -> String {
        match self.engine.catch_existing().await {
            Ok(0) => "ℹ️ Новых трансляций нет, всё уже отслеживается".to_string(),
            Ok(n) => format!("✅ Начат мониторинг {n} трансляции(й)"),
            Err(e) => format!("❌ Ошибка: {e:#}"),
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        let url = format!("{}/sendMessage", self.bot_url);
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Err(e) = self.http.post(&url).json(&body).send().await {
            warn!("Failed to reply to {chat_id}: {e}");
        }
    }
}
