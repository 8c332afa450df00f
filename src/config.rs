use clap::Parser;

use crate::monitor::HomeSide;

/// VK live-broadcast score relay bot
#[derive(Parser, Debug, Clone)]
#[command(name = "vk-score-relay", version, about)]
pub struct Config {
    /// Telegram bot token
    #[arg(long, env = "TELEGRAM_BOT_TOKEN")]
    pub telegram_bot_token: String,

    /// Telegram channel that receives score notifications (e.g. @mychannel or -100…)
    #[arg(long, env = "TELEGRAM_CHANNEL_ID")]
    pub telegram_channel_id: String,

    /// Telegram user id that receives lifecycle notifications
    #[arg(long, env = "TELEGRAM_ADMIN_ID")]
    pub telegram_admin_id: i64,

    /// VK API access token
    #[arg(long, env = "VK_ACCESS_TOKEN")]
    pub vk_access_token: String,

    /// VK group to watch for new live broadcasts (id or vk.com/club… URL);
    /// discovery is disabled when absent
    #[arg(long, env = "VK_GROUP")]
    pub vk_group: Option<String>,

    /// VK API base URL
    #[arg(long, env = "VK_API_URL", default_value = "https://api.vk.com/method")]
    pub vk_api_url: String,

    /// Telegram Bot API base URL
    #[arg(long, env = "TELEGRAM_API_URL", default_value = "https://api.telegram.org")]
    pub telegram_api_url: String,

    /// Seconds between comment polls per broadcast
    #[arg(long, env = "COMMENT_POLL_SECS", default_value = "30")]
    pub comment_poll_secs: u64,

    /// Seconds between group discovery polls
    #[arg(long, env = "DISCOVERY_POLL_SECS", default_value = "15")]
    pub discovery_poll_secs: u64,

    /// Maximum comments fetched per poll cycle
    #[arg(long, env = "COMMENT_FETCH_LIMIT", default_value = "100")]
    pub comment_fetch_limit: u32,

    /// Which side of a "{a}-{b}" score comment is our team
    #[arg(long, env = "HOME_SIDE", value_enum, default_value = "first")]
    pub home_side: HomeSide,

    /// Directory with celebration video clips
    #[arg(long, env = "CELEBRATIONS_DIR", default_value = "celebrations")]
    pub celebrations_dir: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.telegram_bot_token.trim().is_empty() {
            anyhow::bail!("TELEGRAM_BOT_TOKEN must not be empty");
        }
        if self.vk_access_token.trim().is_empty() {
            anyhow::bail!("VK_ACCESS_TOKEN must not be empty");
        }
        if self.comment_poll_secs == 0 {
            anyhow::bail!("comment_poll_secs must be positive");
        }
        if self.discovery_poll_secs == 0 {
            anyhow::bail!("discovery_poll_secs must be positive");
        }
        if self.comment_fetch_limit == 0 || self.comment_fetch_limit > 100 {
            anyhow::bail!("comment_fetch_limit must be between 1 and 100");
        }
        Ok(())
    }
}
