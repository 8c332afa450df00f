use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod config;
mod monitor;
mod score;
mod telegram;
mod vk;

use config::Config;
use monitor::{GroupDiscovery, MonitorEngine, MonitorRegistry, MonitorSettings};
use telegram::{CommandListener, NotificationSink, TelegramSink};
use vk::{PlatformClient, VkClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let vk_client: Arc<dyn PlatformClient> = Arc::new(VkClient::new(
        &config.vk_access_token,
        Some(&config.vk_api_url),
    )?);
    let sink: Arc<dyn NotificationSink> = Arc::new(TelegramSink::new(
        &config.telegram_api_url,
        &config.telegram_bot_token,
        &config.telegram_channel_id,
        config.telegram_admin_id,
        &config.celebrations_dir,
    )?);

    let settings = MonitorSettings {
        poll_interval: Duration::from_secs(config.comment_poll_secs),
        fetch_limit: config.comment_fetch_limit,
        home_side: config.home_side,
    };
    let registry = MonitorRegistry::new(Arc::clone(&vk_client), Arc::clone(&sink), settings);

    // Group discovery runs only when a group is configured.
    let discovery = match &config.vk_group {
        Some(group) => {
            let group_id = vk::url::extract_group_id(group)?;
            let discovery = GroupDiscovery::new(
                group_id,
                Arc::clone(&registry),
                Arc::clone(&vk_client),
                Arc::clone(&sink),
                Duration::from_secs(config.discovery_poll_secs),
            );
            Arc::clone(&discovery).spawn();
            info!("Group discovery enabled for VK group {group_id}");
            Some(discovery)
        }
        None => {
            warn!("VK_GROUP not configured, group stream discovery disabled");
            None
        }
    };

    let engine = Arc::new(MonitorEngine::new(registry, discovery));

    let listener = CommandListener::new(
        &config.telegram_api_url,
        &config.telegram_bot_token,
        engine,
    )?;
    info!("Bot started, listening for Telegram commands");
    listener.run().await;

    Ok(())
}
