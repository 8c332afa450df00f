pub mod client;
pub mod platform;
pub mod url;

pub use client::VkClient;
pub use platform::{BroadcastId, Comment, PlatformClient, PlatformError};
