pub mod commands;
pub mod sink;

pub use commands::CommandListener;
pub use sink::{NotificationSink, TelegramSink};
