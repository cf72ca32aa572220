// config.rs
#[derive(Debug, Clone)]
pub struct Config {
    /// Safety-net refetch cadence for the session directory.
    pub directory_refresh_secs: u64,
    /// Open-conversation refetch cadence; short, chat latency matters.
    pub message_refresh_secs: u64,
    /// Buffered capacity of the change-feed fan-out channel.
    pub feed_capacity: usize,
    /// Toast preview length for inbound customer messages.
    pub preview_chars: usize,
}

impl Config {
    pub fn init() -> Config {
        let directory_refresh_secs = std::env::var("NESTDESK_DIRECTORY_REFRESH_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10);
        let message_refresh_secs = std::env::var("NESTDESK_MESSAGE_REFRESH_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(2);
        let feed_capacity = std::env::var("NESTDESK_FEED_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(256);
        let preview_chars = std::env::var("NESTDESK_PREVIEW_CHARS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(80);

        Config {
            directory_refresh_secs,
            message_refresh_secs,
            feed_capacity,
            preview_chars,
        }
    }
}
