/// Tunables of the messaging core.
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    /// How long after sending a message its sender may still edit it.
    pub edit_window_secs: i64,
    /// Live reactions kept per (message, user) pair; older ones are evicted.
    pub reaction_cap: usize,
    /// Maximum message length, in characters.
    pub max_content_chars: usize,
    pub max_media_urls: usize,
    pub max_emoji_bytes: usize,
    /// Length of the message preview carried by notifications.
    pub preview_chars: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            edit_window_secs: 60,
            reaction_cap: 2,
            max_content_chars: 4000,
            max_media_urls: 10,
            max_emoji_bytes: 32,
            preview_chars: 80,
        }
    }
}
