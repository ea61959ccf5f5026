/// Per-guild quote settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildConfig {
    pub guild_id: u64,
    /// `None` disables quote capture for the guild.
    pub quote_channel_id: Option<u64>,
    pub custom_pattern: Option<String>,
    /// Swaps the custom pattern's groups: group 1 is the author.
    pub custom_pattern_reversed: bool,
    /// Oldest message id the backfill has fully reconciled. `None` means the
    /// channel was never scanned.
    pub backfill_cursor: Option<u64>,
}

impl GuildConfig {
    pub fn new(guild_id: u64) -> Self {
        Self {
            guild_id,
            quote_channel_id: None,
            custom_pattern: None,
            custom_pattern_reversed: false,
            backfill_cursor: None,
        }
    }

    pub fn is_quote_channel(&self, channel_id: u64) -> bool {
        self.quote_channel_id == Some(channel_id)
    }
}

/// One quote, keyed by the message it was extracted from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRecord {
    pub message_id: u64,
    pub guild_id: u64,
    pub author: String,
    pub content: String,
}
