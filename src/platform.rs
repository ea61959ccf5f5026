//! Chat platform seam: message history, single message lookup and reaction
//! markers, with the serenity-backed implementation used by the bot.

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Reaction markers the bot reads and writes on quote channel messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// The message currently resolves to a stored quote.
    Success,
    /// The bot is writing the quote.
    InProgress,
    /// Transient: nothing matched.
    NoMatch,
    /// Placed by moderators to keep a message out of the quote list.
    Exclude,
}

impl Marker {
    pub fn emoji(self) -> &'static str {
        match self {
            Marker::Success => "✅",
            Marker::InProgress => "🔁",
            Marker::NoMatch => "❌",
            Marker::Exclude => "🗑️",
        }
    }

    /// Compares ignoring the emoji variation selector, which clients add or
    /// drop inconsistently.
    pub fn matches(self, emoji: &str) -> bool {
        strip_variation(emoji) == strip_variation(self.emoji())
    }

    fn reaction_type(self) -> serenity::ReactionType {
        serenity::ReactionType::Unicode(self.emoji().to_string())
    }
}

fn strip_variation(emoji: &str) -> String {
    emoji.chars().filter(|c| *c != '\u{FE0F}').collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub emoji: String,
    /// Placed by the bot itself.
    pub me: bool,
}

/// Platform independent view of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: u64,
    pub channel_id: u64,
    pub content: String,
    pub author_is_bot: bool,
    pub reactions: Vec<Reaction>,
}

impl ChatMessage {
    pub fn has_marker(&self, marker: Marker) -> bool {
        self.reactions.iter().any(|r| marker.matches(&r.emoji))
    }

    pub fn has_own_marker(&self, marker: Marker) -> bool {
        self.reactions
            .iter()
            .any(|r| r.me && marker.matches(&r.emoji))
    }
}

impl From<&serenity::Message> for ChatMessage {
    fn from(message: &serenity::Message) -> Self {
        Self {
            id: message.id.get(),
            channel_id: message.channel_id.get(),
            content: message.content.clone(),
            author_is_bot: message.author.bot,
            reactions: message
                .reactions
                .iter()
                .map(|r| Reaction {
                    emoji: r.reaction_type.to_string(),
                    me: r.me,
                })
                .collect(),
        }
    }
}

/// Discord snowflakes carry their creation time in the top 42 bits.
pub fn snowflake_time(id: u64) -> DateTime<Utc> {
    const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;
    let millis = (id >> 22) as i64 + DISCORD_EPOCH_MS;
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Up to `limit` messages older than `before` (or the newest ones), newest
    /// first.
    async fn fetch_history(
        &self,
        channel_id: u64,
        before: Option<u64>,
        limit: u8,
    ) -> anyhow::Result<Vec<ChatMessage>>;

    /// `Ok(None)` when the message no longer exists.
    async fn fetch_message(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> anyhow::Result<Option<ChatMessage>>;

    async fn add_marker(&self, channel_id: u64, message_id: u64, marker: Marker)
        -> anyhow::Result<()>;

    /// Removes the bot's own reaction.
    async fn remove_marker(
        &self,
        channel_id: u64,
        message_id: u64,
        marker: Marker,
    ) -> anyhow::Result<()>;
}

pub struct SerenityPlatform {
    http: Arc<serenity::Http>,
}

impl SerenityPlatform {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

fn is_not_found(error: &::serenity::Error) -> bool {
    match error {
        ::serenity::Error::Http(e) => e.status_code().map(|s| s.as_u16()) == Some(404),
        _ => false,
    }
}

#[async_trait]
impl ChatPlatform for SerenityPlatform {
    async fn fetch_history(
        &self,
        channel_id: u64,
        before: Option<u64>,
        limit: u8,
    ) -> anyhow::Result<Vec<ChatMessage>> {
        let mut request = serenity::GetMessages::new().limit(limit);
        if let Some(before) = before {
            request = request.before(serenity::MessageId::new(before));
        }
        let messages = serenity::ChannelId::new(channel_id)
            .messages(&self.http, request)
            .await
            .with_context(|| format!("Failed to fetch history for channel {}", channel_id))?;
        Ok(messages.iter().map(ChatMessage::from).collect())
    }

    async fn fetch_message(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> anyhow::Result<Option<ChatMessage>> {
        match serenity::ChannelId::new(channel_id)
            .message(&self.http, serenity::MessageId::new(message_id))
            .await
        {
            Ok(message) => Ok(Some(ChatMessage::from(&message))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(anyhow::Error::from(e)
                .context(format!("Failed to fetch message {}", message_id))),
        }
    }

    async fn add_marker(
        &self,
        channel_id: u64,
        message_id: u64,
        marker: Marker,
    ) -> anyhow::Result<()> {
        self.http
            .create_reaction(
                serenity::ChannelId::new(channel_id),
                serenity::MessageId::new(message_id),
                &marker.reaction_type(),
            )
            .await
            .with_context(|| format!("Failed to add {} to message {}", marker.emoji(), message_id))
    }

    async fn remove_marker(
        &self,
        channel_id: u64,
        message_id: u64,
        marker: Marker,
    ) -> anyhow::Result<()> {
        self.http
            .delete_reaction_me(
                serenity::ChannelId::new(channel_id),
                serenity::MessageId::new(message_id),
                &marker.reaction_type(),
            )
            .await
            .with_context(|| {
                format!("Failed to remove {} from message {}", marker.emoji(), message_id)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_matching_ignores_variation_selector() {
        assert!(Marker::Exclude.matches("🗑️"));
        assert!(Marker::Exclude.matches("🗑"));
        assert!(Marker::Success.matches("✅"));
        assert!(!Marker::Success.matches("❌"));
    }

    #[test]
    fn test_own_markers() {
        let message = ChatMessage {
            id: 1,
            channel_id: 2,
            content: String::new(),
            author_is_bot: false,
            reactions: vec![
                Reaction {
                    emoji: "✅".to_string(),
                    me: false,
                },
                Reaction {
                    emoji: "🗑".to_string(),
                    me: false,
                },
            ],
        };
        assert!(message.has_marker(Marker::Success));
        assert!(!message.has_own_marker(Marker::Success));
        assert!(message.has_marker(Marker::Exclude));
        assert!(!message.has_marker(Marker::NoMatch));
    }

    #[test]
    fn test_snowflake_time() {
        // Example id from the Discord API reference.
        let time = snowflake_time(175928847299117063);
        assert_eq!(time.timestamp_millis(), 1462015105796);
    }

    #[test]
    fn test_from_serenity_message() {
        let mut message = serenity::Message::default();
        message.id = serenity::MessageId::new(5);
        message.channel_id = serenity::ChannelId::new(6);
        message.content = "Jonathan: hi".to_string();
        let converted = ChatMessage::from(&message);
        assert_eq!(converted.id, 5);
        assert_eq!(converted.channel_id, 6);
        assert_eq!(converted.content, "Jonathan: hi");
        assert!(!converted.author_is_bot);
        assert!(converted.reactions.is_empty());
    }
}
