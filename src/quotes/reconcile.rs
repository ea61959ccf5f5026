//! Per-message reconciliation between a message's current text, the stored
//! quote and the bot's reaction markers.
//!
//! The quote table is the source of truth. Markers mirror it on a best-effort
//! basis: a marker that cannot be placed or removed is logged and the storage
//! change stands.

use super::extract::{extract_quote, ExtractedQuote};
use super::patterns::RuleSet;
use crate::db::{QuoteRecord, QuoteStore};
use crate::platform::{ChatMessage, ChatPlatform, Marker};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteState {
    /// No stored quote for the message.
    Untracked,
    /// A stored quote reflects the current message text.
    Matched,
    /// A moderator marked the message as not a quote.
    Excluded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Created,
    Updated,
    Unchanged,
    Deleted,
    NoMatch,
    /// Skipped because of the exclude marker. `removed_quote` is set when a
    /// previously stored quote was dropped.
    Excluded { removed_quote: bool },
}

/// Which path triggered the visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Message created or edited while the bot was watching.
    Live,
    /// Historical scan.
    Backfill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub state: QuoteState,
    pub action: ReconcileAction,
}

impl Reconciliation {
    fn new(state: QuoteState, action: ReconcileAction) -> Self {
        Self { state, action }
    }
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn QuoteStore>,
    platform: Arc<dyn ChatPlatform>,
    no_match_marker: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn QuoteStore>,
        platform: Arc<dyn ChatPlatform>,
        no_match_marker: Duration,
    ) -> Self {
        Self {
            store,
            platform,
            no_match_marker,
        }
    }

    /// Brings the stored quote and markers for `message` in line with its
    /// current text. Safe to repeat: an unchanged message ends in the same
    /// state without touching storage or markers again.
    pub async fn reconcile(
        &self,
        guild_id: u64,
        message: &ChatMessage,
        rules: &RuleSet,
        trigger: Trigger,
    ) -> anyhow::Result<Reconciliation> {
        if message.has_marker(Marker::Exclude) {
            return self.exclude(message, trigger).await;
        }

        let extracted = extract_quote(&message.content, rules);
        let existing = self.store.get_quote(message.id).await?;

        let result = match (extracted, existing) {
            (Some(quote), None) => {
                self.mark(message, Marker::InProgress).await;
                let record = QuoteRecord {
                    message_id: message.id,
                    guild_id,
                    author: quote.author,
                    content: quote.quote,
                };
                self.store.create_quote(&record).await?;
                info!("Quote created for message {} by '{}'", message.id, record.author);
                self.unmark(message, Marker::InProgress).await;
                self.mark(message, Marker::Success).await;
                Reconciliation::new(QuoteState::Matched, ReconcileAction::Created)
            }
            (Some(quote), Some(record)) if is_same(&quote, &record) => {
                if !message.has_own_marker(Marker::Success) {
                    self.mark(message, Marker::Success).await;
                }
                debug!("Quote for message {} unchanged", message.id);
                Reconciliation::new(QuoteState::Matched, ReconcileAction::Unchanged)
            }
            (Some(quote), Some(_)) => {
                self.mark(message, Marker::InProgress).await;
                self.store
                    .update_quote(message.id, &quote.quote, &quote.author)
                    .await?;
                info!("Quote updated for message {} by '{}'", message.id, quote.author);
                self.unmark(message, Marker::InProgress).await;
                if !message.has_own_marker(Marker::Success) {
                    self.mark(message, Marker::Success).await;
                }
                Reconciliation::new(QuoteState::Matched, ReconcileAction::Updated)
            }
            (None, Some(_)) => {
                self.store.delete_quote(message.id).await?;
                info!("Quote deleted for message {}: no longer matches", message.id);
                self.unmark(message, Marker::Success).await;
                self.flash_no_match(message);
                Reconciliation::new(QuoteState::Untracked, ReconcileAction::Deleted)
            }
            (None, None) => {
                debug!("No quote found in message {}", message.id);
                if message.has_own_marker(Marker::Success) {
                    self.unmark(message, Marker::Success).await;
                }
                self.flash_no_match(message);
                Reconciliation::new(QuoteState::Untracked, ReconcileAction::NoMatch)
            }
        };
        Ok(result)
    }

    /// Terminal removal for a message deleted on the platform.
    pub async fn forget(&self, message_id: u64) -> anyhow::Result<bool> {
        let removed = self.store.delete_quote(message_id).await?;
        if removed {
            info!("Quote deleted for removed message {}", message_id);
        }
        Ok(removed)
    }

    async fn exclude(
        &self,
        message: &ChatMessage,
        trigger: Trigger,
    ) -> anyhow::Result<Reconciliation> {
        let removed_quote = match trigger {
            // Live edits leave an existing quote alone.
            Trigger::Live => false,
            Trigger::Backfill => self.store.delete_quote(message.id).await?,
        };
        if removed_quote {
            info!("Quote deleted for excluded message {}", message.id);
            self.unmark(message, Marker::Success).await;
        } else {
            debug!("Message {} excluded", message.id);
        }
        Ok(Reconciliation::new(
            QuoteState::Excluded,
            ReconcileAction::Excluded { removed_quote },
        ))
    }

    async fn mark(&self, message: &ChatMessage, marker: Marker) {
        if let Err(e) = self
            .platform
            .add_marker(message.channel_id, message.id, marker)
            .await
        {
            warn!("Marker not applied: {:#}", e);
        }
    }

    async fn unmark(&self, message: &ChatMessage, marker: Marker) {
        if let Err(e) = self
            .platform
            .remove_marker(message.channel_id, message.id, marker)
            .await
        {
            warn!("Marker not removed: {:#}", e);
        }
    }

    /// Shows the no-match marker for a moment without holding up the caller.
    fn flash_no_match(&self, message: &ChatMessage) {
        let platform = self.platform.clone();
        let (channel_id, message_id) = (message.channel_id, message.id);
        let linger = self.no_match_marker;
        tokio::spawn(async move {
            if let Err(e) = platform
                .add_marker(channel_id, message_id, Marker::NoMatch)
                .await
            {
                warn!("Marker not applied: {:#}", e);
                return;
            }
            tokio::time::sleep(linger).await;
            if let Err(e) = platform
                .remove_marker(channel_id, message_id, Marker::NoMatch)
                .await
            {
                warn!("Marker not removed: {:#}", e);
            }
        });
    }
}

fn is_same(quote: &ExtractedQuote, record: &QuoteRecord) -> bool {
    quote.quote == record.content && quote.author == record.author
}
