use super::scans::ScanRegistry;
use crate::cache::RuleCache;
use crate::config::Config;
use crate::db::{GuildConfig, QuoteRecord, QuoteStore};
use crate::error::QuoteError;
use crate::platform::{ChatMessage, ChatPlatform, Marker};
use crate::quotes::{
    BackfillReport, BackfillRequest, BackfillScanner, Reconciler, Reconciliation, Trigger,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Compiled custom rules kept around at once.
const RULE_CACHE_CAPACITY: usize = 64;

/// Snapshot for `/guildinfo`.
#[derive(Debug, Clone)]
pub struct GuildInfo {
    pub config: GuildConfig,
    pub quote_count: usize,
    pub scanning: bool,
}

/// A backfill started in the background.
pub struct ScanHandle {
    pub cancel: CancellationToken,
    /// Resolves to `None` if the scan failed before reading any history.
    pub task: JoinHandle<Option<BackfillReport>>,
}

/// Entry points for everything the event handler and commands do with quotes.
#[derive(Clone)]
pub struct QuoteService {
    store: Arc<dyn QuoteStore>,
    platform: Arc<dyn ChatPlatform>,
    rules: RuleCache,
    reconciler: Reconciler,
    scanner: BackfillScanner,
    scans: ScanRegistry,
    default_scan_limit: usize,
}

impl QuoteService {
    pub fn new(config: &Config, store: Arc<dyn QuoteStore>, platform: Arc<dyn ChatPlatform>) -> Self {
        let reconciler = Reconciler::new(
            store.clone(),
            platform.clone(),
            config.no_match_marker_duration,
        );
        let scanner = BackfillScanner::new(
            reconciler.clone(),
            store.clone(),
            platform.clone(),
            config.scan_page_size,
            config.scan_page_delay,
        );
        Self {
            store,
            platform,
            rules: RuleCache::new(RULE_CACHE_CAPACITY),
            reconciler,
            scanner,
            scans: ScanRegistry::new(),
            default_scan_limit: config.default_scan_limit,
        }
    }

    pub fn default_scan_limit(&self) -> usize {
        self.default_scan_limit
    }

    /// Quote channel for the guild, if configured.
    async fn watched_config(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<Option<GuildConfig>> {
        Ok(self
            .store
            .get_guild_config(guild_id)
            .await?
            .filter(|c| c.is_quote_channel(channel_id)))
    }

    // --- Live events ---

    /// A new message. `None` when it is outside the quote channel or
    /// written by a bot.
    pub async fn handle_message(
        &self,
        guild_id: u64,
        message: &ChatMessage,
    ) -> anyhow::Result<Option<Reconciliation>> {
        if message.author_is_bot {
            return Ok(None);
        }
        let Some(config) = self.watched_config(guild_id, message.channel_id).await? else {
            return Ok(None);
        };
        let rules = self.rules.rules_for(&config);
        let result = self
            .reconciler
            .reconcile(guild_id, message, &rules, Trigger::Live)
            .await?;
        Ok(Some(result))
    }

    /// An edit. The message is fetched again so content and reactions are
    /// current.
    pub async fn handle_edit(
        &self,
        guild_id: u64,
        channel_id: u64,
        message_id: u64,
    ) -> anyhow::Result<Option<Reconciliation>> {
        if self.watched_config(guild_id, channel_id).await?.is_none() {
            return Ok(None);
        }
        match self.platform.fetch_message(channel_id, message_id).await? {
            Some(message) => self.handle_message(guild_id, &message).await,
            None => {
                self.reconciler.forget(message_id).await?;
                Ok(None)
            }
        }
    }

    pub async fn handle_delete(&self, message_id: u64) -> anyhow::Result<bool> {
        self.reconciler.forget(message_id).await
    }

    pub async fn guild_joined(&self, guild_id: u64) -> anyhow::Result<GuildConfig> {
        let config = self.store.get_or_create_guild_config(guild_id).await?;
        info!("Joined guild {}", guild_id);
        Ok(config)
    }

    /// Drops the guild's settings and, with them, its quotes.
    pub async fn guild_left(&self, guild_id: u64) -> anyhow::Result<()> {
        self.scans.stop_and_wait(guild_id).await;
        self.store.delete_guild_config(guild_id).await?;
        info!("Left guild {}, settings and quotes removed", guild_id);
        Ok(())
    }

    // --- Settings ---

    /// Points the guild at a new quote channel. Switching channels forgets the
    /// backfill progress and stops a scan of the old channel.
    pub async fn set_quote_channel(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> Result<GuildConfig, QuoteError> {
        let mut config = self.store.get_or_create_guild_config(guild_id).await?;
        let changed = config.quote_channel_id != Some(channel_id);
        if changed {
            // The old channel's scan must be done before its cursor is dropped.
            self.scans.stop_and_wait(guild_id).await;
        }
        config.quote_channel_id = Some(channel_id);
        self.store.save_guild_config(&config).await?;

        if changed {
            self.store.reset_backfill_cursor(guild_id).await?;
            config.backfill_cursor = None;
            info!("Quote channel for guild {} set to {}", guild_id, channel_id);
        }
        Ok(config)
    }

    pub async fn set_custom_pattern(
        &self,
        guild_id: u64,
        pattern: &str,
        reversed: bool,
    ) -> Result<GuildConfig, QuoteError> {
        self.rules.get_or_compile(pattern, reversed)?;

        let mut config = self.store.get_or_create_guild_config(guild_id).await?;
        config.custom_pattern = Some(pattern.to_string());
        config.custom_pattern_reversed = reversed;
        self.store.save_guild_config(&config).await?;
        info!("Custom pattern for guild {} set to {:?}", guild_id, pattern);
        Ok(config)
    }

    pub async fn clear_custom_pattern(&self, guild_id: u64) -> Result<GuildConfig, QuoteError> {
        let mut config = self.store.get_or_create_guild_config(guild_id).await?;
        config.custom_pattern = None;
        config.custom_pattern_reversed = false;
        self.store.save_guild_config(&config).await?;
        Ok(config)
    }

    // --- Scans ---

    /// Starts a background backfill from the stored cursor.
    pub async fn start_scan(&self, guild_id: u64, limit: Option<usize>) -> Result<ScanHandle, QuoteError> {
        let config = self.store.get_or_create_guild_config(guild_id).await?;
        let channel_id = config.quote_channel_id.ok_or(QuoteError::NoQuoteChannel)?;
        let guard = self
            .scans
            .try_register(guild_id)
            .ok_or(QuoteError::ScanAlreadyRunning)?;
        let cancel = guard.token();

        let request = BackfillRequest {
            guild_id,
            channel_id,
            limit: limit.unwrap_or(self.default_scan_limit),
            rules: self.rules.rules_for(&config),
        };
        let scanner = self.scanner.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            match scanner.run(request, token).await {
                Ok(report) => Some(report),
                Err(e) => {
                    error!("Backfill for guild {} failed: {:#}", guild_id, e);
                    None
                }
            }
        });

        Ok(ScanHandle { cancel, task })
    }

    pub fn stop_scan(&self, guild_id: u64) -> bool {
        let stopped = self.scans.stop(guild_id);
        if stopped {
            info!("Stopping backfill for guild {}", guild_id);
        }
        stopped
    }

    pub fn is_scanning(&self, guild_id: u64) -> bool {
        self.scans.is_running(guild_id)
    }

    // --- Quotes ---

    /// Removes every quote of the guild and resets the backfill so the channel
    /// can be scanned from scratch. A running scan is stopped and waited for
    /// first. Returns the number of removed quotes.
    pub async fn clear_all(&self, guild_id: u64) -> Result<usize, QuoteError> {
        self.scans.stop_and_wait(guild_id).await;
        let config = self.store.get_or_create_guild_config(guild_id).await?;

        if let Some(channel_id) = config.quote_channel_id {
            for quote in self.store.list_quotes(guild_id).await? {
                if let Err(e) = self
                    .platform
                    .remove_marker(channel_id, quote.message_id, Marker::Success)
                    .await
                {
                    warn!("Marker not removed while clearing: {:#}", e);
                }
            }
        }

        let removed = self.store.delete_all_quotes(guild_id).await?;
        self.store.reset_backfill_cursor(guild_id).await?;
        info!("Cleared {} quotes for guild {}", removed, guild_id);
        Ok(removed)
    }

    pub async fn quote_channel(&self, guild_id: u64) -> Result<Option<u64>, QuoteError> {
        Ok(self
            .store
            .get_guild_config(guild_id)
            .await?
            .and_then(|c| c.quote_channel_id))
    }

    pub async fn random_quote(&self, guild_id: u64) -> Result<QuoteRecord, QuoteError> {
        self.store
            .random_quote(guild_id)
            .await?
            .ok_or(QuoteError::NoQuotes)
    }

    /// Drops a quote flagged as not being one. The source message loses its
    /// success marker when it can still be reached.
    pub async fn delete_quote(&self, guild_id: u64, message_id: u64) -> Result<bool, QuoteError> {
        let removed = self.store.delete_quote(message_id).await?;
        if !removed {
            return Ok(false);
        }
        info!("Quote {} removed by request", message_id);

        if let Some(channel_id) = self
            .store
            .get_guild_config(guild_id)
            .await?
            .and_then(|c| c.quote_channel_id)
        {
            if let Err(e) = self
                .platform
                .remove_marker(channel_id, message_id, Marker::Success)
                .await
            {
                warn!("Marker not removed: {:#}", e);
            }
        }
        Ok(true)
    }

    pub async fn guild_info(&self, guild_id: u64) -> Result<GuildInfo, QuoteError> {
        let config = self.store.get_or_create_guild_config(guild_id).await?;
        let quote_count = self.store.count_quotes(guild_id).await?;
        Ok(GuildInfo {
            config,
            quote_count,
            scanning: self.scans.is_running(guild_id),
        })
    }
}
