//! Resumable history scan over a guild's quote channel.

use super::patterns::RuleSet;
use super::reconcile::{ReconcileAction, Reconciler, Trigger};
use crate::db::QuoteStore;
use crate::platform::{ChatMessage, ChatPlatform};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct BackfillRequest {
    pub guild_id: u64,
    pub channel_id: u64,
    /// Maximum number of messages to visit in this run.
    pub limit: usize,
    pub rules: RuleSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Reached the oldest message in the channel.
    Exhausted,
    LimitReached,
    Cancelled,
    /// A page could not be fetched or progress could not be saved.
    Halted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillReport {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub excluded: usize,
    pub unmatched: usize,
    pub failed: usize,
    /// Cursor after the run, `None` if nothing was ever committed.
    pub cursor: Option<u64>,
    pub outcome: ScanOutcome,
}

impl BackfillReport {
    fn starting_at(cursor: Option<u64>) -> Self {
        Self {
            processed: 0,
            created: 0,
            updated: 0,
            unchanged: 0,
            deleted: 0,
            excluded: 0,
            unmatched: 0,
            failed: 0,
            cursor,
            outcome: ScanOutcome::LimitReached,
        }
    }

    fn record(&mut self, action: ReconcileAction) {
        match action {
            ReconcileAction::Created => self.created += 1,
            ReconcileAction::Updated => self.updated += 1,
            ReconcileAction::Unchanged => self.unchanged += 1,
            ReconcileAction::Deleted => {
                self.deleted += 1;
                self.unmatched += 1;
            }
            ReconcileAction::NoMatch => self.unmatched += 1,
            ReconcileAction::Excluded { removed_quote } => {
                self.excluded += 1;
                if removed_quote {
                    self.deleted += 1;
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct BackfillScanner {
    reconciler: Reconciler,
    store: Arc<dyn QuoteStore>,
    platform: Arc<dyn ChatPlatform>,
    page_size: u8,
    page_delay: Duration,
}

impl BackfillScanner {
    pub fn new(
        reconciler: Reconciler,
        store: Arc<dyn QuoteStore>,
        platform: Arc<dyn ChatPlatform>,
        page_size: u8,
        page_delay: Duration,
    ) -> Self {
        Self {
            reconciler,
            store,
            platform,
            page_size: page_size.max(1),
            page_delay,
        }
    }

    /// Walks the channel backwards from the stored cursor, newest first,
    /// committing the cursor after every visited message.
    ///
    /// Per-message failures are counted and skipped. Only storage errors
    /// before the first page is fetched are returned as `Err`.
    pub async fn run(
        &self,
        request: BackfillRequest,
        cancel: CancellationToken,
    ) -> anyhow::Result<BackfillReport> {
        let config = self
            .store
            .get_or_create_guild_config(request.guild_id)
            .await?;
        let mut before = config.backfill_cursor;
        let mut report = BackfillReport::starting_at(before);

        info!(
            "Backfill started for guild {} in channel {} (limit {}, cursor {:?})",
            request.guild_id, request.channel_id, request.limit, before
        );

        'pages: while report.processed < request.limit {
            if cancel.is_cancelled() {
                report.outcome = ScanOutcome::Cancelled;
                break;
            }

            let wanted = (request.limit - report.processed).min(self.page_size as usize) as u8;
            let page = match self.fetch_page(&request, before, wanted, &cancel).await {
                Some(page) => page,
                None if cancel.is_cancelled() => {
                    report.outcome = ScanOutcome::Cancelled;
                    break;
                }
                None => {
                    report.outcome = ScanOutcome::Halted;
                    break;
                }
            };
            if page.is_empty() {
                report.outcome = ScanOutcome::Exhausted;
                break;
            }
            let short_page = page.len() < wanted as usize;
            debug!("Backfill page of {} messages before {:?}", page.len(), before);

            for message in page {
                if cancel.is_cancelled() {
                    report.outcome = ScanOutcome::Cancelled;
                    break 'pages;
                }

                self.visit(&request, &message, &mut report).await;
                report.processed += 1;
                before = Some(message.id);

                match self
                    .store
                    .advance_backfill_cursor(request.guild_id, message.id)
                    .await
                {
                    Ok(_) => report.cursor = Some(message.id),
                    Err(e) => {
                        error!("Backfill cursor for guild {} not saved: {:#}", request.guild_id, e);
                        report.outcome = ScanOutcome::Halted;
                        break 'pages;
                    }
                }
            }

            if short_page {
                report.outcome = ScanOutcome::Exhausted;
                break;
            }
            if report.processed < request.limit && !self.pause(&cancel).await {
                report.outcome = ScanOutcome::Cancelled;
                break;
            }
        }

        info!(
            "Backfill finished for guild {}: {:?}, {} processed, {} created, {} updated, {} deleted, {} failed",
            request.guild_id,
            report.outcome,
            report.processed,
            report.created,
            report.updated,
            report.deleted,
            report.failed
        );
        Ok(report)
    }

    async fn visit(&self, request: &BackfillRequest, message: &ChatMessage, report: &mut BackfillReport) {
        if message.author_is_bot {
            return;
        }
        match self
            .reconciler
            .reconcile(request.guild_id, message, &request.rules, Trigger::Backfill)
            .await
        {
            Ok(result) => report.record(result.action),
            Err(e) => {
                error!("Skipping message {} during backfill: {:#}", message.id, e);
                report.failed += 1;
            }
        }
    }

    /// One page of history, retried once after the page delay. `None` when
    /// both attempts failed or the scan was cancelled while waiting.
    async fn fetch_page(
        &self,
        request: &BackfillRequest,
        before: Option<u64>,
        limit: u8,
        cancel: &CancellationToken,
    ) -> Option<Vec<ChatMessage>> {
        match self
            .platform
            .fetch_history(request.channel_id, before, limit)
            .await
        {
            Ok(page) => return Some(page),
            Err(e) => warn!("History page fetch failed, retrying once: {:#}", e),
        }

        if !self.pause(cancel).await {
            return None;
        }
        match self
            .platform
            .fetch_history(request.channel_id, before, limit)
            .await
        {
            Ok(page) => Some(page),
            Err(e) => {
                error!(
                    "History page fetch failed again, halting backfill for guild {}: {:#}",
                    request.guild_id, e
                );
                None
            }
        }
    }

    /// Sleeps for the page delay. Returns `false` if cancelled meanwhile.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.page_delay) => true,
        }
    }
}
