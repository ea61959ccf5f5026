//! In-process chat platform used by the reconciliation and backfill tests.

use crate::platform::{ChatMessage, ChatPlatform, Marker, Reaction};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Holds one `add_marker` call open until released.
#[derive(Clone, Default)]
pub struct MarkerGate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl MarkerGate {
    /// Resolves once the held call has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Default)]
struct FakeState {
    messages: BTreeMap<u64, ChatMessage>,
    history_failures: usize,
    history_calls: usize,
    markers_fail: bool,
    marker_log: Vec<(u64, Marker, bool)>,
    success_marks: usize,
    cancel_after: Option<(usize, CancellationToken)>,
    marker_gate: Option<MarkerGate>,
}

#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages<'a>(messages: impl IntoIterator<Item = (u64, &'a str)>) -> Self {
        let platform = Self::new();
        for (id, content) in messages {
            platform.add_message(id, content);
        }
        platform
    }

    pub fn add_message(&self, id: u64, content: &str) -> ChatMessage {
        let message = ChatMessage {
            id,
            channel_id: 1,
            content: content.to_string(),
            author_is_bot: false,
            reactions: Vec::new(),
        };
        self.state
            .lock()
            .unwrap()
            .messages
            .insert(id, message.clone());
        message
    }

    pub fn edit_message(&self, id: u64, content: &str) {
        if let Some(message) = self.state.lock().unwrap().messages.get_mut(&id) {
            message.content = content.to_string();
        }
    }

    pub fn delete_message(&self, id: u64) {
        self.state.lock().unwrap().messages.remove(&id);
    }

    /// A reaction placed by someone other than the bot.
    pub fn react(&self, id: u64, emoji: &str) {
        if let Some(message) = self.state.lock().unwrap().messages.get_mut(&id) {
            message.reactions.push(Reaction {
                emoji: emoji.to_string(),
                me: false,
            });
        }
    }

    pub fn message(&self, id: u64) -> ChatMessage {
        self.state.lock().unwrap().messages[&id].clone()
    }

    pub fn own_markers(&self, id: u64) -> Vec<Marker> {
        let message = self.message(id);
        [
            Marker::Success,
            Marker::InProgress,
            Marker::NoMatch,
            Marker::Exclude,
        ]
        .into_iter()
        .filter(|m| message.has_own_marker(*m))
        .collect()
    }

    pub fn marker_adds(&self, id: u64, marker: Marker) -> usize {
        self.state
            .lock()
            .unwrap()
            .marker_log
            .iter()
            .filter(|(m, k, added)| *m == id && *k == marker && *added)
            .count()
    }

    pub fn fail_next_history(&self, count: usize) {
        self.state.lock().unwrap().history_failures = count;
    }

    pub fn history_calls(&self) -> usize {
        self.state.lock().unwrap().history_calls
    }

    pub fn fail_markers(&self, fail: bool) {
        self.state.lock().unwrap().markers_fail = fail;
    }

    /// The next `add_marker` call waits until the returned gate is released.
    pub fn hold_next_marker(&self) -> MarkerGate {
        let gate = MarkerGate::default();
        self.state.lock().unwrap().marker_gate = Some(gate.clone());
        gate
    }

    /// Cancels `token` once `count` success markers have been placed.
    pub fn cancel_after_successes(&self, count: usize, token: CancellationToken) {
        self.state.lock().unwrap().cancel_after = Some((count, token));
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn fetch_history(
        &self,
        _channel_id: u64,
        before: Option<u64>,
        limit: u8,
    ) -> anyhow::Result<Vec<ChatMessage>> {
        let mut state = self.state.lock().unwrap();
        state.history_calls += 1;
        if state.history_failures > 0 {
            state.history_failures -= 1;
            anyhow::bail!("gateway timeout");
        }
        let upper = before.unwrap_or(u64::MAX);
        Ok(state
            .messages
            .range(..upper)
            .rev()
            .take(limit as usize)
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn fetch_message(
        &self,
        _channel_id: u64,
        message_id: u64,
    ) -> anyhow::Result<Option<ChatMessage>> {
        Ok(self.state.lock().unwrap().messages.get(&message_id).cloned())
    }

    async fn add_marker(
        &self,
        _channel_id: u64,
        message_id: u64,
        marker: Marker,
    ) -> anyhow::Result<()> {
        let gate = self.state.lock().unwrap().marker_gate.take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let mut state = self.state.lock().unwrap();
        if state.markers_fail {
            anyhow::bail!("missing permissions");
        }
        let Some(message) = state.messages.get_mut(&message_id) else {
            anyhow::bail!("unknown message {}", message_id);
        };
        if !message.has_own_marker(marker) {
            message.reactions.push(Reaction {
                emoji: marker.emoji().to_string(),
                me: true,
            });
        }
        state.marker_log.push((message_id, marker, true));

        if marker == Marker::Success {
            state.success_marks += 1;
            if let Some((count, token)) = &state.cancel_after {
                if state.success_marks >= *count {
                    token.cancel();
                }
            }
        }
        Ok(())
    }

    async fn remove_marker(
        &self,
        _channel_id: u64,
        message_id: u64,
        marker: Marker,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.markers_fail {
            anyhow::bail!("missing permissions");
        }
        let Some(message) = state.messages.get_mut(&message_id) else {
            anyhow::bail!("unknown message {}", message_id);
        };
        message
            .reactions
            .retain(|r| !(r.me && marker.matches(&r.emoji)));
        state.marker_log.push((message_id, marker, false));
        Ok(())
    }
}
