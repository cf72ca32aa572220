// service/stream_service.rs
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use uuid::Uuid;
use validator::Validate;

use crate::dtos::chatdtos::{MarkReadDto, SendMessageDto};
use crate::feed::{next_event, ChangeFeed, ChangeKind, FeedEvent};
use crate::models::chatmodels::{ChatMessage, MessageType, SenderType};
use crate::remote::supportapi::{NewMessage, SupportApi};
use crate::service::directory_service::SessionDirectory;
use crate::service::error::ServiceError;

#[derive(Default)]
struct StreamState {
    /// The session whose conversation panel is open, if any.
    current: Option<Uuid>,
    /// Ordered histories, keyed by session id. A send completing after the
    /// agent switched sessions still lands in its own slot.
    histories: HashMap<Uuid, Vec<ChatMessage>>,
    /// Placeholder ids of optimistic sends not yet reconciled, per session.
    pending: HashMap<Uuid, HashSet<Uuid>>,
}

/// Ordered message history for the open session, with optimistic send and
/// id-deduplicated reconciliation against the mutation response and the
/// change-feed echo.
pub struct MessageStream {
    remote: Arc<dyn SupportApi>,
    feed: Arc<ChangeFeed>,
    directory: Arc<SessionDirectory>,
    refresh_every: Duration,
    state: RwLock<StreamState>,
}

impl MessageStream {
    pub fn new(
        remote: Arc<dyn SupportApi>,
        feed: Arc<ChangeFeed>,
        directory: Arc<SessionDirectory>,
        refresh_every: Duration,
    ) -> Self {
        Self {
            remote,
            feed,
            directory,
            refresh_every,
            state: RwLock::new(StreamState::default()),
        }
    }

    /// Open a session's conversation and load its history. A failed fetch
    /// degrades to whatever is cached.
    pub async fn open(&self, session_id: Uuid) -> Vec<ChatMessage> {
        self.state.write().await.current = Some(session_id);
        self.reload(session_id).await;
        self.messages(session_id).await
    }

    /// Drop the open-session marker. Caches stay; the stream has no
    /// terminal state of its own.
    pub async fn detach(&self) {
        self.state.write().await.current = None;
    }

    pub async fn current(&self) -> Option<Uuid> {
        self.state.read().await.current
    }

    pub async fn messages(&self, session_id: Uuid) -> Vec<ChatMessage> {
        self.state
            .read()
            .await
            .histories
            .get(&session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn unread_count(&self, session_id: Uuid) -> usize {
        self.state
            .read()
            .await
            .histories
            .get(&session_id)
            .map(|history| {
                history
                    .iter()
                    .filter(|m| m.sender_type == SenderType::Customer && !m.is_read)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Refetch one session's history and merge it over the cache, keeping
    /// unreconciled placeholders alive.
    pub async fn reload(&self, session_id: Uuid) {
        match self.remote.fetch_messages(session_id).await {
            Ok(fetched) => {
                let mut state = self.state.write().await;
                let mut merged = fetched;

                if let Some(pending) = state.pending.get(&session_id) {
                    if let Some(history) = state.histories.get(&session_id) {
                        for message in history {
                            if pending.contains(&message.id)
                                && !merged.iter().any(|m| m.id == message.id)
                            {
                                merged.push(message.clone());
                            }
                        }
                    }
                }

                merged.sort_by_key(|m| m.sort_key());
                state.histories.insert(session_id, merged);
            }
            Err(e) => {
                tracing::warn!(
                    "Message reload for session {} failed, keeping cached history: {}",
                    session_id,
                    e
                );
            }
        }
    }

    /// Optimistic send: a placeholder with a random local id appears in the
    /// history immediately; the server echo replaces it through whichever
    /// channel confirms first. A remote failure removes the placeholder and
    /// surfaces a send-failed error. No automatic retry.
    pub async fn send(&self, session_id: Uuid, dto: SendMessageDto) -> Result<(), ServiceError> {
        let content = dto.content.trim().to_string();
        if content.is_empty() {
            // The composer's disabled state is the real guard.
            return Ok(());
        }
        dto.validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        let agent = self.directory.agent().clone();
        let placeholder = ChatMessage {
            id: Uuid::new_v4(),
            session_id,
            sender_id: Some(agent.id),
            sender_type: SenderType::Agent,
            message_type: MessageType::Text,
            content: content.clone(),
            metadata: None,
            is_read: false,
            created_at: Utc::now(),
        };
        let placeholder_id = placeholder.id;

        {
            let mut state = self.state.write().await;
            let history = state.histories.entry(session_id).or_default();
            history.push(placeholder);
            history.sort_by_key(|m| m.sort_key());
            state
                .pending
                .entry(session_id)
                .or_default()
                .insert(placeholder_id);
        }
        self.directory.touch_activity(session_id).await;

        let draft = NewMessage {
            session_id,
            sender_id: Some(agent.id),
            sender_type: SenderType::Agent,
            message_type: MessageType::Text,
            content,
            metadata: None,
        };

        match self.remote.create_message(draft).await {
            Ok(confirmed) => {
                // Swap placeholder for the echo under one lock so the
                // history never holds zero or two copies of the message.
                let mut state = self.state.write().await;
                if let Some(pending) = state.pending.get_mut(&session_id) {
                    pending.remove(&placeholder_id);
                }
                if let Some(history) = state.histories.get_mut(&session_id) {
                    history.retain(|m| m.id != placeholder_id);
                    if let Some(existing) = history.iter_mut().find(|m| m.id == confirmed.id) {
                        *existing = confirmed;
                    } else {
                        history.push(confirmed);
                    }
                    history.sort_by_key(|m| m.sort_key());
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Send to session {} failed: {}", session_id, e);
                let mut state = self.state.write().await;
                if let Some(pending) = state.pending.get_mut(&session_id) {
                    pending.remove(&placeholder_id);
                }
                if let Some(history) = state.histories.get_mut(&session_id) {
                    history.retain(|m| m.id != placeholder_id);
                }
                Err(ServiceError::SendFailed(session_id))
            }
        }
    }

    /// Flag customer messages as read. Fire-and-forget: a remote failure
    /// is logged and the flags converge on the next reload.
    pub async fn mark_read(&self, session_id: Uuid, dto: &MarkReadDto) {
        let targets: Vec<Uuid> = {
            let state = self.state.read().await;
            match state.histories.get(&session_id) {
                Some(history) => history
                    .iter()
                    .filter(|m| {
                        m.sender_type == SenderType::Customer
                            && !m.is_read
                            && dto.message_ids.contains(&m.id)
                    })
                    .map(|m| m.id)
                    .collect(),
                None => Vec::new(),
            }
        };
        if targets.is_empty() {
            return;
        }

        match self.remote.mark_messages_read(targets.clone()).await {
            Ok(()) => {
                let mut state = self.state.write().await;
                if let Some(history) = state.histories.get_mut(&session_id) {
                    for message in history.iter_mut() {
                        if targets.contains(&message.id) {
                            message.is_read = true;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Mark-read for session {} failed: {}", session_id, e);
            }
        }
    }

    /// Reduce one feed event into the cached histories. Upserts dedupe by
    /// id; a pushed record that already exists replaces the stored fields
    /// wholesale. Sessions without a cache entry are skipped — their
    /// history is built on first open.
    pub async fn apply_event(&self, event: &FeedEvent) {
        let FeedEvent::Message { kind, message } = event else {
            return;
        };

        let mut state = self.state.write().await;
        let Some(history) = state.histories.get_mut(&message.session_id) else {
            return;
        };

        match kind {
            ChangeKind::Insert | ChangeKind::Update => {
                if let Some(existing) = history.iter_mut().find(|m| m.id == message.id) {
                    *existing = message.clone();
                } else {
                    history.push(message.clone());
                }
                history.sort_by_key(|m| m.sort_key());
            }
            ChangeKind::Delete => {
                history.retain(|m| m.id != message.id);
            }
        }
    }

    /// Feed/poll loop. The short interval refetch keeps delivery latency
    /// bounded for the open session even when the feed goes quiet.
    pub async fn run_forever(self: Arc<Self>, shutdown: impl std::future::Future<Output = ()>) {
        let mut rx = Some(self.feed.subscribe());
        let mut tick = interval(self.refresh_every);
        let mut shutdown = Box::pin(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("MessageStream: shutdown requested, exiting loop");
                    break;
                }
                _ = tick.tick() => {
                    let current = self.current().await;
                    if let Some(session_id) = current {
                        self.reload(session_id).await;
                    }
                }
                event = next_event(&mut rx) => {
                    if let Some(event) = event {
                        self.apply_event(&event).await;
                    }
                }
            }
        }
    }
}
