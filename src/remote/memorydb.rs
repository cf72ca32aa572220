// remote/memorydb.rs
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::feed::{ChangeFeed, ChangeKind};
use crate::models::chatmodels::{
    ChatMessage, ChatSession, MessageType, SenderType, SessionPriority, SessionStatus,
};
use crate::remote::supportapi::{NewMessage, RemoteError, SupportApi};

/// In-process stand-in for the hosted backend: rows in two maps, change
/// events republished through the feed the way the real change feed would
/// deliver them. Doubles as the demo binary's backend and the test
/// backend; `set_fail_writes` simulates remote mutation failures.
pub struct MemoryBackend {
    sessions: Mutex<HashMap<Uuid, ChatSession>>,
    messages: Mutex<HashMap<Uuid, ChatMessage>>,
    feed: Arc<ChangeFeed>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new(feed: Arc<ChangeFeed>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            messages: Mutex::new(HashMap::new()),
            feed,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent mutation fail with `RemoteError::Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn write_guard(&self) -> Result<(), RemoteError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("simulated outage".into()));
        }
        Ok(())
    }

    fn publish_session(&self, kind: ChangeKind, session: &ChatSession) {
        match serde_json::to_value(session) {
            Ok(row) => self.feed.publish_session_row(kind, row),
            Err(e) => tracing::warn!("Failed to serialize session row: {}", e),
        }
    }

    fn publish_message(&self, kind: ChangeKind, message: &ChatMessage) {
        match serde_json::to_value(message) {
            Ok(row) => self.feed.publish_message_row(kind, row),
            Err(e) => tracing::warn!("Failed to serialize message row: {}", e),
        }
    }

    /// Seed a customer-created session in `waiting` state, as the
    /// customer-facing entry point would.
    pub fn create_waiting_session(
        &self,
        customer_name: &str,
        priority: SessionPriority,
        subject: Option<&str>,
    ) -> ChatSession {
        let now = Utc::now();
        let session = ChatSession {
            id: Uuid::new_v4(),
            customer_name: customer_name.to_string(),
            customer_email: Some(format!(
                "{}@example.com",
                customer_name.to_lowercase().replace(' ', ".")
            )),
            customer_ip: None,
            user_agent: None,
            referrer: None,
            subject: subject.map(|s| s.to_string()),
            status: SessionStatus::Waiting,
            priority,
            assigned_agent: None,
            started_at: now,
            last_activity_at: now,
            ended_at: None,
            created_at: now,
            updated_at: now,
        };

        self.sessions
            .lock()
            .unwrap()
            .insert(session.id, session.clone());
        self.publish_session(ChangeKind::Insert, &session);
        session
    }

    /// Change a session's priority, as an escalation rule or a customer
    /// bump would server-side.
    pub fn escalate_session(
        &self,
        session_id: Uuid,
        priority: SessionPriority,
    ) -> Result<ChatSession, RemoteError> {
        let updated = {
            let mut sessions = self.sessions.lock().unwrap();
            let session = sessions
                .get_mut(&session_id)
                .ok_or(RemoteError::SessionNotFound(session_id))?;
            session.priority = priority;
            session.updated_at = Utc::now();
            session.clone()
        };

        self.publish_session(ChangeKind::Update, &updated);
        Ok(updated)
    }

    /// Seed an inbound customer message and bump the session's activity.
    pub fn customer_message(
        &self,
        session_id: Uuid,
        content: &str,
    ) -> Result<ChatMessage, RemoteError> {
        // The customer has no account; their session id doubles as the
        // sender reference, as the customer-facing widget does it.
        let customer_ref = {
            let mut sessions = self.sessions.lock().unwrap();
            let session = sessions
                .get_mut(&session_id)
                .ok_or(RemoteError::SessionNotFound(session_id))?;
            session.last_activity_at = Utc::now();
            session.updated_at = session.last_activity_at;
            session.id
        };

        let message = ChatMessage {
            id: Uuid::new_v4(),
            session_id,
            sender_id: Some(customer_ref),
            sender_type: SenderType::Customer,
            message_type: MessageType::Text,
            content: content.to_string(),
            metadata: None,
            is_read: false,
            created_at: Utc::now(),
        };

        self.messages
            .lock()
            .unwrap()
            .insert(message.id, message.clone());
        self.publish_message(ChangeKind::Insert, &message);
        Ok(message)
    }
}

#[async_trait]
impl SupportApi for MemoryBackend {
    async fn fetch_open_sessions(&self) -> Result<Vec<ChatSession>, RemoteError> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions
            .values()
            .filter(|s| !s.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn fetch_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, RemoteError> {
        let messages = self.messages.lock().unwrap();
        let mut history: Vec<ChatMessage> = messages
            .values()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        history.sort_by_key(|m| m.sort_key());
        Ok(history)
    }

    async fn create_message(&self, draft: NewMessage) -> Result<ChatMessage, RemoteError> {
        self.write_guard()?;

        if draft.content.trim().is_empty() {
            return Err(RemoteError::Rejected("empty message content".into()));
        }
        if !self.sessions.lock().unwrap().contains_key(&draft.session_id) {
            return Err(RemoteError::SessionNotFound(draft.session_id));
        }

        let message = ChatMessage {
            id: Uuid::new_v4(),
            session_id: draft.session_id,
            sender_id: draft.sender_id,
            sender_type: draft.sender_type,
            message_type: draft.message_type,
            content: draft.content,
            metadata: draft.metadata,
            is_read: false,
            created_at: Utc::now(),
        };

        self.messages
            .lock()
            .unwrap()
            .insert(message.id, message.clone());
        self.publish_message(ChangeKind::Insert, &message);
        Ok(message)
    }

    async fn assign_session(
        &self,
        session_id: Uuid,
        agent_id: Uuid,
    ) -> Result<ChatSession, RemoteError> {
        self.write_guard()?;

        let updated = {
            let mut sessions = self.sessions.lock().unwrap();
            let session = sessions
                .get_mut(&session_id)
                .ok_or(RemoteError::SessionNotFound(session_id))?;

            if session.status.is_terminal() {
                return Err(RemoteError::Conflict(format!(
                    "session {} is already {}",
                    session_id,
                    session.status.to_str()
                )));
            }

            session.status = SessionStatus::Active;
            session.assigned_agent = Some(agent_id);
            session.last_activity_at = Utc::now();
            session.updated_at = session.last_activity_at;
            session.clone()
        };

        self.publish_session(ChangeKind::Update, &updated);
        Ok(updated)
    }

    async fn close_session(&self, session_id: Uuid) -> Result<ChatSession, RemoteError> {
        self.write_guard()?;

        let updated = {
            let mut sessions = self.sessions.lock().unwrap();
            let session = sessions
                .get_mut(&session_id)
                .ok_or(RemoteError::SessionNotFound(session_id))?;

            if session.status != SessionStatus::Resolved {
                session.status = SessionStatus::Resolved;
                session.ended_at = Some(Utc::now());
                session.updated_at = Utc::now();
            }
            session.clone()
        };

        self.publish_session(ChangeKind::Update, &updated);
        Ok(updated)
    }

    async fn mark_messages_read(&self, message_ids: Vec<Uuid>) -> Result<(), RemoteError> {
        self.write_guard()?;

        let mut updated = Vec::new();
        {
            let mut messages = self.messages.lock().unwrap();
            for id in message_ids {
                if let Some(message) = messages.get_mut(&id) {
                    if !message.is_read {
                        message.is_read = true;
                        updated.push(message.clone());
                    }
                }
            }
        }

        for message in &updated {
            self.publish_message(ChangeKind::Update, message);
        }
        Ok(())
    }
}
