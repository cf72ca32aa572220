// models/chatmodels.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    Active,
    Resolved,
    Abandoned,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Resolved | SessionStatus::Abandoned)
    }

    /// Allowed transitions: waiting -> active -> resolved, or waiting -> abandoned.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (*self, next),
            (SessionStatus::Waiting, SessionStatus::Active)
                | (SessionStatus::Waiting, SessionStatus::Abandoned)
                | (SessionStatus::Active, SessionStatus::Resolved)
        )
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            SessionStatus::Waiting => "waiting",
            SessionStatus::Active => "active",
            SessionStatus::Resolved => "resolved",
            SessionStatus::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl SessionPriority {
    /// Sort weight, higher is more pressing.
    pub fn rank(&self) -> u8 {
        match self {
            SessionPriority::Low => 0,
            SessionPriority::Medium => 1,
            SessionPriority::High => 2,
            SessionPriority::Urgent => 3,
        }
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            SessionPriority::Low => "low",
            SessionPriority::Medium => "medium",
            SessionPriority::High => "high",
            SessionPriority::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    Customer,
    Agent,
    System,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    File,
    Image,
    System,
}

#[derive(Debug, Error)]
pub enum RowError {
    #[error("Malformed row: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Row violates invariant: {0}")]
    Invariant(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSession {
    pub id: Uuid,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub subject: Option<String>,
    pub status: SessionStatus,
    pub priority: SessionPriority,
    pub assigned_agent: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Normalize a raw backend row into a typed session. Rows carrying
    /// unknown status/priority values or breaking the lifecycle invariants
    /// are rejected here instead of leaking loosely-typed records inward.
    pub fn from_row(row: serde_json::Value) -> Result<Self, RowError> {
        let session: ChatSession = serde_json::from_value(row)?;

        if session.status == SessionStatus::Active && session.assigned_agent.is_none() {
            return Err(RowError::Invariant(format!(
                "active session {} has no assigned agent",
                session.id
            )));
        }
        if session.status.is_terminal() != session.ended_at.is_some() {
            return Err(RowError::Invariant(format!(
                "session {} is {} but ended_at is {}",
                session.id,
                session.status.to_str(),
                if session.ended_at.is_some() { "set" } else { "unset" },
            )));
        }

        Ok(session)
    }

    /// Case-insensitive match against customer name, email and subject.
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        if term.is_empty() {
            return true;
        }

        self.customer_name.to_lowercase().contains(&term)
            || self
                .customer_email
                .as_deref()
                .map(|e| e.to_lowercase().contains(&term))
                .unwrap_or(false)
            || self
                .subject
                .as_deref()
                .map(|s| s.to_lowercase().contains(&term))
                .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub sender_type: SenderType,
    pub message_type: MessageType,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn from_row(row: serde_json::Value) -> Result<Self, RowError> {
        let message: ChatMessage = serde_json::from_value(row)?;
        Ok(message)
    }

    /// Ordering is ascending creation time, ties broken by id, so merged
    /// caches sort identically no matter the arrival order.
    pub fn sort_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.created_at, self.id)
    }
}
