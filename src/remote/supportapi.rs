// remote/supportapi.rs
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::chatmodels::{ChatMessage, ChatSession, MessageType, SenderType};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Session {0} not found")]
    SessionNotFound(Uuid),

    #[error("Conflicting update: {0}")]
    Conflict(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend rejected the request: {0}")]
    Rejected(String),
}

/// Draft of a message about to be created remotely. The server assigns the
/// definitive id and creation timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub sender_type: SenderType,
    pub message_type: MessageType,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
}

/// Boundary to the hosted backend. Point reads and mutations over the
/// session and message collections; realtime delivery arrives separately
/// through the change feed.
#[async_trait]
pub trait SupportApi: Send + Sync {
    /// All sessions currently in a non-terminal status.
    async fn fetch_open_sessions(&self) -> Result<Vec<ChatSession>, RemoteError>;

    /// Full message history of one session, ascending by creation time.
    async fn fetch_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, RemoteError>;

    /// Persist a message and return the server-assigned record.
    async fn create_message(&self, draft: NewMessage) -> Result<ChatMessage, RemoteError>;

    /// Claim a waiting session for an agent.
    async fn assign_session(
        &self,
        session_id: Uuid,
        agent_id: Uuid,
    ) -> Result<ChatSession, RemoteError>;

    /// Resolve a session and stamp its end time.
    async fn close_session(&self, session_id: Uuid) -> Result<ChatSession, RemoteError>;

    /// Bulk-set the read flag on a set of messages.
    async fn mark_messages_read(&self, message_ids: Vec<Uuid>) -> Result<(), RemoteError>;
}
