// service/error.rs
use thiserror::Error;
use uuid::Uuid;

use crate::models::chatmodels::SessionStatus;
use crate::remote::supportapi::RemoteError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Session {0} not found")]
    SessionNotFound(Uuid),

    #[error("Session {session_id} is already handled by agent {agent_id}")]
    AlreadyAssigned { session_id: Uuid, agent_id: Uuid },

    #[error("Session cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to send message to session {0}")]
    SendFailed(Uuid),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
}
