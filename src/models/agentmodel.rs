// models/agentmodel.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The acting support agent, as supplied by the hosting application's auth
/// context. Stamped onto sent messages and session assignments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentProfile {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

impl AgentProfile {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: None,
            avatar_url: None,
        }
    }
}
