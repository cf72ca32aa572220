// dtos/chatdtos.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SendMessageDto {
    #[validate(length(max = 2000, message = "Message must be at most 2000 characters"))]
    pub content: String,
}

impl SendMessageDto {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionQuery {
    pub search: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkReadDto {
    pub message_ids: Vec<Uuid>,
}
