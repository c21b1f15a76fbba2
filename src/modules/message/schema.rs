use serde::{Deserialize, Serialize};
use sqlx::prelude::{FromRow, Type};

use crate::api::error::ValidationError;
use crate::modules::user::schema::UserSummary;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Type, Serialize, Deserialize)]
#[sqlx(type_name = "message_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Direct,
    Broadcast,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Type, Serialize, Deserialize)]
#[sqlx(type_name = "message_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    /// Reserved. Stored rows may carry it but no transition produces it.
    Failed,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MessageEntity {
    pub id: i64,
    pub sender_id: i64,
    pub recipient_id: Option<i64>,
    pub content: String,
    pub media_url: Option<String>,
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub sent_at: chrono::DateTime<chrono::Utc>,
    pub delivered_at: Option<chrono::DateTime<chrono::Utc>>,
    pub read_at: Option<chrono::DateTime<chrono::Utc>>,
    #[sqlx(skip)]
    pub sender: Option<UserSummary>,
    #[sqlx(skip)]
    pub recipients: Vec<i64>,
}

impl MessageEntity {
    pub fn is_broadcast(&self) -> bool {
        self.message_type == MessageType::Broadcast
    }

    pub fn has_media(&self) -> bool {
        self.media_url.as_deref().is_some_and(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MessageRecipientEntity {
    pub message_id: i64,
    pub user_id: i64,
    pub received_at: chrono::DateTime<chrono::Utc>,
    pub read_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl MessageRecipientEntity {
    pub fn new(
        message_id: i64,
        user_id: i64,
        received_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Self, ValidationError> {
        if message_id <= 0 || user_id <= 0 {
            return Err(ValidationError::MissingIds);
        }
        Ok(MessageRecipientEntity { message_id, user_id, received_at, read_at: None })
    }
}
