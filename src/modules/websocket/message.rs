/// WebSocket message protocol
///
/// Frames exchanged between connected clients and the server. Every frame
/// is a JSON object tagged by its `type` field.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::modules::message::schema::{MessageEntity, MessageStatus, MessageType};

/// Frames sent by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Application level keep-alive
    Ping,

    /// The client received a message
    #[serde(rename_all = "camelCase")]
    Delivered { message_id: i64 },

    /// The client displayed a message to its user
    #[serde(rename_all = "camelCase")]
    Read { message_id: i64 },
}

/// Frames sent by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// A message addressed to the receiving user
    Message { payload: MessagePayload },

    /// Reply to a client `ping`
    Pong,

    #[serde(rename_all = "camelCase")]
    Error { message: String },
}

/// Wire form of a persisted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: i64,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub sender_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<i64>,
    pub sent_at: DateTime<Utc>,
}

impl MessagePayload {
    /// The payload a broadcast recipient sees: addressed to them alone.
    pub fn for_recipient(&self, user_id: i64) -> Self {
        MessagePayload { recipient_id: Some(user_id), ..self.clone() }
    }
}

impl From<&MessageEntity> for MessagePayload {
    fn from(message: &MessageEntity) -> Self {
        MessagePayload {
            id: message.id,
            content: message.content.clone(),
            media_url: if message.has_media() { message.media_url.clone() } else { None },
            message_type: message.message_type,
            status: message.status,
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            sent_at: message.sent_at,
        }
    }
}

impl ServerMessage {
    pub fn message(payload: MessagePayload) -> Self {
        ServerMessage::Message { payload }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error { message: message.into() }
    }
}
