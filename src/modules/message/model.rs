use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::api::error::ValidationError;
use crate::modules::message::schema::{MessageStatus, MessageType};
use crate::modules::message::validation::validate;

/// A candidate message that has passed validation and may be persisted.
///
/// Fields stay public so tests can assemble malformed candidates, but the
/// service only ever builds one through [`NewMessage::direct`] or
/// [`NewMessage::broadcast`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender_id: i64,
    pub recipient_id: Option<i64>,
    pub recipients: Vec<i64>,
    pub content: String,
    pub media_url: Option<String>,
    pub message_type: MessageType,
}

impl NewMessage {
    pub fn direct(
        sender_id: i64,
        recipient_id: i64,
        content: String,
        media_url: Option<String>,
    ) -> Result<Self, ValidationError> {
        let candidate = NewMessage {
            sender_id,
            recipient_id: Some(recipient_id),
            recipients: Vec::new(),
            content,
            media_url: normalize_media_url(media_url),
            message_type: MessageType::Direct,
        };
        validate(&candidate)?;
        Ok(candidate)
    }

    pub fn broadcast(
        sender_id: i64,
        recipients: Vec<i64>,
        content: String,
        media_url: Option<String>,
    ) -> Result<Self, ValidationError> {
        let candidate = NewMessage {
            sender_id,
            recipient_id: None,
            recipients,
            content,
            media_url: normalize_media_url(media_url),
            message_type: MessageType::Broadcast,
        };
        validate(&candidate)?;
        Ok(candidate)
    }
}

fn normalize_media_url(media_url: Option<String>) -> Option<String> {
    media_url.filter(|url| !url.is_empty())
}

/// Result of a lifecycle transition, written back by the store as one unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusChange {
    pub status: MessageStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Optional filters over a message listing; unset fields add no constraint.
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub before: Option<DateTime<Utc>>,
    pub after: Option<DateTime<Utc>>,
    pub message_type: Option<MessageType>,
    pub has_media: Option<bool>,
    pub status: Option<MessageStatus>,
    pub sort: SortOrder,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MessageQueryParams {
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<i64>,
    #[validate(range(min = 0, message = "Offset cannot be negative"))]
    pub offset: Option<i64>,
    pub before: Option<DateTime<Utc>>,
    pub after: Option<DateTime<Utc>>,
    pub message_type: Option<MessageType>,
    pub has_media: Option<bool>,
    pub status: Option<MessageStatus>,
    pub sort_by: Option<SortOrder>,
}

impl From<MessageQueryParams> for MessageQuery {
    fn from(params: MessageQueryParams) -> Self {
        MessageQuery {
            limit: params.limit,
            offset: params.offset,
            before: params.before,
            after: params.after,
            message_type: params.message_type,
            has_media: params.has_media,
            status: params.status,
            sort: params.sort_by.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendDirectMessage {
    #[validate(range(min = 1, message = "Recipient ID is required"))]
    pub recipient_id: i64,
    #[serde(default)]
    pub content: String,
    pub media_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendBroadcastMessage {
    #[validate(length(min = 1, message = "At least one recipient is required"))]
    pub recipient_ids: Vec<i64>,
    #[serde(default)]
    pub content: String,
    pub media_url: Option<String>,
}
