use crate::api::error::ValidationError;
use crate::modules::message::{model::NewMessage, schema::MessageType};

pub const MAX_CONTENT_CHARS: usize = 1000;
/// Width of the `messages.media_url` column.
pub const MAX_MEDIA_URL_LEN: usize = 255;

/// Decides whether a candidate message may be persisted. Pure; first failure wins.
pub fn validate(candidate: &NewMessage) -> Result<(), ValidationError> {
    let is_broadcast = candidate.message_type == MessageType::Broadcast;
    let media_url = candidate.media_url.as_deref().unwrap_or_default();

    if is_broadcast && candidate.recipients.is_empty() {
        return Err(ValidationError::NoRecipients);
    }

    if candidate.content.trim().is_empty() && media_url.is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    if candidate.content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ValidationError::MessageTooLong);
    }
    if !media_url.is_empty() && !is_valid_media_url(media_url) {
        return Err(ValidationError::InvalidMediaUrl);
    }

    if is_broadcast {
        if candidate.recipient_id.is_some() {
            return Err(ValidationError::InvalidBroadcast);
        }
    } else {
        if candidate.recipient_id.is_none() {
            return Err(ValidationError::InvalidRecipient);
        }
        if !candidate.recipients.is_empty() {
            return Err(ValidationError::DirectMessageNoList);
        }
    }

    Ok(())
}

/// Absolute URLs with a scheme, or absolute paths served by this host.
fn is_valid_media_url(url: &str) -> bool {
    if url.chars().count() > MAX_MEDIA_URL_LEN || url.trim() != url {
        return false;
    }
    if url.starts_with('/') {
        return !url.chars().any(|c| c.is_whitespace() || c.is_control());
    }
    url::Url::parse(url).is_ok()
}
