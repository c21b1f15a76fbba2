/// Message service
///
/// Orchestrates validation, persistence and real-time delivery. Persistence
/// is authoritative: once a message is stored the operation succeeds, and a
/// failed push is only logged.
use std::sync::Arc;

use chrono::Utc;

use crate::api::error::{self, Resource, ValidationError};
use crate::modules::message::model::{MessageQuery, NewMessage};
use crate::modules::message::repository::MessageRepository;
use crate::modules::message::schema::MessageEntity;
use crate::modules::user::repository::UserRepository;
use crate::modules::websocket::notifier::MessageNotifier;

#[derive(Clone)]
pub struct MessageService<M>
where
    M: MessageRepository + Send + Sync,
{
    message_repo: Arc<M>,
    user_repo: Arc<dyn UserRepository + Send + Sync>,
    notifier: Arc<dyn MessageNotifier + Send + Sync>,
}

impl<M> MessageService<M>
where
    M: MessageRepository + Send + Sync,
{
    pub fn with_dependencies(
        message_repo: Arc<M>,
        user_repo: Arc<dyn UserRepository + Send + Sync>,
        notifier: Arc<dyn MessageNotifier + Send + Sync>,
    ) -> Self {
        MessageService { message_repo, user_repo, notifier }
    }

    async fn require_user(&self, user_id: i64) -> Result<(), error::SystemError> {
        if self.user_repo.exists(user_id).await? {
            Ok(())
        } else {
            Err(error::SystemError::NotFound(Resource::User))
        }
    }

    async fn require_message(&self, message_id: i64) -> Result<MessageEntity, error::SystemError> {
        self.message_repo
            .find_by_id(message_id)
            .await?
            .ok_or(error::SystemError::NotFound(Resource::Message))
    }

    /// Flow:
    /// 1. Build and validate the candidate
    /// 2. Check the recipient exists
    /// 3. Persist in one write, addressing included
    /// 4. Push to the recipient if online
    pub async fn send_direct_message(
        &self,
        sender_id: i64,
        recipient_id: i64,
        content: String,
        media_url: Option<String>,
    ) -> Result<MessageEntity, error::SystemError> {
        let candidate = NewMessage::direct(sender_id, recipient_id, content, media_url)?;

        self.require_user(recipient_id).await?;

        let message = self.message_repo.create(&candidate).await?;
        tracing::info!("User {} sent message {} to user {}", sender_id, message.id, recipient_id);

        if let Err(e) = self.notifier.notify(&message).await {
            tracing::warn!("Failed to push message {}: {}", message.id, e);
        }

        Ok(message)
    }

    /// Flow:
    /// 1. De-duplicate and validate the recipient list
    /// 2. Check every recipient exists
    /// 3. Persist the message and its recipient rows atomically
    /// 4. Reload and fan out to online recipients
    pub async fn send_broadcast(
        &self,
        broadcaster_id: i64,
        content: String,
        media_url: Option<String>,
        recipient_ids: Vec<i64>,
    ) -> Result<MessageEntity, error::SystemError> {
        if recipient_ids.is_empty() {
            return Err(ValidationError::NoRecipients.into());
        }

        let recipients = dedup_preserving_order(recipient_ids);
        let candidate = NewMessage::broadcast(broadcaster_id, recipients, content, media_url)?;

        for &user_id in &candidate.recipients {
            self.require_user(user_id).await?;
        }

        let message_id = self.message_repo.create_with_recipients(&candidate).await?;
        let message = self.require_message(message_id).await?;
        tracing::info!(
            "User {} broadcast message {} to {} recipient(s)",
            broadcaster_id,
            message.id,
            candidate.recipients.len()
        );

        if let Err(e) = self.notifier.broadcast(&message, &candidate.recipients).await {
            tracing::warn!("Failed to push broadcast {}: {}", message.id, e);
        }

        Ok(message)
    }

    pub async fn get_conversation(
        &self,
        user_a: i64,
        user_b: i64,
        query: &MessageQuery,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        self.require_user(user_a).await?;
        self.require_user(user_b).await?;

        self.message_repo.find_conversation(user_a, user_b, query).await
    }

    /// Everything the user sent or received, broadcasts included.
    pub async fn get_message_history(
        &self,
        user_id: i64,
        query: &MessageQuery,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        self.message_repo.find_user_messages(user_id, query).await
    }

    pub async fn get_broadcasts(
        &self,
        broadcaster_id: i64,
        query: &MessageQuery,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        self.message_repo.find_broadcasts(broadcaster_id, query).await
    }

    pub async fn mark_as_delivered(
        &self,
        message_id: i64,
    ) -> Result<MessageEntity, error::SystemError> {
        let mut message = self.require_message(message_id).await?;

        let change = message.mark_delivered(Utc::now());
        if !self.message_repo.update_status(message_id, &change, None).await? {
            // a concurrent read or delete won; report what is stored
            message = self.require_message(message_id).await?;
        }

        tracing::debug!("Message {} marked {:?}", message_id, message.status);
        Ok(message)
    }

    /// Marks the message read, stamping the reader's own row for broadcasts.
    pub async fn mark_as_read(
        &self,
        message_id: i64,
        reader_id: i64,
    ) -> Result<MessageEntity, error::SystemError> {
        let mut message = self.require_message(message_id).await?;

        let change = message.mark_read(Utc::now());
        if !self.message_repo.update_status(message_id, &change, Some(reader_id)).await? {
            message = self.require_message(message_id).await?;
        }

        tracing::debug!("Message {} read by user {}", message_id, reader_id);
        Ok(message)
    }

    /// Only the sender or the direct recipient may delete a message.
    pub async fn delete_message(
        &self,
        message_id: i64,
        user_id: i64,
    ) -> Result<(), error::SystemError> {
        let message = self.require_message(message_id).await?;

        if message.sender_id != user_id && message.recipient_id != Some(user_id) {
            return Err(error::SystemError::forbidden(
                "You don't have permission to delete this message",
            ));
        }

        if !self.message_repo.delete(message_id).await? {
            return Err(error::SystemError::NotFound(Resource::Message));
        }

        tracing::info!("Message {} deleted by user {}", message_id, user_id);
        Ok(())
    }
}

fn dedup_preserving_order(ids: Vec<i64>) -> Vec<i64> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
