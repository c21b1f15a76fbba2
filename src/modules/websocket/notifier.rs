/// Real-time delivery of persisted messages to online users.
use std::time::Duration;

use super::message::{MessagePayload, ServerMessage};
use super::registry::ConnectionRegistry;
use crate::api::error;
use crate::modules::message::schema::MessageEntity;

#[async_trait::async_trait]
pub trait MessageNotifier {
    /// Pushes a direct message to its recipient if they are online.
    async fn notify(&self, message: &MessageEntity) -> Result<(), error::SystemError>;

    /// Pushes a broadcast to each online recipient. Offline users are skipped;
    /// per-recipient failures are collected into a single error.
    async fn broadcast(
        &self,
        message: &MessageEntity,
        recipient_ids: &[i64],
    ) -> Result<(), error::SystemError>;
}

#[derive(Clone)]
pub struct WebSocketNotifier {
    registry: ConnectionRegistry,
    write_timeout: Duration,
}

impl WebSocketNotifier {
    pub fn new(registry: ConnectionRegistry, write_timeout: Duration) -> Self {
        WebSocketNotifier { registry, write_timeout }
    }

    /// Looks the user up and writes one frame. `Ok(false)` when offline.
    async fn push(
        &self,
        user_id: i64,
        frame: &ServerMessage,
    ) -> Result<bool, error::SystemError> {
        let Some(connection) = self.registry.lookup(user_id).await? else {
            tracing::debug!("User {} offline, nothing pushed", user_id);
            return Ok(false);
        };

        match tokio::time::timeout(self.write_timeout, connection.send(frame)).await {
            Ok(result) => result.map(|_| true),
            Err(_) => Err(error::SystemError::delivery(format!(
                "write to user {user_id} timed out after {}ms",
                self.write_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait::async_trait]
impl MessageNotifier for WebSocketNotifier {
    async fn notify(&self, message: &MessageEntity) -> Result<(), error::SystemError> {
        let recipient_id = message.recipient_id.ok_or_else(|| {
            error::SystemError::delivery(format!("message {} has no recipient", message.id))
        })?;

        let frame = ServerMessage::message(MessagePayload::from(message));
        if self.push(recipient_id, &frame).await? {
            tracing::debug!("Message {} pushed to user {}", message.id, recipient_id);
        }
        Ok(())
    }

    async fn broadcast(
        &self,
        message: &MessageEntity,
        recipient_ids: &[i64],
    ) -> Result<(), error::SystemError> {
        let payload = MessagePayload::from(message);

        let results = futures_util::future::join_all(recipient_ids.iter().map(|&user_id| {
            let frame = ServerMessage::message(payload.for_recipient(user_id));
            async move { (user_id, self.push(user_id, &frame).await) }
        }))
        .await;

        let mut pushed = 0;
        let mut failures = Vec::new();
        for (user_id, result) in results {
            match result {
                Ok(true) => pushed += 1,
                Ok(false) => {}
                Err(e) => failures.push(format!("user {user_id}: {e}")),
            }
        }

        tracing::debug!(
            "Broadcast {} pushed to {}/{} recipients",
            message.id,
            pushed,
            recipient_ids.len()
        );

        if failures.is_empty() {
            Ok(())
        } else {
            Err(error::SystemError::delivery(format!(
                "broadcast {} failed for {} recipient(s): {}",
                message.id,
                failures.len(),
                failures.join("; ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::modules::message::schema::{MessageStatus, MessageType};
    use crate::test::RecordingConnection;

    fn direct_message(recipient_id: Option<i64>) -> MessageEntity {
        MessageEntity {
            id: 10,
            sender_id: 1,
            recipient_id,
            content: "Hello".to_string(),
            media_url: None,
            message_type: MessageType::Direct,
            status: MessageStatus::Sent,
            sent_at: Utc::now(),
            delivered_at: None,
            read_at: None,
            sender: None,
            recipients: vec![],
        }
    }

    fn broadcast_message() -> MessageEntity {
        MessageEntity {
            message_type: MessageType::Broadcast,
            recipient_id: None,
            recipients: vec![2, 3, 4],
            ..direct_message(None)
        }
    }

    fn notifier(registry: &ConnectionRegistry) -> WebSocketNotifier {
        WebSocketNotifier::new(registry.clone(), Duration::from_millis(200))
    }

    #[actix_web::test]
    async fn test_notify_online_recipient() {
        let registry = ConnectionRegistry::start();
        let conn = Arc::new(RecordingConnection::new());
        registry.register(2, conn.clone()).await.unwrap();

        notifier(&registry).notify(&direct_message(Some(2))).await.unwrap();

        let frames = conn.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "message");
        assert_eq!(frames[0]["payload"]["id"], 10);
        assert_eq!(frames[0]["payload"]["recipientId"], 2);
    }

    #[actix_web::test]
    async fn test_notify_offline_recipient_is_ok() {
        let registry = ConnectionRegistry::start();
        let other = Arc::new(RecordingConnection::new());
        registry.register(3, other.clone()).await.unwrap();

        notifier(&registry).notify(&direct_message(Some(2))).await.unwrap();

        assert!(other.frames().is_empty());
        assert_eq!(registry.online_users().await.unwrap(), vec![3]);
    }

    #[actix_web::test]
    async fn test_notify_without_recipient_fails() {
        let registry = ConnectionRegistry::start();
        let err = notifier(&registry).notify(&direct_message(None)).await.unwrap_err();
        assert!(matches!(err, error::SystemError::Delivery(_)));
    }

    #[actix_web::test]
    async fn test_notify_write_failure_surfaces() {
        let registry = ConnectionRegistry::start();
        registry.register(2, Arc::new(RecordingConnection::failing())).await.unwrap();

        let err = notifier(&registry).notify(&direct_message(Some(2))).await.unwrap_err();
        assert!(matches!(err, error::SystemError::Delivery(_)));
    }

    #[actix_web::test]
    async fn test_notify_times_out_on_stalled_connection() {
        let registry = ConnectionRegistry::start();
        registry.register(2, Arc::new(RecordingConnection::stalled())).await.unwrap();

        let err = WebSocketNotifier::new(registry.clone(), Duration::from_millis(20))
            .notify(&direct_message(Some(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, error::SystemError::Delivery(_)));
    }

    #[actix_web::test]
    async fn test_broadcast_reaches_online_recipients_only() {
        let registry = ConnectionRegistry::start();
        let two = Arc::new(RecordingConnection::new());
        let four = Arc::new(RecordingConnection::new());
        registry.register(2, two.clone()).await.unwrap();
        registry.register(4, four.clone()).await.unwrap();

        notifier(&registry).broadcast(&broadcast_message(), &[2, 3, 4]).await.unwrap();

        assert_eq!(two.frames().len(), 1);
        assert_eq!(two.frames()[0]["payload"]["recipientId"], 2);
        assert_eq!(four.frames()[0]["payload"]["recipientId"], 4);
        assert_eq!(four.frames()[0]["payload"]["messageType"], "broadcast");
    }

    #[actix_web::test]
    async fn test_broadcast_aggregates_failures() {
        let registry = ConnectionRegistry::start();
        let healthy = Arc::new(RecordingConnection::new());
        registry.register(2, healthy.clone()).await.unwrap();
        registry.register(3, Arc::new(RecordingConnection::failing())).await.unwrap();

        let err = notifier(&registry).broadcast(&broadcast_message(), &[2, 3]).await.unwrap_err();

        assert!(matches!(err, error::SystemError::Delivery(ref msg) if msg.contains("user 3")));
        assert_eq!(healthy.frames().len(), 1);
    }
}
