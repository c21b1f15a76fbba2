use crate::modules::message::model::{MessageQuery, NewMessage, StatusChange};
use crate::{api::error, modules::message::schema::MessageEntity};

#[async_trait::async_trait]
pub trait MessageRepository {
    /// Persists a direct message, addressing included, in a single write.
    async fn create(&self, message: &NewMessage) -> Result<MessageEntity, error::SystemError>;

    /// Persists a broadcast and one recipient row per id, all or nothing.
    async fn create_with_recipients(
        &self,
        message: &NewMessage,
    ) -> Result<i64, error::SystemError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<MessageEntity>, error::SystemError>;

    async fn find_conversation(
        &self,
        user_a: i64,
        user_b: i64,
        query: &MessageQuery,
    ) -> Result<Vec<MessageEntity>, error::SystemError>;

    async fn find_user_messages(
        &self,
        user_id: i64,
        query: &MessageQuery,
    ) -> Result<Vec<MessageEntity>, error::SystemError>;

    async fn find_broadcasts(
        &self,
        broadcaster_id: i64,
        query: &MessageQuery,
    ) -> Result<Vec<MessageEntity>, error::SystemError>;

    /// Writes a lifecycle transition and, when `reader` is given, stamps that
    /// recipient's row in the same transaction. Returns whether the message
    /// row changed.
    async fn update_status(
        &self,
        id: i64,
        change: &StatusChange,
        reader: Option<i64>,
    ) -> Result<bool, error::SystemError>;

    async fn delete(&self, id: i64) -> Result<bool, error::SystemError>;
}
