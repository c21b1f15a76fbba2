use std::collections::HashMap;

use sqlx::{Postgres, QueryBuilder};

use crate::{
    api::error,
    modules::{
        message::{
            model::{MessageQuery, NewMessage, SortOrder, StatusChange},
            repository::MessageRepository,
            schema::{MessageEntity, MessageRecipientEntity, MessageStatus, MessageType},
        },
        user::schema::UserSummary,
    },
};

const MESSAGE_COLUMNS: &str = "id, sender_id, recipient_id, content, media_url, message_type, status, sent_at, delivered_at, read_at";

#[derive(Clone)]
pub struct MessageRepositoryPg {
    pool: sqlx::PgPool,
}

impl MessageRepositoryPg {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    async fn insert_message<'e, E>(
        message: &NewMessage,
        tx: E,
    ) -> Result<MessageEntity, error::SystemError>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let message = sqlx::query_as::<_, MessageEntity>(&format!(
            "INSERT INTO messages (sender_id, recipient_id, content, media_url, message_type, status) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(message.sender_id)
        .bind(message.recipient_id)
        .bind(&message.content)
        .bind(&message.media_url)
        .bind(message.message_type)
        .bind(MessageStatus::Sent)
        .fetch_one(tx)
        .await?;

        Ok(message)
    }

    async fn fetch_listing(
        &self,
        mut builder: QueryBuilder<'_, Postgres>,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        let mut messages =
            builder.build_query_as::<MessageEntity>().fetch_all(&self.pool).await?;

        self.attach_recipients(&mut messages).await?;
        Ok(messages)
    }

    async fn attach_recipients(
        &self,
        messages: &mut [MessageEntity],
    ) -> Result<(), error::SystemError> {
        let broadcast_ids: Vec<i64> =
            messages.iter().filter(|m| m.is_broadcast()).map(|m| m.id).collect();
        if broadcast_ids.is_empty() {
            return Ok(());
        }

        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT message_id, user_id FROM message_recipients WHERE message_id = ANY($1) ORDER BY user_id",
        )
        .bind(&broadcast_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_message: HashMap<i64, Vec<i64>> = HashMap::new();
        for (message_id, user_id) in rows {
            by_message.entry(message_id).or_default().push(user_id);
        }
        for message in messages.iter_mut() {
            if let Some(recipients) = by_message.remove(&message.id) {
                message.recipients = recipients;
            }
        }
        Ok(())
    }
}

fn select_messages<'a>() -> QueryBuilder<'a, Postgres> {
    QueryBuilder::new(format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE deleted_at IS NULL"))
}

/// Direct messages exchanged between two users, either direction.
fn conversation_query<'a>(
    user_a: i64,
    user_b: i64,
    query: &MessageQuery,
) -> QueryBuilder<'a, Postgres> {
    let mut builder = select_messages();
    builder
        .push(" AND ((sender_id = ")
        .push_bind(user_a)
        .push(" AND recipient_id = ")
        .push_bind(user_b)
        .push(") OR (sender_id = ")
        .push_bind(user_b)
        .push(" AND recipient_id = ")
        .push_bind(user_a)
        .push("))");
    push_query_filters(&mut builder, query);
    builder
}

/// Sent, directly received, or received through a broadcast recipient row.
fn user_messages_query<'a>(user_id: i64, query: &MessageQuery) -> QueryBuilder<'a, Postgres> {
    let mut builder = select_messages();
    builder
        .push(" AND (sender_id = ")
        .push_bind(user_id)
        .push(" OR recipient_id = ")
        .push_bind(user_id)
        .push(" OR EXISTS (SELECT 1 FROM message_recipients mr WHERE mr.message_id = messages.id AND mr.user_id = ")
        .push_bind(user_id)
        .push("))");
    push_query_filters(&mut builder, query);
    builder
}

fn broadcasts_query<'a>(broadcaster_id: i64, query: &MessageQuery) -> QueryBuilder<'a, Postgres> {
    let mut builder = select_messages();
    builder
        .push(" AND message_type = ")
        .push_bind(MessageType::Broadcast)
        .push(" AND sender_id = ")
        .push_bind(broadcaster_id);
    push_query_filters(&mut builder, query);
    builder
}

/// Appends the optional filters, ordering and paging of a [`MessageQuery`].
fn push_query_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &MessageQuery) {
    if let Some(before) = query.before {
        builder.push(" AND sent_at < ").push_bind(before);
    }
    if let Some(after) = query.after {
        builder.push(" AND sent_at > ").push_bind(after);
    }
    if let Some(message_type) = query.message_type {
        builder.push(" AND message_type = ").push_bind(message_type);
    }
    match query.has_media {
        Some(true) => {
            builder.push(" AND media_url IS NOT NULL AND media_url <> ''");
        }
        Some(false) => {
            builder.push(" AND (media_url IS NULL OR media_url = '')");
        }
        None => {}
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status);
    }

    // newest first unless asked otherwise
    match query.sort {
        SortOrder::Asc => builder.push(" ORDER BY sent_at ASC, id ASC"),
        SortOrder::Desc => builder.push(" ORDER BY sent_at DESC, id DESC"),
    };

    if let Some(limit) = query.limit.filter(|l| *l > 0) {
        builder.push(" LIMIT ").push_bind(limit);
    }
    if let Some(offset) = query.offset.filter(|o| *o > 0) {
        builder.push(" OFFSET ").push_bind(offset);
    }
}

#[async_trait::async_trait]
impl MessageRepository for MessageRepositoryPg {
    async fn create(&self, message: &NewMessage) -> Result<MessageEntity, error::SystemError> {
        let created = Self::insert_message(message, &self.pool).await?;
        tracing::debug!("Message {} created for recipient {:?}", created.id, created.recipient_id);
        Ok(created)
    }

    async fn create_with_recipients(
        &self,
        message: &NewMessage,
    ) -> Result<i64, error::SystemError> {
        let mut tx = self.pool.begin().await?;

        let created = Self::insert_message(message, tx.as_mut()).await?;

        let rows = message
            .recipients
            .iter()
            .map(|user_id| MessageRecipientEntity::new(created.id, *user_id, created.sent_at))
            .collect::<Result<Vec<_>, _>>()?;
        let user_ids: Vec<i64> = rows.iter().map(|row| row.user_id).collect();

        let inserted = sqlx::query(
            r#"
            INSERT INTO message_recipients (message_id, user_id, received_at)
            SELECT $1, user_id, $3
            FROM UNNEST($2::bigint[]) AS t(user_id)
            "#,
        )
        .bind(created.id)
        .bind(&user_ids)
        .bind(created.sent_at)
        .execute(tx.as_mut())
        .await?
        .rows_affected();

        if inserted != rows.len() as u64 {
            // dropping `tx` rolls the message row back as well
            return Err(error::SystemError::DatabaseError(
                format!("inserted {inserted} of {} recipient rows", rows.len()).into(),
            ));
        }

        tx.commit().await?;
        tracing::debug!("Broadcast {} created with {} recipients", created.id, inserted);
        Ok(created.id)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<MessageEntity>, error::SystemError> {
        let message = sqlx::query_as::<_, MessageEntity>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(mut message) = message else {
            return Ok(None);
        };

        let (sender, recipients): (Option<UserSummary>, Vec<i64>) = tokio::try_join!(
            sqlx::query_as::<_, UserSummary>("SELECT id, username FROM users WHERE id = $1")
                .bind(message.sender_id)
                .fetch_optional(&self.pool),
            sqlx::query_scalar::<_, i64>(
                "SELECT user_id FROM message_recipients WHERE message_id = $1 ORDER BY user_id",
            )
            .bind(id)
            .fetch_all(&self.pool),
        )?;

        message.sender = sender;
        message.recipients = recipients;
        Ok(Some(message))
    }

    async fn find_conversation(
        &self,
        user_a: i64,
        user_b: i64,
        query: &MessageQuery,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        self.fetch_listing(conversation_query(user_a, user_b, query)).await
    }

    async fn find_user_messages(
        &self,
        user_id: i64,
        query: &MessageQuery,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        self.fetch_listing(user_messages_query(user_id, query)).await
    }

    async fn find_broadcasts(
        &self,
        broadcaster_id: i64,
        query: &MessageQuery,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        self.fetch_listing(broadcasts_query(broadcaster_id, query)).await
    }

    async fn update_status(
        &self,
        id: i64,
        change: &StatusChange,
        reader: Option<i64>,
    ) -> Result<bool, error::SystemError> {
        let mut tx = self.pool.begin().await?;

        // a delivered ack racing a read ack must not move the row backwards
        let updated = sqlx::query(
            r#"
            UPDATE messages
            SET status = $2, delivered_at = $3, read_at = $4
            WHERE id = $1 AND deleted_at IS NULL AND (status <> 'read' OR $5)
            "#,
        )
        .bind(id)
        .bind(change.status)
        .bind(change.delivered_at)
        .bind(change.read_at)
        .bind(change.status == MessageStatus::Read)
        .execute(tx.as_mut())
        .await?
        .rows_affected()
            > 0;

        if let (true, Some(user_id), Some(read_at)) = (updated, reader, change.read_at) {
            sqlx::query(
                "UPDATE message_recipients SET read_at = $3 WHERE message_id = $1 AND user_id = $2",
            )
            .bind(id)
            .bind(user_id)
            .bind(read_at)
            .execute(tx.as_mut())
            .await?;
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> Result<bool, error::SystemError> {
        let rows = sqlx::query(
            "UPDATE messages SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows > 0)
    }
}
