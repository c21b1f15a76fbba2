//! In-memory doubles for the message core's collaborators.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::api::error;
use crate::modules::message::model::{MessageQuery, NewMessage, SortOrder, StatusChange};
use crate::modules::message::repository::MessageRepository;
use crate::modules::message::schema::{
    MessageEntity, MessageRecipientEntity, MessageStatus, MessageType,
};
use crate::modules::user::repository::UserRepository;
use crate::modules::user::schema::{UserEntity, UserSummary};
use crate::modules::websocket::connection::Connection;
use crate::modules::websocket::message::ServerMessage;
use crate::modules::websocket::notifier::MessageNotifier;

// === Users ===

#[derive(Default)]
pub struct InMemoryUsers {
    users: HashMap<i64, UserEntity>,
}

impl InMemoryUsers {
    pub fn with_ids(ids: &[i64]) -> Self {
        let users = ids
            .iter()
            .map(|&id| {
                let user = UserEntity {
                    id,
                    username: format!("user{id}"),
                    email: format!("user{id}@example.com"),
                    last_active_at: None,
                    created_at: Utc::now(),
                };
                (id, user)
            })
            .collect();
        InMemoryUsers { users }
    }
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUsers {
    async fn find_by_id(&self, id: i64) -> Result<Option<UserEntity>, error::SystemError> {
        Ok(self.users.get(&id).cloned())
    }

    async fn exists(&self, id: i64) -> Result<bool, error::SystemError> {
        Ok(self.users.contains_key(&id))
    }
}

// === Messages ===

struct StoredMessage {
    entity: MessageEntity,
    deleted: bool,
}

/// A competing write applied just before the next status update.
#[derive(Clone, Copy)]
pub enum ConcurrentWrite {
    Read,
    Delete,
}

#[derive(Default)]
struct StoreState {
    next_id: i64,
    messages: Vec<StoredMessage>,
    recipients: Vec<MessageRecipientEntity>,
    fail_recipient_inserts: bool,
    create_calls: usize,
    before_next_update: Option<ConcurrentWrite>,
}

impl StoreState {
    fn insert(&mut self, message: &NewMessage) -> MessageEntity {
        self.next_id += 1;
        MessageEntity {
            id: self.next_id,
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            content: message.content.clone(),
            media_url: message.media_url.clone(),
            message_type: message.message_type,
            status: MessageStatus::Sent,
            sent_at: Utc::now(),
            delivered_at: None,
            read_at: None,
            sender: Some(UserSummary {
                id: message.sender_id,
                username: format!("user{}", message.sender_id),
            }),
            recipients: vec![],
        }
    }

    fn live(&self, id: i64) -> Option<&MessageEntity> {
        self.messages.iter().find(|m| m.entity.id == id && !m.deleted).map(|m| &m.entity)
    }

    fn recipient_ids(&self, message_id: i64) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .recipients
            .iter()
            .filter(|r| r.message_id == message_id)
            .map(|r| r.user_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    fn with_recipients(&self, message: &MessageEntity) -> MessageEntity {
        let mut message = message.clone();
        if message.is_broadcast() {
            message.recipients = self.recipient_ids(message.id);
        }
        message
    }

    fn list(
        &self,
        matches: impl Fn(&MessageEntity) -> bool,
        query: &MessageQuery,
    ) -> Vec<MessageEntity> {
        let mut found: Vec<MessageEntity> = self
            .messages
            .iter()
            .filter(|m| !m.deleted && matches(&m.entity) && matches_query(&m.entity, query))
            .map(|m| self.with_recipients(&m.entity))
            .collect();

        found.sort_by_key(|m| (m.sent_at, m.id));
        if query.sort == SortOrder::Desc {
            found.reverse();
        }

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let limit = query.limit.filter(|l| *l > 0).map_or(usize::MAX, |l| l as usize);
        found.into_iter().skip(offset).take(limit).collect()
    }
}

fn matches_query(message: &MessageEntity, query: &MessageQuery) -> bool {
    query.before.map_or(true, |before| message.sent_at < before)
        && query.after.map_or(true, |after| message.sent_at > after)
        && query.message_type.map_or(true, |t| message.message_type == t)
        && query.has_media.map_or(true, |has| message.has_media() == has)
        && query.status.map_or(true, |s| message.status == s)
}

/// Message store kept in memory. Broadcast creation is all-or-nothing, and
/// recipient inserts can be made to fail to exercise that.
#[derive(Clone, Default)]
pub struct InMemoryMessageStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_recipient_inserts(&self, fail: bool) {
        self.state.lock().unwrap().fail_recipient_inserts = fail;
    }

    pub fn before_next_update(&self, write: ConcurrentWrite) {
        self.state.lock().unwrap().before_next_update = Some(write);
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    /// Stored rows, soft-deleted ones included.
    pub fn message_count(&self) -> usize {
        self.state.lock().unwrap().messages.len()
    }

    pub fn get(&self, id: i64) -> Option<MessageEntity> {
        let state = self.state.lock().unwrap();
        state.live(id).map(|m| state.with_recipients(m))
    }

    pub fn recipient_rows(&self, message_id: i64) -> Vec<i64> {
        self.state.lock().unwrap().recipient_ids(message_id)
    }

    pub fn recipient_row_count(&self) -> usize {
        self.state.lock().unwrap().recipients.len()
    }

    pub fn recipient_read_at(&self, message_id: i64, user_id: i64) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .unwrap()
            .recipients
            .iter()
            .find(|r| r.message_id == message_id && r.user_id == user_id)
            .and_then(|r| r.read_at)
    }
}

#[async_trait::async_trait]
impl MessageRepository for InMemoryMessageStore {
    async fn create(&self, message: &NewMessage) -> Result<MessageEntity, error::SystemError> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        let entity = state.insert(message);
        state.messages.push(StoredMessage { entity: entity.clone(), deleted: false });
        Ok(entity)
    }

    async fn create_with_recipients(
        &self,
        message: &NewMessage,
    ) -> Result<i64, error::SystemError> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        let entity = state.insert(message);

        if state.fail_recipient_inserts {
            return Err(error::SystemError::DatabaseError("recipient insert failed".into()));
        }
        let rows = message
            .recipients
            .iter()
            .map(|&user_id| MessageRecipientEntity::new(entity.id, user_id, entity.sent_at))
            .collect::<Result<Vec<_>, _>>()?;

        state.recipients.extend(rows);
        state.messages.push(StoredMessage { entity: entity.clone(), deleted: false });
        Ok(entity.id)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<MessageEntity>, error::SystemError> {
        Ok(self.get(id))
    }

    async fn find_conversation(
        &self,
        user_a: i64,
        user_b: i64,
        query: &MessageQuery,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        let state = self.state.lock().unwrap();
        Ok(state.list(
            |m| {
                (m.sender_id == user_a && m.recipient_id == Some(user_b))
                    || (m.sender_id == user_b && m.recipient_id == Some(user_a))
            },
            query,
        ))
    }

    async fn find_user_messages(
        &self,
        user_id: i64,
        query: &MessageQuery,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        let state = self.state.lock().unwrap();
        let received: Vec<i64> = state
            .recipients
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.message_id)
            .collect();
        Ok(state.list(
            |m| {
                m.sender_id == user_id
                    || m.recipient_id == Some(user_id)
                    || received.contains(&m.id)
            },
            query,
        ))
    }

    async fn find_broadcasts(
        &self,
        broadcaster_id: i64,
        query: &MessageQuery,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        let state = self.state.lock().unwrap();
        Ok(state.list(
            |m| m.sender_id == broadcaster_id && m.message_type == MessageType::Broadcast,
            query,
        ))
    }

    async fn update_status(
        &self,
        id: i64,
        change: &StatusChange,
        reader: Option<i64>,
    ) -> Result<bool, error::SystemError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        if let Some(write) = state.before_next_update.take() {
            if let Some(stored) = state.messages.iter_mut().find(|m| m.entity.id == id) {
                match write {
                    ConcurrentWrite::Read => {
                        let now = Utc::now();
                        stored.entity.status = MessageStatus::Read;
                        stored.entity.delivered_at = stored.entity.delivered_at.or(Some(now));
                        stored.entity.read_at = Some(now);
                    }
                    ConcurrentWrite::Delete => stored.deleted = true,
                }
            }
        }
        let Some(stored) = state.messages.iter_mut().find(|m| m.entity.id == id && !m.deleted)
        else {
            return Ok(false);
        };
        if stored.entity.status == MessageStatus::Read && change.status != MessageStatus::Read {
            return Ok(false);
        }

        stored.entity.status = change.status;
        stored.entity.delivered_at = change.delivered_at;
        stored.entity.read_at = change.read_at;

        if let (Some(user_id), Some(read_at)) = (reader, change.read_at) {
            if let Some(row) =
                state.recipients.iter_mut().find(|r| r.message_id == id && r.user_id == user_id)
            {
                row.read_at = Some(read_at);
            }
        }
        Ok(true)
    }

    async fn delete(&self, id: i64) -> Result<bool, error::SystemError> {
        let mut state = self.state.lock().unwrap();
        match state.messages.iter_mut().find(|m| m.entity.id == id && !m.deleted) {
            Some(stored) => {
                stored.deleted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// === Realtime ===

enum SendMode {
    Accept,
    Fail,
    Stall,
}

/// Connection that records every frame written to it.
pub struct RecordingConnection {
    id: Uuid,
    mode: SendMode,
    frames: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl RecordingConnection {
    fn with_mode(mode: SendMode) -> Self {
        RecordingConnection {
            id: Uuid::now_v7(),
            mode,
            frames: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn new() -> Self {
        Self::with_mode(SendMode::Accept)
    }

    /// Every write fails as if the peer had gone away.
    pub fn failing() -> Self {
        Self::with_mode(SendMode::Fail)
    }

    /// Every write hangs forever.
    pub fn stalled() -> Self {
        Self::with_mode(SendMode::Stall)
    }

    pub fn frames(&self) -> Vec<serde_json::Value> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|json| serde_json::from_str(json).unwrap())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connection for RecordingConnection {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn send(&self, message: &ServerMessage) -> Result<(), error::SystemError> {
        match self.mode {
            SendMode::Accept => {
                let json = serde_json::to_string(message)?;
                self.frames.lock().unwrap().push(json);
                Ok(())
            }
            SendMode::Fail => Err(error::SystemError::delivery("connection closed")),
            SendMode::Stall => std::future::pending().await,
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Notifier that records what it was asked to push.
#[derive(Default)]
pub struct RecordingNotifier {
    fail: bool,
    notified: Mutex<Vec<i64>>,
    broadcasts: Mutex<Vec<(i64, Vec<i64>)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        RecordingNotifier { fail: true, ..Self::default() }
    }

    pub fn notified(&self) -> Vec<i64> {
        self.notified.lock().unwrap().clone()
    }

    pub fn broadcasts(&self) -> Vec<(i64, Vec<i64>)> {
        self.broadcasts.lock().unwrap().clone()
    }

    fn outcome(&self) -> Result<(), error::SystemError> {
        if self.fail {
            Err(error::SystemError::delivery("push failed"))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl MessageNotifier for RecordingNotifier {
    async fn notify(&self, message: &MessageEntity) -> Result<(), error::SystemError> {
        self.notified.lock().unwrap().push(message.id);
        self.outcome()
    }

    async fn broadcast(
        &self,
        message: &MessageEntity,
        recipient_ids: &[i64],
    ) -> Result<(), error::SystemError> {
        self.broadcasts.lock().unwrap().push((message.id, recipient_ids.to_vec()));
        self.outcome()
    }
}
