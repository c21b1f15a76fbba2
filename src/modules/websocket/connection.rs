/// Writable handle to one live client connection.
use tokio::sync::Mutex;
use uuid::Uuid;

use super::message::ServerMessage;
use crate::api::error;

#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    /// Identity of this physical connection, distinct across reconnects.
    fn id(&self) -> Uuid;

    /// Writes one JSON frame. Concurrent callers are serialized.
    async fn send(&self, message: &ServerMessage) -> Result<(), error::SystemError>;

    async fn close(&self);
}

/// A connection backed by an upgraded actix-ws session.
pub struct WsConnection {
    id: Uuid,
    session: Mutex<actix_ws::Session>,
}

impl WsConnection {
    pub fn new(session: actix_ws::Session) -> Self {
        WsConnection { id: Uuid::now_v7(), session: Mutex::new(session) }
    }

    /// Heartbeat ping, sharing the write lock with data frames.
    pub async fn ping(&self) -> Result<(), error::SystemError> {
        self.session.lock().await.ping(b"").await.map_err(|_| closed())
    }

    pub async fn pong(&self, data: &[u8]) -> Result<(), error::SystemError> {
        self.session.lock().await.pong(data).await.map_err(|_| closed())
    }
}

fn closed() -> error::SystemError {
    error::SystemError::delivery("connection closed")
}

#[async_trait::async_trait]
impl Connection for WsConnection {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn send(&self, message: &ServerMessage) -> Result<(), error::SystemError> {
        let json = serde_json::to_string(message)?;
        self.session.lock().await.text(json).await.map_err(|_| closed())
    }

    async fn close(&self) {
        let session = self.session.lock().await.clone();
        if session.close(None).await.is_err() {
            tracing::debug!("Connection {} was already closed", self.id);
        }
    }
}
