/// Connection registry
///
/// Maps each online user to their single live connection. All mutations go
/// through one actor so concurrent register/unregister calls never interleave;
/// the actor only ever hands out connection handles and never writes to a
/// socket itself.
use actix::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::connection::Connection;
use super::events::*;
use crate::api::error;

#[derive(Default)]
pub struct RegistryActor {
    connections: HashMap<i64, Arc<dyn Connection>>,
}

impl Actor for RegistryActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("Connection registry started");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("Connection registry stopped");
    }
}

impl Handler<Register> for RegistryActor {
    type Result = Option<Arc<dyn Connection>>;

    fn handle(&mut self, msg: Register, _: &mut Context<Self>) -> Self::Result {
        let connection_id = msg.connection.id();
        let replaced = self.connections.insert(msg.user_id, msg.connection);

        match &replaced {
            Some(old) => tracing::info!(
                "User {} reconnected: connection {} replaces {}",
                msg.user_id,
                connection_id,
                old.id()
            ),
            None => tracing::info!("User {} connected on {}", msg.user_id, connection_id),
        }
        tracing::debug!("{} user(s) online", self.connections.len());

        replaced
    }
}

impl Handler<Unregister> for RegistryActor {
    type Result = bool;

    fn handle(&mut self, msg: Unregister, _: &mut Context<Self>) -> Self::Result {
        let matches = match (self.connections.get(&msg.user_id), msg.connection_id) {
            (Some(current), Some(expected)) => current.id() == expected,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if matches {
            self.connections.remove(&msg.user_id);
            tracing::info!("User {} disconnected", msg.user_id);
        } else if msg.connection_id.is_some() {
            tracing::debug!("Stale disconnect for user {} ignored", msg.user_id);
        }
        matches
    }
}

impl Handler<Lookup> for RegistryActor {
    type Result = Option<Arc<dyn Connection>>;

    fn handle(&mut self, msg: Lookup, _: &mut Context<Self>) -> Self::Result {
        self.connections.get(&msg.user_id).cloned()
    }
}

impl Handler<GetOnlineUsers> for RegistryActor {
    type Result = Vec<i64>;

    fn handle(&mut self, _: GetOnlineUsers, _: &mut Context<Self>) -> Self::Result {
        self.connections.keys().copied().collect()
    }
}

impl Handler<Drain> for RegistryActor {
    type Result = Vec<Arc<dyn Connection>>;

    fn handle(&mut self, _: Drain, _: &mut Context<Self>) -> Self::Result {
        self.connections.drain().map(|(_, connection)| connection).collect()
    }
}

/// Cloneable handle to the registry actor.
#[derive(Clone)]
pub struct ConnectionRegistry {
    addr: Addr<RegistryActor>,
}

impl ConnectionRegistry {
    /// Starts the actor on the current arbiter.
    pub fn start() -> Self {
        ConnectionRegistry { addr: RegistryActor::default().start() }
    }

    pub async fn register(
        &self,
        user_id: i64,
        connection: Arc<dyn Connection>,
    ) -> Result<Option<Arc<dyn Connection>>, error::SystemError> {
        Ok(self.addr.send(Register { user_id, connection }).await?)
    }

    /// Removes whatever connection the user has.
    #[cfg(test)]
    pub async fn remove(&self, user_id: i64) -> Result<bool, error::SystemError> {
        Ok(self.addr.send(Unregister { user_id, connection_id: None }).await?)
    }

    /// Removes the user's binding only if it still points at `connection_id`.
    pub async fn remove_connection(
        &self,
        user_id: i64,
        connection_id: Uuid,
    ) -> Result<bool, error::SystemError> {
        Ok(self.addr.send(Unregister { user_id, connection_id: Some(connection_id) }).await?)
    }

    pub async fn lookup(
        &self,
        user_id: i64,
    ) -> Result<Option<Arc<dyn Connection>>, error::SystemError> {
        Ok(self.addr.send(Lookup { user_id }).await?)
    }

    pub async fn online_users(&self) -> Result<Vec<i64>, error::SystemError> {
        Ok(self.addr.send(GetOnlineUsers).await?)
    }

    /// Closes every registered connection and leaves the registry empty.
    pub async fn shutdown(&self) -> Result<usize, error::SystemError> {
        let connections = self.addr.send(Drain).await?;
        let count = connections.len();

        futures_util::future::join_all(connections.iter().map(|c| c.close())).await;

        tracing::info!("Closed {} connection(s) on shutdown", count);
        Ok(count)
    }
}
