/// Registry actor messages
use actix::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use super::connection::Connection;

/// Binds a connection to a user, replacing any previous one.
/// Returns the replaced connection, if there was one.
#[derive(Message)]
#[rtype(result = "Option<Arc<dyn Connection>>")]
pub struct Register {
    pub user_id: i64,
    pub connection: Arc<dyn Connection>,
}

/// Removes a user's binding. With `connection_id` set, only that exact
/// connection is removed so a late disconnect cannot evict a newer one.
#[derive(Message)]
#[rtype(result = "bool")]
pub struct Unregister {
    pub user_id: i64,
    pub connection_id: Option<Uuid>,
}

#[derive(Message)]
#[rtype(result = "Option<Arc<dyn Connection>>")]
pub struct Lookup {
    pub user_id: i64,
}

#[derive(Message)]
#[rtype(result = "Vec<i64>")]
pub struct GetOnlineUsers;

/// Empties the registry, handing every connection back to the caller.
#[derive(Message)]
#[rtype(result = "Vec<Arc<dyn Connection>>")]
pub struct Drain;
