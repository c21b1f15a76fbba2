use std::sync::Arc;

use crate::{
    api::error,
    configs::RedisCache,
    modules::user::{repository::UserRepository, schema::UserEntity},
};

const USER_TTL_SECS: u64 = 3600;

/// Read-through Redis cache in front of another user repository.
///
/// Only hits are cached; a missing user is always re-checked against the
/// inner repository so newly created accounts become addressable at once.
#[derive(Clone)]
pub struct CachedUserRepository<R>
where
    R: UserRepository + Send + Sync,
{
    inner: Arc<R>,
    cache: Arc<RedisCache>,
}

impl<R> CachedUserRepository<R>
where
    R: UserRepository + Send + Sync,
{
    pub fn new(inner: Arc<R>, cache: Arc<RedisCache>) -> Self {
        tracing::info!("User lookups cached in Redis for {USER_TTL_SECS}s");
        CachedUserRepository { inner, cache }
    }
}

#[async_trait::async_trait]
impl<R> UserRepository for CachedUserRepository<R>
where
    R: UserRepository + Send + Sync,
{
    async fn find_by_id(&self, id: i64) -> Result<Option<UserEntity>, error::SystemError> {
        let key = format!("user:{id}");
        match self.cache.get::<UserEntity>(&key).await {
            Ok(Some(user)) => {
                tracing::debug!("User {} found in cache", id);
                return Ok(Some(user));
            }
            Ok(None) => {}
            // a cache outage must not take lookups down with it
            Err(e) => tracing::warn!("User cache read failed for {}: {}", id, e),
        }

        let user = self.inner.find_by_id(id).await?;
        if let Some(entity) = &user {
            if let Err(e) = self.cache.set(&key, entity, USER_TTL_SECS).await {
                tracing::warn!("User cache write failed for {}: {}", id, e);
            }
        }
        Ok(user)
    }

    async fn exists(&self, id: i64) -> Result<bool, error::SystemError> {
        Ok(self.find_by_id(id).await?.is_some())
    }
}
