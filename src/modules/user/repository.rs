use crate::{api::error, modules::user::schema::UserEntity};

#[async_trait::async_trait]
pub trait UserRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<UserEntity>, error::SystemError>;

    async fn exists(&self, id: i64) -> Result<bool, error::SystemError>;
}
