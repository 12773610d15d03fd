//! UserDirectory port - ユーザーの存在確認

use async_trait::async_trait;

use crate::domain::{RepositoryError, User, UserId};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_by_id(&self, id: &UserId) -> Result<User, RepositoryError>;
}
