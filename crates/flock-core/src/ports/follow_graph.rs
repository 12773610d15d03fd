//! FollowGraph port - フォロー関係（外部の正本）

use async_trait::async_trait;

use crate::domain::{RepositoryError, UserId};

#[async_trait]
pub trait FollowGraph: Send + Sync {
    async fn follow(&self, follower: &UserId, followee: &UserId) -> Result<(), RepositoryError>;

    async fn is_following(
        &self,
        follower: &UserId,
        followee: &UserId,
    ) -> Result<bool, RepositoryError>;

    /// Current followers of `author`.
    async fn followers(&self, author: &UserId) -> Result<Vec<UserId>, RepositoryError>;
}
