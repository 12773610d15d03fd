//! MessageStore port - メッセージの永続化（外部の正本）

use async_trait::async_trait;

use crate::domain::{Message, RepositoryError};

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn save(&self, message: &Message) -> Result<(), RepositoryError>;
}
