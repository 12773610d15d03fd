//! FeedStore port - ユーザーごとの timeline
//!
//! # 実装
//! - **RedisFeedStore**（本番用、sorted set `timeline:<user>`）
//! - **InMemoryFeedStore**（開発・テスト用）

use async_trait::async_trait;

use crate::domain::{FeedStoreError, Message, UserId};

/// FeedStore は user ごとの上限付き・期限付きの時系列コレクション
///
/// # 設計原則
/// - score は message の作成時刻（Unix 秒）
/// - append 後に上限まで古い順に trim し、TTL を延長する
/// - 同じ message の重複 append は同じ member になるので重複しない
/// - user ごとに独立（ユーザーをまたぐロックは不要）
#[async_trait]
pub trait FeedStore: Send + Sync {
    async fn append(&self, user: &UserId, message: &Message) -> Result<(), FeedStoreError>;

    /// Most recent first, at most the configured read limit. Empty is not an error.
    async fn read(&self, user: &UserId) -> Result<Vec<Message>, FeedStoreError>;
}
