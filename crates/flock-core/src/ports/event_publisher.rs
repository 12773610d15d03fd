//! EventPublisher port - "message created" イベントの送信
//!
//! # 実装
//! - **KafkaEventPublisher**（本番用、feature `kafka`）
//! - **InMemoryBroker**（開発・テスト用）

use async_trait::async_trait;

use crate::domain::{PublishError, UserId};

/// EventPublisher は serialize 済みのイベントを topic に送る
///
/// # 設計原則
/// - connection handle 以外の状態を持たない
/// - payload は不透明な bytes（JSON）。routing key は author
/// - リトライはしない（呼び出し側の PublishPipeline / Reprocessor の責務）
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, key: &UserId, payload: &[u8]) -> Result<(), PublishError>;
}
