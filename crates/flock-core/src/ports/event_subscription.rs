//! EventSubscription port - broker からの受信側
//!
//! # 実装
//! - **KafkaSubscription**（本番用、feature `kafka`）
//! - **InMemoryBroker**（開発・テスト用）

use async_trait::async_trait;

use crate::domain::{EventEnvelope, SubscriptionError};

/// A received envelope owned by the consumer until it reports the result.
///
/// The consumer must either `ack` or `nack`. What `nack` means (redelivery,
/// offset left uncommitted, ...) is the transport's decision.
#[async_trait]
pub trait EventDelivery: Send {
    fn envelope(&self) -> &EventEnvelope;

    /// Mark the envelope as fully processed.
    async fn ack(self: Box<Self>) -> Result<(), SubscriptionError>;

    /// Report that processing failed.
    async fn nack(self: Box<Self>, reason: String) -> Result<(), SubscriptionError>;
}

/// EventSubscription は配送を 1 件ずつ返す
///
/// # 設計原則
/// - `receive` は配送が来るまで待つ
/// - `Ok(None)` は subscription が閉じたことを示す（consumer ループは終了する）
#[async_trait]
pub trait EventSubscription: Send + Sync {
    async fn receive(&self) -> Result<Option<Box<dyn EventDelivery>>, SubscriptionError>;
}
