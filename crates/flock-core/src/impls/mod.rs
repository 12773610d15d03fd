//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryBroker**: 開発用の broker（EventPublisher + EventSubscription）
//! - **BoundedDeadLetterStore**: 容量上限付きの dead-letter store
//! - **InMemoryFeedStore** / **RedisFeedStore**: timeline
//! - **InMemoryMessageStore** / **InMemoryUserDirectory** / **InMemoryFollowGraph**
//! - **KafkaEventPublisher** / **KafkaSubscription**（feature `kafka`）

pub mod inmem_broker;
pub mod inmem_dead_letter;
pub mod inmem_feed;
pub mod inmem_repository;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod redis_feed;

// 主要な型を再エクスポート
pub use self::inmem_broker::{BrokerStats, InMemoryBroker};
pub use self::inmem_dead_letter::BoundedDeadLetterStore;
pub use self::inmem_feed::InMemoryFeedStore;
pub use self::inmem_repository::{InMemoryFollowGraph, InMemoryMessageStore, InMemoryUserDirectory};
#[cfg(feature = "kafka")]
pub use self::kafka::{KafkaEventPublisher, KafkaSubscription};
pub use self::redis_feed::RedisFeedStore;
