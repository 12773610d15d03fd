//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（Kafka, Redis, ユーザー/フォローの正本）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - 各 port に本番用 adapter とインメモリ実装を 1 つずつ用意する
//! - すべて `Send + Sync`。サービスは `Arc<dyn Port>` で受け取る

pub mod clock;
pub mod dead_letter_store;
pub mod event_publisher;
pub mod event_subscription;
pub mod feed_store;
pub mod follow_graph;
pub mod id_generator;
pub mod message_store;
pub mod user_directory;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::dead_letter_store::DeadLetterStore;
pub use self::event_publisher::EventPublisher;
pub use self::event_subscription::{EventDelivery, EventSubscription};
pub use self::feed_store::FeedStore;
pub use self::follow_graph::FollowGraph;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::message_store::MessageStore;
pub use self::user_directory::UserDirectory;
