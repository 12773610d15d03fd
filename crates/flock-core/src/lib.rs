//! flock-core
//!
//! Core of a micro-blogging backend: the path from "message accepted" to
//! "message visible in every follower's feed".
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, message, envelope, dead-letter, errors）
//! - **ports**: 抽象化レイヤー（EventPublisher, EventSubscription, DeadLetterStore, FeedStore, など）
//! - **impls**: 実装（InMemoryBroker, BoundedDeadLetterStore, RedisFeedStore, Kafka adapters）
//! - **app**: アプリケーションロジック（publish pipeline, fan-out, reprocessor, services, builder）
//! - **config**: 環境変数からの設定
//!
//! # 流れ
//! ```text
//! post_message → MessageStore::save → PublishPipeline (spawn) → broker
//!                                            └ 失敗 → DeadLetterStore ← FanoutConsumer の失敗
//! broker → FanoutConsumer → FeedStore::append (follower ごと)
//! DeadLetterReprocessor (定期) → broker
//! ```

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
