//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **PipelineBuilder**: ワイヤリングと起動時検証
//! - **MessageService / FollowService / TimelineService**: リクエスト層からの入口
//! - **PublishPipeline**: 切り離された publish + リトライ + dead-letter
//! - **FanoutConsumer**: follower の feed への書き込み
//! - **DeadLetterReprocessor**: dead-letter の定期再送

pub mod builder;
pub mod fanout;
pub mod publish_pipeline;
pub mod reprocessor;
pub mod retry;
pub mod services;
pub mod status;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, Pipeline, PipelineBuilder, PipelineHandle};
pub use self::fanout::{FanoutConsumer, FanoutError};
pub use self::publish_pipeline::{PublishOutcome, PublishPipeline};
pub use self::reprocessor::{DeadLetterReprocessor, ReprocessReport};
pub use self::retry::RetryPolicy;
pub use self::services::{FollowService, MessageService, PostedMessage, TimelineService};
pub use self::status::DeadLetterStatus;
