//! Errors - エラー型と分類
//!
//! port ごとに thiserror の enum を定義し、サービス層は `FlockError` に集約する。
//!
//! # 分類
//! - Transient: 一時的なエラー（broker / Redis 不達など。リトライや dead-letter の対象）
//! - Permanent: 恒久的なエラー（壊れた payload、入力検証エラー。リトライ無意味）

use thiserror::Error;

use super::ids::UserId;

/// ErrorKind は実行エラーの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
}

/// JSON encode/decode failures of messages and dead-letter payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("publish timed out")]
    Timeout,

    #[error("broker closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("subscription failed: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum DeadLetterError {
    #[error("dead-letter store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum FeedStoreError {
    #[error("feed backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[cfg(feature = "kafka")]
impl From<rdkafka::error::KafkaError> for PublishError {
    fn from(e: rdkafka::error::KafkaError) -> Self {
        PublishError::Unavailable(e.to_string())
    }
}

impl From<redis::RedisError> for FeedStoreError {
    fn from(e: redis::RedisError) -> Self {
        FeedStoreError::Backend(e.to_string())
    }
}

/// Errors of the message / user / follow repositories.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    #[error("repository backend error: {0}")]
    Backend(String),
}

/// サービス層（post / follow / timeline）のエラー
#[derive(Debug, Error)]
pub enum FlockError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("user {0} cannot follow themselves")]
    SelfFollow(UserId),

    #[error("user {follower} is already following user {followee}")]
    AlreadyFollowing { follower: UserId, followee: UserId },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Feed(#[from] FeedStoreError),
}

impl PublishError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PublishError::Unavailable(_) | PublishError::Timeout => ErrorKind::Transient,
            PublishError::Closed => ErrorKind::Permanent,
        }
    }
}

impl FlockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlockError::Validation(_)
            | FlockError::SelfFollow(_)
            | FlockError::AlreadyFollowing { .. } => ErrorKind::Permanent,
            FlockError::Repository(RepositoryError::UserNotFound(_)) => ErrorKind::Permanent,
            FlockError::Repository(RepositoryError::Backend(_)) | FlockError::Feed(_) => {
                ErrorKind::Transient
            }
        }
    }
}
