//! Services - post / follow / timeline の入口
//!
//! リクエスト層から呼ばれる同期的な経路。投稿は保存まで同期で行い、
//! イベント配送は PublishPipeline に切り離して渡す。

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::domain::{FlockError, Message, UserId};
use crate::ports::{Clock, FeedStore, FollowGraph, IdGenerator, MessageStore, UserDirectory};

use super::publish_pipeline::{PublishOutcome, PublishPipeline};

/// 保存済みの message と、その配送タスクの handle
///
/// `delivery` は drop してよい（配送は続く）。
pub struct PostedMessage {
    pub message: Message,
    pub delivery: JoinHandle<PublishOutcome>,
}

pub struct MessageService {
    messages: Arc<dyn MessageStore>,
    users: Arc<dyn UserDirectory>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    pipeline: Arc<PublishPipeline>,
    max_chars: usize,
}

impl MessageService {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        users: Arc<dyn UserDirectory>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        pipeline: Arc<PublishPipeline>,
        max_chars: usize,
    ) -> Self {
        Self {
            messages,
            users,
            ids,
            clock,
            pipeline,
            max_chars,
        }
    }

    /// 投稿を検証・保存し、配送を開始する
    ///
    /// 失敗するのは入力検証、author の解決、保存のいずれか。配送の成否は返り値の
    /// `delivery` でしか分からない。
    pub async fn post_message(&self, author: &UserId, body: &str) -> Result<PostedMessage, FlockError> {
        if author.is_empty() {
            return Err(FlockError::Validation("author is required".to_string()));
        }
        if body.trim().is_empty() {
            return Err(FlockError::Validation("message body is required".to_string()));
        }
        let chars = body.chars().count();
        if chars > self.max_chars {
            return Err(FlockError::Validation(format!(
                "message body is {chars} characters, limit is {}",
                self.max_chars
            )));
        }

        let user = self.users.get_by_id(author).await?;
        let message = Message::new(self.ids.generate_message_id(), user.id, body, self.clock.now());

        self.messages.save(&message).await?;
        info!(message_id = %message.id(), author = %message.author(), "message saved");

        let delivery = self.pipeline.spawn(message.clone());
        Ok(PostedMessage { message, delivery })
    }
}

pub struct FollowService {
    users: Arc<dyn UserDirectory>,
    graph: Arc<dyn FollowGraph>,
}

impl FollowService {
    pub fn new(users: Arc<dyn UserDirectory>, graph: Arc<dyn FollowGraph>) -> Self {
        Self { users, graph }
    }

    pub async fn follow(&self, follower: &UserId, followee: &UserId) -> Result<(), FlockError> {
        if follower.is_empty() || followee.is_empty() {
            return Err(FlockError::Validation("user id is required".to_string()));
        }
        if follower == followee {
            return Err(FlockError::SelfFollow(follower.clone()));
        }

        self.users.get_by_id(follower).await?;
        self.users.get_by_id(followee).await?;

        if self.graph.is_following(follower, followee).await? {
            return Err(FlockError::AlreadyFollowing {
                follower: follower.clone(),
                followee: followee.clone(),
            });
        }

        self.graph.follow(follower, followee).await?;
        info!(follower = %follower, followee = %followee, "follow created");
        Ok(())
    }
}

pub struct TimelineService {
    feeds: Arc<dyn FeedStore>,
}

impl TimelineService {
    pub fn new(feeds: Arc<dyn FeedStore>) -> Self {
        Self { feeds }
    }

    /// Newest first. A user with no feed gets an empty list.
    pub async fn timeline(&self, user: &UserId) -> Result<Vec<Message>, FlockError> {
        if user.is_empty() {
            return Err(FlockError::Validation("user id is required".to_string()));
        }
        Ok(self.feeds.read(user).await?)
    }
}
