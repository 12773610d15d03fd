//! FanoutConsumer - write-time の timeline fan-out
//!
//! # 学習ポイント
//! - 1 件ずつ受信して処理するループ（並行処理しない）
//! - shutdown を watch channel で受け取り、受信待ちと select で競合させる
//! - 失敗時は payload 全体を dead-letter に退避して nack
//!
//! # 失敗時の扱い
//! | 失敗 | dead-letter | 報告 |
//! |---|---|---|
//! | payload が壊れている | しない（再試行しても直らない） | ack |
//! | follower の解決に失敗 | `timeline_events` | nack |
//! | どれか 1 人の feed 書き込みに失敗 | `timeline_events`（残りは中断） | nack |
//!
//! 書き込み済みの feed は巻き戻さない。再処理で同じ message が再度書かれても
//! feed の member は同一なので重複しない。

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::domain::{
    CodecError, DeadLetterCategory, EventEnvelope, FeedStoreError, MessageId, RepositoryError,
    UserId,
};
use crate::ports::{DeadLetterStore, EventDelivery, EventSubscription, FeedStore, FollowGraph};

const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("malformed event payload: {0}")]
    Malformed(#[source] CodecError),

    #[error("failed to resolve followers of {author}: {source}")]
    Followers {
        author: UserId,
        #[source]
        source: RepositoryError,
    },

    #[error("failed to append {message_id} to feed of {follower}: {source}")]
    Feed {
        message_id: MessageId,
        follower: UserId,
        #[source]
        source: FeedStoreError,
    },
}

pub struct FanoutConsumer {
    subscription: Arc<dyn EventSubscription>,
    follow_graph: Arc<dyn FollowGraph>,
    feed_store: Arc<dyn FeedStore>,
    dead_letters: Arc<dyn DeadLetterStore>,
}

impl FanoutConsumer {
    pub fn new(
        subscription: Arc<dyn EventSubscription>,
        follow_graph: Arc<dyn FollowGraph>,
        feed_store: Arc<dyn FeedStore>,
        dead_letters: Arc<dyn DeadLetterStore>,
    ) -> Self {
        Self {
            subscription,
            follow_graph,
            feed_store,
            dead_letters,
        }
    }

    /// 受信ループ
    ///
    /// shutdown が立つか、sender が drop されるか、subscription が閉じたら抜ける。
    /// 処理中の 1 件は最後まで処理する。
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("fan-out consumer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                received = self.subscription.receive() => received,
            };

            match received {
                Ok(Some(delivery)) => self.process(delivery).await,
                Ok(None) => {
                    info!("subscription closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "failed to receive event");
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!("fan-out consumer stopped");
    }

    /// 1 件の配送を処理して ack / nack を返す
    pub async fn process(&self, delivery: Box<dyn EventDelivery>) {
        let result = self.handle(delivery.envelope()).await;

        let reported = match result {
            Ok(followers) => {
                debug!(key = %delivery.envelope().key(), followers, "fan-out complete");
                delivery.ack().await
            }
            Err(FanoutError::Malformed(e)) => {
                warn!(key = %delivery.envelope().key(), error = %e, "discarding malformed event");
                delivery.ack().await
            }
            Err(e) => {
                error!(key = %delivery.envelope().key(), error = %e, "fan-out failed");
                self.dead_letter(delivery.envelope().payload().to_vec()).await;
                delivery.nack(e.to_string()).await
            }
        };

        if let Err(e) = reported {
            error!(error = %e, "failed to report delivery result");
        }
    }

    /// envelope の message を author の全 follower の feed に書き込む
    ///
    /// 書き込んだ follower 数を返す。最初の書き込み失敗で中断する。
    pub async fn handle(&self, envelope: &EventEnvelope) -> Result<usize, FanoutError> {
        let message = envelope.decode().map_err(FanoutError::Malformed)?;

        let followers = self
            .follow_graph
            .followers(message.author())
            .await
            .map_err(|source| FanoutError::Followers {
                author: message.author().clone(),
                source,
            })?;

        for follower in &followers {
            self.feed_store
                .append(follower, &message)
                .await
                .map_err(|source| FanoutError::Feed {
                    message_id: message.id(),
                    follower: follower.clone(),
                    source,
                })?;
        }

        Ok(followers.len())
    }

    async fn dead_letter(&self, payload: Vec<u8>) {
        match self
            .dead_letters
            .enqueue(DeadLetterCategory::TimelineEvents, payload)
            .await
        {
            Ok(id) => warn!(dead_letter_id = %id, "timeline event dead-lettered"),
            Err(e) => error!(error = %e, "failed to dead-letter timeline event"),
        }
    }
}
