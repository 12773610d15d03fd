//! PublishPipeline - 保存済み message の "created" イベントを配送する
//!
//! # 学習ポイント
//! - リクエストから切り離したタスク（`tokio::spawn`）と独自の deadline
//! - 指数バックオフによるリトライ
//! - リトライを使い切ったら dead-letter へ退避
//!
//! # 流れ
//! ```text
//! serialize → publish ─ ok ──────────────────────→ Published
//!                └ err → sleep(backoff) → publish ...
//!                                   └ 上限 / deadline → dead-letter → DeadLettered
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{error, info, warn};

use crate::domain::{DeadLetterCategory, Message, PublishError};
use crate::ports::{DeadLetterStore, EventPublisher};

use super::retry::RetryPolicy;

/// 1 件の message に対する配送結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// broker が受け付けた
    Published { attempts: u32 },
    /// リトライを使い切り、dead-letter に退避した
    DeadLettered { attempts: u32 },
    /// serialize 失敗、または dead-letter への退避にも失敗した
    Abandoned,
}

/// PublishPipeline は EventPublisher と DeadLetterStore を束ねる
///
/// # 保証
/// - message 1 件につき「publish 成功 1 回」または「dead-letter enqueue の試行 1 回」
/// - deadline を過ぎたら次の試行はしない
pub struct PublishPipeline {
    publisher: Arc<dyn EventPublisher>,
    dead_letters: Arc<dyn DeadLetterStore>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl PublishPipeline {
    pub fn new(
        publisher: Arc<dyn EventPublisher>,
        dead_letters: Arc<dyn DeadLetterStore>,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            publisher,
            dead_letters,
            policy,
            timeout,
        }
    }

    /// 呼び出し元から切り離して配送する
    ///
    /// 返り値の handle は drop してよい。drop しても配送は続く。
    pub fn spawn(self: &Arc<Self>, message: Message) -> JoinHandle<PublishOutcome> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.publish_with_retry(&message).await })
    }

    pub async fn publish_with_retry(&self, message: &Message) -> PublishOutcome {
        let deadline = Instant::now() + self.timeout;

        let payload = match message.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!(message_id = %message.id(), error = %e, "failed to serialize message, not publishing");
                return PublishOutcome::Abandoned;
            }
        };

        let mut attempts = 0;
        for attempt in 0..self.policy.max_attempts {
            if Instant::now() >= deadline {
                warn!(message_id = %message.id(), attempts, "publish deadline exceeded");
                break;
            }
            attempts += 1;

            let result = timeout_at(deadline, self.publisher.publish(message.author(), &payload))
                .await
                .unwrap_or(Err(PublishError::Timeout));

            match result {
                Ok(()) => {
                    info!(
                        message_id = %message.id(),
                        author = %message.author(),
                        attempts,
                        "message event published"
                    );
                    return PublishOutcome::Published { attempts };
                }
                Err(e) => {
                    let delay = self.policy.next_delay(attempt);
                    warn!(
                        message_id = %message.id(),
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts,
                        retry_in_ms = millis(delay),
                        error = %e,
                        "failed to publish message event"
                    );
                    // deadline を越えて眠らない
                    let wake_at = Instant::now()
                        .checked_add(delay)
                        .map_or(deadline, |at| at.min(deadline));
                    sleep_until(wake_at).await;
                }
            }
        }

        self.dead_letter(message, attempts).await
    }

    async fn dead_letter(&self, message: &Message, attempts: u32) -> PublishOutcome {
        let payload = match message.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!(message_id = %message.id(), error = %e, "failed to serialize message for dead-letter");
                return PublishOutcome::Abandoned;
            }
        };

        match self
            .dead_letters
            .enqueue(DeadLetterCategory::MessageEvents, payload)
            .await
        {
            Ok(id) => {
                error!(
                    message_id = %message.id(),
                    dead_letter_id = %id,
                    attempts,
                    "publish retries exhausted, message dead-lettered"
                );
                PublishOutcome::DeadLettered { attempts }
            }
            Err(e) => {
                error!(message_id = %message.id(), error = %e, "failed to dead-letter message");
                PublishOutcome::Abandoned
            }
        }
    }
}

/// Log-friendly milliseconds, saturating at `u64::MAX`.
fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}
