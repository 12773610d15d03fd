//! InMemoryBroker - 開発・テスト用の broker
//!
//! # 学習ポイント
//! - Mutex + Notify による待機付き受信
//! - 1 つの値で publisher 側と subscription 側の両方の port を実装する
//! - 障害注入（`fail_next_publishes`）でリトライ経路を決定的にテストする
//!
//! topic は 1 本の FIFO。author ごとの順序は FIFO によって自然に保たれる。

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::domain::{EventEnvelope, PublishError, SubscriptionError, UserId};
use crate::ports::{EventDelivery, EventPublisher, EventSubscription};

/// Counters for assertions and the demo binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub publish_attempts: usize,
    pub published: usize,
    pub acked: usize,
    pub nacked: usize,
    /// nack された配送のうち、再配送上限に達して捨てたもの
    pub dropped: usize,
}

struct Pending {
    envelope: EventEnvelope,
    deliveries: u32,
}

struct BrokerState {
    queue: VecDeque<Pending>,
    log: Vec<EventEnvelope>,
    fail_next: u32,
    closed: bool,
    stats: BrokerStats,
}

struct Inner {
    state: Mutex<BrokerState>,
    notify: Notify,
    max_deliveries: u32,
}

/// InMemoryBroker は topic 1 本分の broker
///
/// # nack の扱い
/// - 配送回数が `max_deliveries` 未満なら末尾に戻して再配送
/// - 上限に達したら捨てる（既定は 1 回 = 再配送しない）
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_max_deliveries(1)
    }

    pub fn with_max_deliveries(max_deliveries: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BrokerState {
                    queue: VecDeque::new(),
                    log: Vec::new(),
                    fail_next: 0,
                    closed: false,
                    stats: BrokerStats::default(),
                }),
                notify: Notify::new(),
                max_deliveries: max_deliveries.max(1),
            }),
        }
    }

    /// 次の `n` 回の publish を `PublishError::Unavailable` で失敗させる
    pub async fn fail_next_publishes(&self, n: u32) {
        self.inner.state.lock().await.fail_next = n;
    }

    /// Every envelope accepted so far, in publish order.
    pub async fn published(&self) -> Vec<EventEnvelope> {
        self.inner.state.lock().await.log.clone()
    }

    pub async fn stats(&self) -> BrokerStats {
        self.inner.state.lock().await.stats
    }

    /// Envelopes waiting to be received.
    pub async fn pending(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    /// 以降の publish を拒否し、キューが空になった subscription に `None` を返させる
    pub async fn close(&self) {
        self.inner.state.lock().await.closed = true;
        self.inner.notify.notify_waiters();
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryBroker {
    async fn publish(&self, key: &UserId, payload: &[u8]) -> Result<(), PublishError> {
        {
            let mut state = self.inner.state.lock().await;
            state.stats.publish_attempts += 1;

            if state.closed {
                return Err(PublishError::Closed);
            }
            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(PublishError::Unavailable("injected failure".to_string()));
            }

            let envelope = EventEnvelope::new(key.clone(), payload.to_vec());
            state.log.push(envelope.clone());
            state.queue.push_back(Pending {
                envelope,
                deliveries: 0,
            });
            state.stats.published += 1;
        }

        // ロックの外で通知する
        self.inner.notify.notify_one();
        debug!(key = %key, "event accepted by in-memory broker");
        Ok(())
    }
}

#[async_trait]
impl EventSubscription for InMemoryBroker {
    async fn receive(&self) -> Result<Option<Box<dyn EventDelivery>>, SubscriptionError> {
        loop {
            let notified = self.inner.notify.notified();
            {
                let mut state = self.inner.state.lock().await;
                if let Some(mut pending) = state.queue.pop_front() {
                    pending.deliveries += 1;
                    return Ok(Some(Box::new(InMemoryDelivery {
                        pending,
                        broker: Arc::clone(&self.inner),
                    })));
                }
                if state.closed {
                    return Ok(None);
                }
            }
            notified.await;
        }
    }
}

struct InMemoryDelivery {
    pending: Pending,
    broker: Arc<Inner>,
}

#[async_trait]
impl EventDelivery for InMemoryDelivery {
    fn envelope(&self) -> &EventEnvelope {
        &self.pending.envelope
    }

    async fn ack(self: Box<Self>) -> Result<(), SubscriptionError> {
        self.broker.state.lock().await.stats.acked += 1;
        Ok(())
    }

    async fn nack(self: Box<Self>, reason: String) -> Result<(), SubscriptionError> {
        let this = *self;
        let redeliver = {
            let mut state = this.broker.state.lock().await;
            state.stats.nacked += 1;
            if this.pending.deliveries < this.broker.max_deliveries {
                debug!(key = %this.pending.envelope.key(), reason = %reason, "delivery rejected, requeued");
                state.queue.push_back(this.pending);
                true
            } else {
                state.stats.dropped += 1;
                warn!(
                    key = %this.pending.envelope.key(),
                    deliveries = this.pending.deliveries,
                    reason = %reason,
                    "delivery rejected, redelivery limit reached"
                );
                false
            }
        };

        if redeliver {
            this.broker.notify.notify_one();
        }
        Ok(())
    }
}
