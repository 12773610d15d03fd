//! DeadLetterReprocessor - dead-letter の定期再送
//!
//! 状態は `Idle → Draining → Idle` の繰り返し。一定間隔（既定 5 分）ごとに
//! store のスナップショットを取り、各 payload を元の bytes のまま 1 回だけ publish する。
//!
//! - 成功したエントリは store から取り除く
//! - 失敗したエントリは残す（次の tick で再送）。再 enqueue はしない
//! - 壊れた payload はその場で取り除く

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use crate::domain::{DeadLetterId, Message};
use crate::ports::{DeadLetterStore, EventPublisher};

/// 1 tick 分の結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReprocessReport {
    pub published: usize,
    pub failed: usize,
    pub discarded: usize,
}

impl ReprocessReport {
    pub fn total(&self) -> usize {
        self.published + self.failed + self.discarded
    }
}

pub struct DeadLetterReprocessor {
    store: Arc<dyn DeadLetterStore>,
    publisher: Arc<dyn EventPublisher>,
    interval: Duration,
}

impl DeadLetterReprocessor {
    pub fn new(
        store: Arc<dyn DeadLetterStore>,
        publisher: Arc<dyn EventPublisher>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// タイマーループ
    ///
    /// 最初の tick は開始から 1 interval 後。shutdown は tick の合間にだけ見る。
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "dead-letter reprocessor started");

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let report = self.run_once().await;
                    if report.total() > 0 {
                        info!(
                            published = report.published,
                            failed = report.failed,
                            discarded = report.discarded,
                            "dead-letter reprocessing finished"
                        );
                    }
                }
            }
        }

        info!("dead-letter reprocessor stopped");
    }

    /// store の中身を 1 回だけ再送する
    pub async fn run_once(&self) -> ReprocessReport {
        let mut report = ReprocessReport::default();

        let entries = match self.store.drain_all().await {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "failed to read dead-letter store");
                return report;
            }
        };
        if entries.is_empty() {
            debug!("dead-letter store is empty");
            return report;
        }

        info!(entries = entries.len(), "reprocessing dead-letter entries");

        for entry in entries {
            let message = match Message::from_json(&entry.payload) {
                Ok(message) => message,
                Err(e) => {
                    warn!(
                        dead_letter_id = %entry.id,
                        category = %entry.category,
                        error = %e,
                        "discarding malformed dead-letter entry"
                    );
                    self.remove(entry.id).await;
                    report.discarded += 1;
                    continue;
                }
            };

            match self.publisher.publish(message.author(), &entry.payload).await {
                Ok(()) => {
                    debug!(
                        dead_letter_id = %entry.id,
                        message_id = %message.id(),
                        "dead-letter entry republished"
                    );
                    self.remove(entry.id).await;
                    report.published += 1;
                }
                Err(e) => {
                    warn!(
                        dead_letter_id = %entry.id,
                        message_id = %message.id(),
                        error = %e,
                        "failed to republish dead-letter entry, keeping it"
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }

    async fn remove(&self, id: DeadLetterId) {
        match self.store.remove(id).await {
            Ok(true) => {}
            // 満杯時の eviction で先に消えていることがある
            Ok(false) => debug!(dead_letter_id = %id, "dead-letter entry already gone"),
            Err(e) => error!(dead_letter_id = %id, error = %e, "failed to remove dead-letter entry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeadLetterCategory, MessageId, UserId};
    use crate::impls::{BoundedDeadLetterStore, InMemoryBroker};
    use chrono::Utc;
    use ulid::Ulid;

    fn payload(author: &str, body: &str) -> (Message, Vec<u8>) {
        let m = Message::new(
            MessageId::from_ulid(Ulid::new()),
            UserId::new(author),
            body,
            Utc::now(),
        );
        let bytes = m.to_json().unwrap();
        (m, bytes)
    }

    fn reprocessor(
        store: &Arc<BoundedDeadLetterStore>,
        broker: &InMemoryBroker,
    ) -> DeadLetterReprocessor {
        DeadLetterReprocessor::new(
            store.clone(),
            Arc::new(broker.clone()),
            Duration::from_secs(300),
        )
    }

    #[tokio::test]
    async fn republishes_and_removes_entries() {
        let store = Arc::new(BoundedDeadLetterStore::new(100));
        let broker = InMemoryBroker::new();
        let (m1, p1) = payload("alice", "one");
        let (_, p2) = payload("bob", "two");
        store
            .enqueue(DeadLetterCategory::MessageEvents, p1.clone())
            .await
            .unwrap();
        store
            .enqueue(DeadLetterCategory::TimelineEvents, p2)
            .await
            .unwrap();
        store
            .enqueue(DeadLetterCategory::MessageEvents, b"garbage".to_vec())
            .await
            .unwrap();

        let report = reprocessor(&store, &broker).run_once().await;

        assert_eq!(
            report,
            ReprocessReport {
                published: 2,
                failed: 0,
                discarded: 1,
            }
        );
        assert_eq!(store.len().await, 0);

        let published = broker.published().await;
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].key(), m1.author());
        assert_eq!(published[0].payload(), p1.as_slice());
        assert_eq!(published[1].key().as_str(), "bob");
    }

    #[tokio::test]
    async fn failed_entries_stay_for_next_tick() {
        let store = Arc::new(BoundedDeadLetterStore::new(100));
        let broker = InMemoryBroker::new();
        let (_, p1) = payload("alice", "one");
        let (_, p2) = payload("alice", "two");
        let kept = store
            .enqueue(DeadLetterCategory::MessageEvents, p1)
            .await
            .unwrap();
        store
            .enqueue(DeadLetterCategory::MessageEvents, p2)
            .await
            .unwrap();

        broker.fail_next_publishes(1).await;
        let r = reprocessor(&store, &broker);
        let report = r.run_once().await;
        assert_eq!(report.published, 1);
        assert_eq!(report.failed, 1);

        // 失敗したエントリは同じ id のまま残る（再 enqueue しない）
        let remaining = store.drain_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, kept);

        let report = r.run_once().await;
        assert_eq!(report.published, 1);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn empty_store_is_a_no_op() {
        let store = Arc::new(BoundedDeadLetterStore::new(100));
        let broker = InMemoryBroker::new();
        assert_eq!(
            reprocessor(&store, &broker).run_once().await,
            ReprocessReport::default()
        );
        assert_eq!(broker.stats().await.publish_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_fires_one_interval_after_start() {
        let store = Arc::new(BoundedDeadLetterStore::new(100));
        let broker = InMemoryBroker::new();
        let (_, p) = payload("alice", "late");
        store
            .enqueue(DeadLetterCategory::MessageEvents, p)
            .await
            .unwrap();

        let r = Arc::new(reprocessor(&store, &broker));
        let (tx, rx) = watch::channel(false);
        let join = tokio::spawn({
            let r = Arc::clone(&r);
            async move { r.run(rx).await }
        });

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!(broker.published().await.is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(broker.published().await.len(), 1);
        assert_eq!(store.len().await, 0);

        tx.send(true).unwrap();
        join.await.unwrap();
    }
}
