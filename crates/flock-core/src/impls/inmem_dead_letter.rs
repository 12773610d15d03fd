//! BoundedDeadLetterStore - 容量付きのインメモリ dead-letter store
//!
//! # 学習ポイント
//! - VecDeque による FIFO eviction
//! - store 全体を 1 つの Mutex で守る（復旧経路なので流量は少ない）

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use crate::domain::{DeadLetterCategory, DeadLetterEntry, DeadLetterError, DeadLetterId};
use crate::ports::{Clock, DeadLetterStore, SystemClock};

struct State {
    entries: VecDeque<DeadLetterEntry>,
    next_id: u64,
}

/// BoundedDeadLetterStore は最大 `capacity` 件の dead-letter を保持する
///
/// # 不変条件
/// - `len() <= capacity()`
/// - 満杯時の enqueue は一番古い 1 件を捨ててから末尾に追加する
///
/// 捨てられたエントリは復元できない（warn ログのみ）。
pub struct BoundedDeadLetterStore {
    state: Mutex<State>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl BoundedDeadLetterStore {
    /// `capacity` は 1 以上に丸める
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                entries: VecDeque::with_capacity(capacity),
                next_id: 1,
            }),
            capacity,
            clock,
        }
    }
}

#[async_trait]
impl DeadLetterStore for BoundedDeadLetterStore {
    async fn enqueue(
        &self,
        category: DeadLetterCategory,
        payload: Vec<u8>,
    ) -> Result<DeadLetterId, DeadLetterError> {
        let mut state = self.state.lock().await;

        if state.entries.len() >= self.capacity {
            if let Some(evicted) = state.entries.pop_front() {
                warn!(
                    evicted_id = %evicted.id,
                    category = %evicted.category,
                    capacity = self.capacity,
                    "dead-letter store full, evicted oldest entry"
                );
            }
        }

        let id = DeadLetterId::new(state.next_id);
        state.next_id += 1;
        state.entries.push_back(DeadLetterEntry {
            id,
            category,
            payload,
            enqueued_at: self.clock.now(),
        });

        Ok(id)
    }

    async fn drain_all(&self) -> Result<Vec<DeadLetterEntry>, DeadLetterError> {
        let state = self.state.lock().await;
        Ok(state.entries.iter().cloned().collect())
    }

    async fn remove(&self, id: DeadLetterId) -> Result<bool, DeadLetterError> {
        let mut state = self.state.lock().await;
        // ids は単調増加なので二分探索できる
        match state.entries.binary_search_by_key(&id, |entry| entry.id) {
            Ok(index) => {
                state.entries.remove(index);
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::{Duration, TimeZone, Utc};

    #[tokio::test]
    async fn enqueue_then_drain_in_order() {
        let store = BoundedDeadLetterStore::new(10);
        store
            .enqueue(DeadLetterCategory::MessageEvents, b"a".to_vec())
            .await
            .unwrap();
        store
            .enqueue(DeadLetterCategory::TimelineEvents, b"b".to_vec())
            .await
            .unwrap();

        let entries = store.drain_all().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].payload, b"a");
        assert_eq!(entries[0].category, DeadLetterCategory::MessageEvents);
        assert_eq!(entries[1].payload, b"b");

        // drain はスナップショットなので削除しない
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn overflow_evicts_exactly_the_oldest() {
        let store = BoundedDeadLetterStore::new(100);
        for i in 0..=100u32 {
            store
                .enqueue(DeadLetterCategory::MessageEvents, i.to_string().into_bytes())
                .await
                .unwrap();
        }

        assert_eq!(store.len().await, 100);
        let entries = store.drain_all().await.unwrap();
        assert!(entries.iter().all(|e| e.payload != b"0"));
        assert_eq!(entries[0].payload, b"1");
        assert_eq!(entries[99].payload, b"100");
    }

    #[tokio::test]
    async fn remove_acknowledges_a_single_entry() {
        let store = BoundedDeadLetterStore::new(5);
        let first = store
            .enqueue(DeadLetterCategory::MessageEvents, b"first".to_vec())
            .await
            .unwrap();
        let second = store
            .enqueue(DeadLetterCategory::MessageEvents, b"second".to_vec())
            .await
            .unwrap();

        assert!(store.remove(first).await.unwrap());
        assert!(!store.remove(first).await.unwrap());

        let entries = store.drain_all().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, second);
    }

    #[tokio::test]
    async fn entries_are_stamped_with_the_clock() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(start));
        let store = BoundedDeadLetterStore::with_clock(3, clock.clone());

        store
            .enqueue(DeadLetterCategory::TimelineEvents, b"x".to_vec())
            .await
            .unwrap();
        clock.advance(Duration::minutes(1));
        store
            .enqueue(DeadLetterCategory::TimelineEvents, b"y".to_vec())
            .await
            .unwrap();

        let entries = store.drain_all().await.unwrap();
        assert_eq!(entries[0].enqueued_at, start);
        assert_eq!(entries[1].enqueued_at, start + Duration::minutes(1));
    }

    #[tokio::test]
    async fn zero_capacity_is_clamped() {
        let store = BoundedDeadLetterStore::new(0);
        assert_eq!(store.capacity(), 1);
        store
            .enqueue(DeadLetterCategory::MessageEvents, b"only".to_vec())
            .await
            .unwrap();
        store
            .enqueue(DeadLetterCategory::MessageEvents, b"newer".to_vec())
            .await
            .unwrap();
        let entries = store.drain_all().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload, b"newer");
    }
}
