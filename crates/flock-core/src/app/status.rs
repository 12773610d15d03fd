//! Status - dead-letter store の監視用スナップショット

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{DeadLetterCategory, DeadLetterError};
use crate::ports::DeadLetterStore;

/// DeadLetterStatus は dead-letter の滞留状況を説明する
///
/// `len == capacity` が続く場合、古いエントリが eviction で失われている。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadLetterStatus {
    pub len: usize,
    pub capacity: usize,
    pub by_category: BTreeMap<DeadLetterCategory, usize>,
    pub oldest_enqueued_at: Option<DateTime<Utc>>,
}

impl DeadLetterStatus {
    pub async fn snapshot(store: &dyn DeadLetterStore) -> Result<Self, DeadLetterError> {
        let entries = store.drain_all().await?;

        let mut by_category = BTreeMap::new();
        for entry in &entries {
            *by_category.entry(entry.category).or_insert(0) += 1;
        }

        Ok(Self {
            len: entries.len(),
            capacity: store.capacity(),
            by_category,
            oldest_enqueued_at: entries.iter().map(|e| e.enqueued_at).min(),
        })
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }
}

impl fmt::Display for DeadLetterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} entries", self.len, self.capacity)?;
        for (category, count) in &self.by_category {
            write!(f, ", {category}={count}")?;
        }
        if let Some(oldest) = self.oldest_enqueued_at {
            write!(f, ", oldest={}", oldest.to_rfc3339())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::BoundedDeadLetterStore;
    use crate::ports::FixedClock;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    #[tokio::test]
    async fn empty_store() {
        let store = BoundedDeadLetterStore::new(100);
        let status = DeadLetterStatus::snapshot(&store).await.unwrap();
        assert_eq!(status.len, 0);
        assert_eq!(status.capacity, 100);
        assert!(status.by_category.is_empty());
        assert!(status.oldest_enqueued_at.is_none());
        assert_eq!(status.to_string(), "0/100 entries");
    }

    #[tokio::test]
    async fn counts_by_category() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(start));
        let store = BoundedDeadLetterStore::with_clock(2, clock.clone());

        store
            .enqueue(DeadLetterCategory::MessageEvents, b"a".to_vec())
            .await
            .unwrap();
        clock.advance(Duration::seconds(5));
        store
            .enqueue(DeadLetterCategory::TimelineEvents, b"b".to_vec())
            .await
            .unwrap();

        let status = DeadLetterStatus::snapshot(&store).await.unwrap();
        assert!(status.is_full());
        assert_eq!(status.by_category[&DeadLetterCategory::MessageEvents], 1);
        assert_eq!(status.by_category[&DeadLetterCategory::TimelineEvents], 1);
        assert_eq!(status.oldest_enqueued_at, Some(start));
        assert_eq!(
            status.to_string(),
            "2/2 entries, message_events=1, timeline_events=1, oldest=2024-05-01T00:00:00+00:00"
        );
    }
}
