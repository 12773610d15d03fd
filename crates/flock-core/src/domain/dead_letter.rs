//! Dead-letter records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned sequence number of a dead-letter entry.
///
/// Monotonically increasing per store, so ordering by id is insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeadLetterId(u64);

impl DeadLetterId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeadLetterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dlq-{}", self.0)
    }
}

/// Which pipeline stage gave up on the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterCategory {
    /// Publishing the "message created" event exhausted its retries.
    MessageEvents,

    /// Fan-out into follower feeds failed.
    TimelineEvents,
}

impl DeadLetterCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            DeadLetterCategory::MessageEvents => "message_events",
            DeadLetterCategory::TimelineEvents => "timeline_events",
        }
    }
}

impl fmt::Display for DeadLetterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload that could not be delivered through the primary path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterEntry {
    pub id: DeadLetterId,
    pub category: DeadLetterCategory,
    pub payload: Vec<u8>,
    pub enqueued_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_render_as_queue_names() {
        assert_eq!(DeadLetterCategory::MessageEvents.to_string(), "message_events");
        assert_eq!(DeadLetterCategory::TimelineEvents.to_string(), "timeline_events");
        assert_eq!(
            serde_json::to_string(&DeadLetterCategory::TimelineEvents).unwrap(),
            "\"timeline_events\""
        );
    }

    #[test]
    fn ids_order_by_sequence() {
        assert!(DeadLetterId::new(1) < DeadLetterId::new(2));
        assert_eq!(DeadLetterId::new(7).to_string(), "dlq-7");
    }
}
