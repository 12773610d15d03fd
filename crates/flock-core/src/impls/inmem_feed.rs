//! InMemoryFeedStore - 開発・テスト用の timeline
//!
//! Redis の sorted set と同じ意味論を再現する:
//! - member は message の JSON、score は作成時刻（Unix 秒）
//! - 同じ score 内は member の辞書順
//! - append ごとに上限まで trim し、期限を延長する

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::FeedSettings;
use crate::domain::{FeedStoreError, Message, UserId};
use crate::ports::{Clock, FeedStore, SystemClock};

struct Feed {
    entries: BTreeSet<(i64, String)>,
    expires_at: DateTime<Utc>,
}

pub struct InMemoryFeedStore {
    feeds: Mutex<HashMap<UserId, Feed>>,
    settings: FeedSettings,
    clock: Arc<dyn Clock>,
}

impl InMemoryFeedStore {
    pub fn new(settings: FeedSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: FeedSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            feeds: Mutex::new(HashMap::new()),
            settings,
            clock,
        }
    }

    fn ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.settings.ttl).unwrap_or(chrono::Duration::MAX)
    }

    /// Stored entry count for `user`, ignoring the read limit.
    pub async fn stored_len(&self, user: &UserId) -> usize {
        let now = self.clock.now();
        let feeds = self.feeds.lock().await;
        feeds
            .get(user)
            .filter(|feed| feed.expires_at > now)
            .map_or(0, |feed| feed.entries.len())
    }
}

#[async_trait]
impl FeedStore for InMemoryFeedStore {
    async fn append(&self, user: &UserId, message: &Message) -> Result<(), FeedStoreError> {
        let member = message.to_json_string()?;
        let now = self.clock.now();
        let expires_at = now.checked_add_signed(self.ttl()).unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut feeds = self.feeds.lock().await;
        let feed = feeds.entry(user.clone()).or_insert_with(|| Feed {
            entries: BTreeSet::new(),
            expires_at,
        });

        // 期限切れの key は Redis では消えているので、空から始める
        if feed.expires_at <= now {
            feed.entries.clear();
        }

        feed.entries.insert((message.score(), member));
        while feed.entries.len() > self.settings.max_entries {
            feed.entries.pop_first();
        }
        feed.expires_at = expires_at;

        Ok(())
    }

    async fn read(&self, user: &UserId) -> Result<Vec<Message>, FeedStoreError> {
        let now = self.clock.now();
        let mut feeds = self.feeds.lock().await;

        let Some(feed) = feeds.get(user) else {
            return Ok(Vec::new());
        };
        if feed.expires_at <= now {
            feeds.remove(user);
            return Ok(Vec::new());
        }

        let messages = feed
            .entries
            .iter()
            .rev()
            .take(self.settings.read_limit)
            .filter_map(|(_, member)| match Message::from_json(member.as_bytes()) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(user = %user, error = %e, "skipping undecodable feed entry");
                    None
                }
            })
            .collect();

        Ok(messages)
    }
}
