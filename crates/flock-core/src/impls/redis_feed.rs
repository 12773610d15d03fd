//! RedisFeedStore - sorted set による本番用 timeline
//!
//! key: `timeline:<user>` / score: 作成時刻（Unix 秒） / member: message の JSON
//!
//! append は 1 つの atomic pipeline で実行する:
//! `ZADD` → `ZREMRANGEBYRANK key 0 -(max+1)` → `EXPIRE key ttl`

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use crate::config::FeedSettings;
use crate::domain::{FeedStoreError, Message, UserId};
use crate::ports::FeedStore;

const TIMELINE_PREFIX: &str = "timeline:";

/// Redis-backed feed store with automatic reconnection.
#[derive(Clone)]
pub struct RedisFeedStore {
    conn: ConnectionManager,
    settings: FeedSettings,
}

impl RedisFeedStore {
    /// Connect to Redis (`redis://` or `rediss://`).
    pub async fn connect(url: &str, settings: FeedSettings) -> Result<Self, FeedStoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, settings })
    }

    pub fn timeline_key(user: &UserId) -> String {
        format!("{TIMELINE_PREFIX}{user}")
    }

    /// Stop rank for `ZREMRANGEBYRANK key 0 <stop>` keeping the newest `max_entries`.
    ///
    /// isize に収まらない上限は「何も削除しない」に丸める。
    fn trim_stop(max_entries: usize) -> isize {
        isize::try_from(max_entries).map_or(isize::MIN, |max| -max - 1)
    }

    /// Stop rank for `ZREVRANGE key 0 <stop>`. `None` when nothing should be read.
    fn read_stop(read_limit: usize) -> Option<isize> {
        if read_limit == 0 {
            return None;
        }
        // -1 は末尾まで（全件）
        Some(isize::try_from(read_limit - 1).unwrap_or(-1))
    }

    fn ttl_secs(&self) -> i64 {
        self.settings.ttl.as_secs().max(1) as i64
    }
}

#[async_trait]
impl FeedStore for RedisFeedStore {
    async fn append(&self, user: &UserId, message: &Message) -> Result<(), FeedStoreError> {
        let key = Self::timeline_key(user);
        let member = message.to_json_string()?;
        let mut conn = self.conn.clone();

        let _: () = redis::pipe()
            .atomic()
            .zadd(&key, &member, message.score())
            .ignore()
            .zremrangebyrank(&key, 0, Self::trim_stop(self.settings.max_entries))
            .ignore()
            .expire(&key, self.ttl_secs())
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(user = %user, message_id = %message.id(), "appended to timeline");
        Ok(())
    }

    async fn read(&self, user: &UserId) -> Result<Vec<Message>, FeedStoreError> {
        let Some(stop) = Self::read_stop(self.settings.read_limit) else {
            return Ok(Vec::new());
        };
        let key = Self::timeline_key(user);
        let mut conn = self.conn.clone();

        let members: Vec<String> = conn.zrevrange(&key, 0, stop).await?;

        let messages = members
            .iter()
            .filter_map(|member| match Message::from_json(member.as_bytes()) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(user = %user, error = %e, "skipping undecodable timeline entry");
                    None
                }
            })
            .collect();

        Ok(messages)
    }
}
