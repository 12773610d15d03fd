//! Process configuration.
//!
//! Values come from environment variables (`FlockConfig::from_env`). Every
//! variable has a default so the pipeline runs with in-memory collaborators
//! when nothing is set.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Broker connection settings (Kafka).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Comma separated `host:port` list.
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            topic: "message_events".to_string(),
            group_id: "flock-fanout".to_string(),
        }
    }
}

/// Feed store window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    /// Entries kept per user; older ones are trimmed on append.
    pub max_entries: usize,
    /// Sliding expiry, refreshed on every append.
    pub ttl: Duration,
    /// Entries returned by a read.
    pub read_limit: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            max_entries: 500,
            ttl: Duration::from_secs(7 * 24 * 60 * 60),
            read_limit: 100,
        }
    }
}

/// Publish-retry settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishSettings {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    /// Deadline of the detached publish task.
    pub timeout: Duration,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterSettings {
    pub capacity: usize,
    pub reprocess_interval: Duration,
}

impl Default for DeadLetterSettings {
    fn default() -> Self {
        Self {
            capacity: 100,
            reprocess_interval: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlockConfig {
    pub broker: BrokerConfig,
    /// `None` selects the in-memory feed store.
    pub redis_url: Option<String>,
    pub feed: FeedSettings,
    pub publish: PublishSettings,
    pub dead_letter: DeadLetterSettings,
    pub message_max_chars: usize,
}

impl Default for FlockConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            redis_url: None,
            feed: FeedSettings::default(),
            publish: PublishSettings::default(),
            dead_letter: DeadLetterSettings::default(),
            message_max_chars: 140,
        }
    }
}

impl FlockConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup (environment, map in tests, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let broker = BrokerConfig {
            brokers: text("KAFKA_BROKERS", &defaults.broker.brokers),
            topic: text("KAFKA_TOPIC", &defaults.broker.topic),
            group_id: text("KAFKA_GROUP_ID", &defaults.broker.group_id),
        };

        let feed = FeedSettings {
            max_entries: positive(&lookup, "FEED_MAX_ENTRIES", defaults.feed.max_entries)?,
            ttl: Duration::from_secs(positive(
                &lookup,
                "FEED_TTL_SECS",
                defaults.feed.ttl.as_secs(),
            )?),
            read_limit: positive(&lookup, "FEED_READ_LIMIT", defaults.feed.read_limit)?,
        };

        let publish = PublishSettings {
            max_attempts: positive(
                &lookup,
                "PUBLISH_MAX_ATTEMPTS",
                defaults.publish.max_attempts,
            )?,
            base_delay: Duration::from_millis(parse(
                &lookup,
                "PUBLISH_BASE_DELAY_MS",
                defaults.publish.base_delay.as_millis() as u64,
            )?),
            multiplier: defaults.publish.multiplier,
            timeout: Duration::from_secs(positive(
                &lookup,
                "PUBLISH_TIMEOUT_SECS",
                defaults.publish.timeout.as_secs(),
            )?),
        };

        let dead_letter = DeadLetterSettings {
            capacity: positive(&lookup, "DLQ_CAPACITY", defaults.dead_letter.capacity)?,
            reprocess_interval: Duration::from_secs(positive(
                &lookup,
                "DLQ_REPROCESS_INTERVAL_SECS",
                defaults.dead_letter.reprocess_interval.as_secs(),
            )?),
        };

        Ok(Self {
            broker,
            redis_url: lookup("REDIS_URL").filter(|v| !v.trim().is_empty()),
            feed,
            publish,
            dead_letter,
            message_max_chars: positive(
                &lookup,
                "MESSAGE_MAX_CHARS",
                defaults.message_max_chars,
            )?,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn positive<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let value = parse(lookup, key, default)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
