use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::CodecError;
use super::ids::{MessageId, UserId};

/// A posted message. Created once at ingestion and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    author: UserId,
    body: String,
    created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(id: MessageId, author: UserId, body: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            author,
            body: body.into(),
            created_at,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn author(&self) -> &UserId {
        &self.author
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Feed ordering score: creation time in Unix seconds.
    pub fn score(&self) -> i64 {
        self.created_at.timestamp()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(CodecError::Encode)
    }

    pub fn to_json_string(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Encode)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Decode)
    }
}

/// "message created" の通知を運ぶ封筒。
///
/// routing key は author。broker 側で author ごとに同じ partition に
/// 振り分けられるので、同一 author のイベント順序は保たれる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    key: UserId,
    payload: Vec<u8>,
}

impl EventEnvelope {
    pub fn new(key: UserId, payload: Vec<u8>) -> Self {
        Self { key, payload }
    }

    pub fn for_message(message: &Message) -> Result<Self, CodecError> {
        Ok(Self::new(message.author().clone(), message.to_json()?))
    }

    pub fn key(&self) -> &UserId {
        &self.key
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn decode(&self) -> Result<Message, CodecError> {
        Message::from_json(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn sample() -> Message {
        Message::new(
            MessageId::from_ulid(Ulid::new()),
            UserId::new("alice"),
            "hello",
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn score_is_unix_seconds() {
        let message = sample();
        assert_eq!(message.score(), 1_704_110_400);
    }

    #[test]
    fn envelope_is_keyed_by_author() {
        let message = sample();
        let envelope = EventEnvelope::for_message(&message).unwrap();
        assert_eq!(envelope.key().as_str(), "alice");
        assert_eq!(envelope.decode().unwrap(), message);
    }

    #[test]
    fn json_uses_rfc3339_timestamps() {
        let json: serde_json::Value = serde_json::from_slice(&sample().to_json().unwrap()).unwrap();
        assert_eq!(json["author"], "alice");
        assert_eq!(json["body"], "hello");
        assert_eq!(json["created_at"], "2024-01-01T12:00:00Z");
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let envelope = EventEnvelope::new(UserId::new("alice"), b"not json".to_vec());
        assert!(matches!(envelope.decode(), Err(CodecError::Decode(_))));
    }
}
