//! IdGenerator port - message id の発行
//!
//! API ノードごとに調整なしで発行できる ULID を使う。

use crate::domain::ids::MessageId;
use crate::ports::{Clock, SystemClock};
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    fn generate_message_id(&self) -> MessageId;
}

/// 時刻部分を Clock から取る ULID 発行器
///
/// 上位 48 bit が `clock.now()` のミリ秒、残りは乱数。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl Default for UlidGenerator<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_message_id(&self) -> MessageId {
        let millis = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or_default();
        MessageId::from_ulid(Ulid::from_parts(millis, rand::random()))
    }
}
