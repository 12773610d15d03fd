//! DeadLetterStore port - 配送できなかった payload の退避先
//!
//! # 実装
//! - **BoundedDeadLetterStore**: 容量付きのインメモリ実装（本番でもこれを使う）

use async_trait::async_trait;

use crate::domain::{DeadLetterCategory, DeadLetterEntry, DeadLetterError, DeadLetterId};

/// DeadLetterStore は失敗したイベントの payload を保持する
///
/// # 設計原則
/// - 容量は固定。満杯時は一番古いエントリを 1 件だけ捨ててから追加する
/// - `drain_all` はスナップショットを返すだけで削除しない
/// - 再処理に成功したエントリは `remove` で取り除く
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn enqueue(
        &self,
        category: DeadLetterCategory,
        payload: Vec<u8>,
    ) -> Result<DeadLetterId, DeadLetterError>;

    /// All current entries, oldest first.
    async fn drain_all(&self) -> Result<Vec<DeadLetterEntry>, DeadLetterError>;

    /// Acknowledge a reprocessed entry. Returns `false` if it was already gone.
    async fn remove(&self, id: DeadLetterId) -> Result<bool, DeadLetterError>;

    async fn len(&self) -> usize;

    fn capacity(&self) -> usize;
}
