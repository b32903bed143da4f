//! QueueStorage port - スナップショットの永続化
//!
//! The queue store serializes its whole state to a string and hands it over
//! under a namespaced key, so several queues can share one backend.
//!
//! # 実装
//! - `impls::InMemoryStorage`（テスト用・揮発）
//! - `impls::FileStorage`（key ごとに JSON ファイル）

use crate::domain::StorageError;

/// QueueStorage は best-effort の永続化
///
/// # 設計原則
/// - 同期 API（store のロック内で呼ばれる、await を跨がない）
/// - 失敗しても in-memory の状態が正（呼び出し側でログして握りつぶす）
pub trait QueueStorage: Send + Sync {
    fn save(&self, key: &str, snapshot: &str) -> Result<(), StorageError>;

    /// `Ok(None)` when nothing was ever saved under `key`.
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;
}
