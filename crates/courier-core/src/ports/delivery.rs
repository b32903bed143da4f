//! DeliveryAdapter port - 宛先への配送
//!
//! The queue treats "send event" as an opaque async call. Idempotency and
//! authentication are the destination's business.
//!
//! # 実装
//! - `impls::HttpDelivery`（reqwest）
//! - テストではスクリプト化したアダプタを使う

use async_trait::async_trait;

use crate::domain::{DeliveryOutcome, EventEnvelope};

/// DeliveryAdapter は 1 イベントを 1 回だけ送る
///
/// # 設計原則
/// - リトライしない（リトライ判断は delivery loop 側）
/// - 失敗は `DeliveryFailure` で分類して返す
/// - タイムアウトが無い実装でも loop 側で上限をかける
#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
    async fn send(&self, envelope: &EventEnvelope) -> DeliveryOutcome;
}
