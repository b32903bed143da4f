//! EventSink port - host アプリケーションへの通知
//!
//! # 実装
//! - NoopEventSink: 何もしない
//! - ChannelEventSink: tokio mpsc に流す
//! - CallbackSink: queue-changed / success / failure のコールバック

use crate::domain::QueueNotice;

/// EventSink はキューの通知を受け取る
///
/// Called outside the queue's internal lock, so an implementation may call
/// back into the queue (e.g. `stats()`). It must not block for long: it runs
/// on the caller's thread or inside the delivery loop.
pub trait EventSink: Send + Sync {
    fn notify(&self, notice: &QueueNotice);
}
