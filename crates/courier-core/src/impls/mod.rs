//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryStorage**: 揮発ストレージ（テスト・デモ用）
//! - **FileStorage**: key ごとの JSON ファイル
//! - **HttpDelivery**: reqwest による HTTP 配送
//! - **NoopEventSink / ChannelEventSink / CallbackSink**: 通知先

pub mod file_storage;
pub mod http_delivery;
pub mod memory_storage;
pub mod sinks;

pub use self::file_storage::FileStorage;
pub use self::http_delivery::{HttpDelivery, HttpDeliveryConfig};
pub use self::memory_storage::InMemoryStorage;
pub use self::sinks::{CallbackSink, ChannelEventSink, NoopEventSink};
