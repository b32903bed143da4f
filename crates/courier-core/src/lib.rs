//! courier-core
//!
//! Durable outbound event queue: accepts application events, delivers them
//! one at a time to a destination, and survives network loss and restarts.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, event_type, priority, envelope, outcome, errors, events, stats）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, DeliveryAdapter, QueueStorage, EventSink）
//! - **queue**: Queue Store（順序、eviction、retention、永続化）と retry policy
//! - **connectivity**: 接続状態の判断（native signal + health report）
//! - **app**: 設定、builder、配送ループ、公開 API
//! - **impls**: 実装（InMemoryStorage, FileStorage, HttpDelivery, sinks）

pub mod app;
pub mod connectivity;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;

pub use app::{BuildError, ConfigError, EnqueueOptions, EventQueue, EventQueueBuilder, QueueConfig};
pub use connectivity::{ConnectivityTracker, HealthReport, ServiceHealth};
pub use domain::{
    DeliveryFailure, DeliveryOutcome, ErrorKind, EventEnvelope, EventId, EventType, Priority,
    QueueError, QueueNotice, QueueStats,
};
pub use queue::{Event, EventStatus};
