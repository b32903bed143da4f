//! App - アプリケーション層
//!
//! このモジュールは、ports と queue を組み合わせて公開 API を実装します。
//!
//! # 主要コンポーネント
//! - **QueueConfig**: 設定（JSON、デフォルト値、検証）
//! - **EventQueueBuilder**: ports の注入と起動時検証
//! - **EventQueue**: 公開 API（enqueue / status / stats / remove / clear / retry_failed）
//! - **DeliveryLoop**: pending を 1 件ずつ配送するループ

pub mod builder;
pub mod config;
mod delivery_loop;
pub mod manager;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, EventQueueBuilder};
pub use self::config::{ConfigError, QueueConfig};
pub use self::manager::{EnqueueOptions, EventQueue};
