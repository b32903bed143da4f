//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 配送（ネットワーク）、永続化（ストレージ）、通知（コールバック）、
//! 時刻と ID 生成はすべて注入され、キュー本体は実装の詳細を知りません。

pub mod clock;
pub mod delivery;
pub mod event_sink;
pub mod id_generator;
pub mod storage;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::delivery::DeliveryAdapter;
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::storage::QueueStorage;
