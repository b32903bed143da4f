//! EventQueueBuilder - キューの構築とワイヤリング
//!
//! # 方針
//! - ports はすべて注入。未指定なら開発用のデフォルト実装を使う
//! - build() で設定を検証（Fail-fast）
//! - build() で永続化スナップショットを読み込む

use std::sync::Arc;

use super::config::{ConfigError, QueueConfig};
use super::manager::EventQueue;
use crate::connectivity::ConnectivityTracker;
use crate::domain::QueueNotice;
use crate::impls::{InMemoryStorage, NoopEventSink};
use crate::ports::{Clock, DeliveryAdapter, EventSink, IdGenerator, QueueStorage, SystemClock, UlidGenerator};
use crate::queue::QueueStore;

/// EventQueueBuilder は EventQueue を構築
///
/// # 使用例
/// ```ignore
/// let queue = EventQueueBuilder::new()
///     .config(QueueConfig::from_json_file("courier.json")?)
///     .storage(Arc::new(FileStorage::new(".courier")))
///     .delivery(Arc::new(my_adapter))
///     .build()?;
/// ```
///
/// # デフォルト
/// - storage: `InMemoryStorage`
/// - sink: `NoopEventSink`
/// - clock: `SystemClock`
/// - id_generator: `UlidGenerator` over the clock
/// - delivery: none (`start()` fails until one is set)
#[derive(Default)]
pub struct EventQueueBuilder {
    config: QueueConfig,
    storage: Option<Arc<dyn QueueStorage>>,
    delivery: Option<Arc<dyn DeliveryAdapter>>,
    sink: Option<Arc<dyn EventSink>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

/// BuildError はキュー構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EventQueueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn storage(mut self, storage: Arc<dyn QueueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn delivery(mut self, delivery: Arc<dyn DeliveryAdapter>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Validate, restore the persisted snapshot and wire everything up.
    ///
    /// The delivery loop is not started; call `EventQueue::start()`.
    pub fn build(self) -> Result<EventQueue, BuildError> {
        self.config.validate()?;

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let storage: Arc<dyn QueueStorage> = self
            .storage
            .unwrap_or_else(|| Arc::new(InMemoryStorage::new()));
        let sink: Arc<dyn EventSink> = self.sink.unwrap_or_else(|| Arc::new(NoopEventSink));

        let mut store = QueueStore::new(storage, Arc::clone(&clock), self.config.store_settings());
        let load_report = store.load();

        let tracker = ConnectivityTracker::new(self.config.assume_online, &self.config.service_name);

        // load 中の通知（PersistenceFailed など）をここで流す
        let mut notices = store.drain_notices();
        if store.take_changed() {
            notices.push(QueueNotice::QueueChanged(
                store.stats(tracker.is_online(), false),
            ));
        }
        for notice in &notices {
            sink.notify(notice);
        }

        Ok(EventQueue::from_parts(
            store,
            tracker,
            self.delivery,
            sink,
            clock,
            ids,
            self.config,
            load_report,
        ))
    }
}
