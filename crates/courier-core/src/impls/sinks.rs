//! EventSink implementations.

use tokio::sync::mpsc;

use crate::domain::{QueueNotice, QueueStats};
use crate::ports::EventSink;

/// 何もしない（通知が不要な host 用）
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn notify(&self, _notice: &QueueNotice) {}
}

/// Forwards every notice into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<QueueNotice>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<QueueNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn notify(&self, notice: &QueueNotice) {
        // receiver may already be dropped
        let _ = self.tx.send(notice.clone());
    }
}

type Hook<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Callback hooks for queue-changed / success / failure.
///
/// `on_failure` receives every failure-shaped notice: delivery failures,
/// retry exhaustion and persistence errors.
#[derive(Default)]
pub struct CallbackSink {
    on_queue_changed: Option<Hook<QueueStats>>,
    on_success: Option<Hook<QueueNotice>>,
    on_failure: Option<Hook<QueueNotice>>,
}

impl CallbackSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_queue_changed(mut self, f: impl Fn(&QueueStats) + Send + Sync + 'static) -> Self {
        self.on_queue_changed = Some(Box::new(f));
        self
    }

    pub fn on_success(mut self, f: impl Fn(&QueueNotice) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_failure(mut self, f: impl Fn(&QueueNotice) + Send + Sync + 'static) -> Self {
        self.on_failure = Some(Box::new(f));
        self
    }
}

impl EventSink for CallbackSink {
    fn notify(&self, notice: &QueueNotice) {
        match notice {
            QueueNotice::QueueChanged(stats) => {
                if let Some(f) = &self.on_queue_changed {
                    f(stats);
                }
            }
            QueueNotice::Delivered { .. } => {
                if let Some(f) = &self.on_success {
                    f(notice);
                }
            }
            _ if notice.error_kind().is_some() => {
                if let Some(f) = &self.on_failure {
                    f(notice);
                }
            }
            _ => {}
        }
    }
}
