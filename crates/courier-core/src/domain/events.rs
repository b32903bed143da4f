//! Events - host アプリケーションへの通知
//!
//! Every observable thing the queue does is reported as a `QueueNotice` to the
//! injected `EventSink`. The host decides whether and how to surface them.

use serde::{Deserialize, Serialize};

use super::{ErrorKind, EventId, EventType, Priority, QueueStats};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum QueueNotice {
    /// Contents or flags changed; carries the stats after the change.
    QueueChanged(QueueStats),

    Delivered {
        id: EventId,
        event_type: EventType,
        attempts: u32,
    },

    DeliveryFailed {
        id: EventId,
        event_type: EventType,
        kind: ErrorKind,
        detail: String,
        attempts: u32,
        will_retry: bool,
    },

    RetryExhausted {
        id: EventId,
        event_type: EventType,
        attempts: u32,
    },

    /// Dropped to make room under `max_queue_size`.
    Evicted { id: EventId, priority: Priority },

    ConnectivityChanged { online: bool },

    PersistenceFailed { detail: String },
}

impl QueueNotice {
    /// Error bucket for failure notices, `None` otherwise.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            QueueNotice::DeliveryFailed { kind, .. } => Some(*kind),
            QueueNotice::RetryExhausted { .. } => Some(ErrorKind::RetryExhausted),
            QueueNotice::PersistenceFailed { .. } => Some(ErrorKind::PersistenceError),
            _ => None,
        }
    }
}
