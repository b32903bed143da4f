//! Errors - エラー型と分類
//!
//! None of these are fatal to the host. Delivery errors become state
//! transitions plus notices; storage errors are logged and swallowed by the
//! queue store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// ErrorKind は host アプリケーションに通知するエラー分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Destination returned a non-success outcome.
    DeliveryRejected,
    /// Transport failure, exception or timeout.
    DeliveryError,
    /// Retry budget spent; the event moved to `failed`.
    RetryExhausted,
    /// Snapshot could not be written or read.
    PersistenceError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::DeliveryRejected => "delivery-rejected",
            ErrorKind::DeliveryError => "delivery-error",
            ErrorKind::RetryExhausted => "retry-exhausted",
            ErrorKind::PersistenceError => "persistence-error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a `QueueStorage` implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::PersistenceError
    }
}

/// Errors from queue lifecycle calls (`start`).
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("no delivery adapter configured")]
    NoDeliveryAdapter,

    #[error("delivery loop already started")]
    AlreadyStarted,

    #[error("start() must be called from within a tokio runtime")]
    NoRuntime,
}
