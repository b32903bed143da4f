//! Delivery outcome model.
//!
//! The delivery adapter classifies every failed attempt. The queue only looks
//! at two things: success vs failure, and whether the adapter says the failure
//! means the network itself is gone.

use serde::{Deserialize, Serialize};

use super::errors::ErrorKind;

/// Result of a single delivery attempt.
pub type DeliveryOutcome = Result<(), DeliveryFailure>;

/// Structured failure returned by a delivery adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryFailure {
    /// The destination answered with a non-success status.
    #[error("destination rejected the event (status {status})")]
    Rejected {
        status: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },

    /// The request never produced a response.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        /// Set by the adapter when the failure means the network is unreachable.
        #[serde(default)]
        connectivity_lost: bool,
    },

    /// No answer within the delivery timeout.
    #[error("delivery timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

impl DeliveryFailure {
    pub fn rejected(status: u16, body: Option<String>) -> Self {
        Self::Rejected { status, body }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            connectivity_lost: false,
        }
    }

    pub fn connectivity_lost(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            connectivity_lost: true,
        }
    }

    pub fn timeout(elapsed_ms: u64) -> Self {
        Self::Timeout { elapsed_ms }
    }

    /// Taxonomy bucket reported to the host application.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeliveryFailure::Rejected { .. } => ErrorKind::DeliveryRejected,
            DeliveryFailure::Transport { .. } | DeliveryFailure::Timeout { .. } => {
                ErrorKind::DeliveryError
            }
        }
    }

    pub fn is_connectivity_loss(&self) -> bool {
        matches!(
            self,
            DeliveryFailure::Transport {
                connectivity_lost: true,
                ..
            }
        )
    }
}
