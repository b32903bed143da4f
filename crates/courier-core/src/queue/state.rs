//! Event state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Event status.
///
/// State transitions:
/// - Pending -> InFlight -> Completed
/// - Pending -> InFlight -> Pending (retry, while attempts < max_retries)
/// - Pending -> InFlight -> Failed (retry budget exhausted)
/// - InFlight -> Pending (native offline signal, or recovered after restart)
/// - Failed -> Pending (operator `retry_failed`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Waiting for a delivery attempt.
    Pending,

    /// A delivery attempt is outstanding.
    InFlight,

    /// Delivered. Never retried.
    Completed,

    /// Retry budget exhausted. Only an operator can resume it.
    Failed,
}

impl EventStatus {
    /// Is this event eligible for the delivery loop?
    pub fn is_runnable(self) -> bool {
        matches!(self, EventStatus::Pending)
    }

    /// Does the retention policy apply to this event?
    pub fn is_prunable(self) -> bool {
        matches!(self, EventStatus::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::InFlight => "in_flight",
            EventStatus::Completed => "completed",
            EventStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
