//! Event record: the unit of work held by the queue store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EventStatus;
use crate::domain::{EventEnvelope, EventId, EventType, Priority};

/// Metadata + payload for an event in the queue.
///
/// Design:
/// - The queue store's `Vec<Event>` is the single source of truth.
/// - All state transitions happen through the methods below; the caller
///   supplies `now` so the store's clock stays injectable.
/// - `status(id)` hands out clones of this struct as snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,

    #[serde(rename = "type")]
    pub event_type: EventType,

    pub payload: serde_json::Value,

    pub priority: Priority,

    pub status: EventStatus,

    /// Delivery attempts made so far (including the current one if in flight).
    pub attempts: u32,

    /// Detail of the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn new(
        id: EventId,
        event_type: EventType,
        payload: serde_json::Value,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            event_type,
            payload,
            priority,
            status: EventStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// What the delivery adapter gets to see.
    pub fn envelope(&self) -> EventEnvelope {
        EventEnvelope::new(
            self.id,
            self.event_type.clone(),
            self.payload.clone(),
            self.created_at,
        )
    }

    /// Mark as in flight. The attempt counts before its outcome is known.
    pub fn start_attempt(&mut self, now: DateTime<Utc>) {
        self.status = EventStatus::InFlight;
        self.attempts += 1;
        self.updated_at = now;
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = EventStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Retry budget exhausted.
    pub fn mark_failed(&mut self, error: String, now: DateTime<Utc>) {
        self.status = EventStatus::Failed;
        self.last_error = Some(error);
        self.updated_at = now;
    }

    /// Failed attempt that still has budget left.
    pub fn requeue(&mut self, error: String, now: DateTime<Utc>) {
        self.status = EventStatus::Pending;
        self.last_error = Some(error);
        self.updated_at = now;
    }

    /// Interrupted attempt (offline signal or restart). `attempts` is kept.
    pub fn demote(&mut self, now: DateTime<Utc>) {
        self.status = EventStatus::Pending;
        self.updated_at = now;
    }

    /// Operator retry: back to a fresh budget.
    pub fn reset_for_retry(&mut self, now: DateTime<Utc>) {
        self.status = EventStatus::Pending;
        self.attempts = 0;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn event() -> Event {
        Event::new(
            EventId::from_ulid(Ulid::new()),
            EventType::new("test"),
            serde_json::json!({}),
            Priority::Normal,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn attempt_increments_before_outcome() {
        let mut e = event();
        let now = e.created_at;
        e.start_attempt(now);
        assert_eq!(e.status, EventStatus::InFlight);
        assert_eq!(e.attempts, 1);

        e.demote(now);
        assert_eq!(e.status, EventStatus::Pending);
        assert_eq!(e.attempts, 1);
    }

    #[test]
    fn reset_for_retry_clears_attempts() {
        let mut e = event();
        let now = e.created_at;
        e.start_attempt(now);
        e.mark_failed("boom".into(), now);
        assert_eq!(e.status, EventStatus::Failed);

        e.reset_for_retry(now);
        assert_eq!(e.status, EventStatus::Pending);
        assert_eq!(e.attempts, 0);
        assert_eq!(e.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn envelope_carries_creation_time() {
        let e = event();
        let env = e.envelope();
        assert_eq!(env.id, e.id);
        assert_eq!(env.timestamp, e.created_at);
    }
}
