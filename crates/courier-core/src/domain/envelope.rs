//! EventEnvelope - 配送アダプタに渡すデータ
//!
//! Value copy of the fields the destination sees. The queue's own bookkeeping
//! (status, attempts) never leaves the process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EventId, EventType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: serde_json::Value,
    /// Enqueue time of the event.
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(
        id: EventId,
        event_type: EventType,
        payload: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            event_type,
            payload,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    #[test]
    fn wire_shape_uses_type_key() {
        let env = EventEnvelope::new(
            EventId::from_ulid(Ulid::new()),
            EventType::new("achievement.unlocked"),
            serde_json::json!({"badge": "first-login"}),
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        );

        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["type"], "achievement.unlocked");
        assert_eq!(v["payload"]["badge"], "first-login");
        assert_eq!(v["timestamp"], "2024-01-01T12:00:00Z");
        assert!(v["id"].as_str().unwrap().starts_with("evt-"));
    }
}
