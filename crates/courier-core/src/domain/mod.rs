//! Domain model (ids, event types, priorities, envelopes, outcomes, notices).

pub mod envelope;
pub mod errors;
pub mod event_type;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod priority;
pub mod stats;

pub use self::envelope::EventEnvelope;
pub use self::errors::{ErrorKind, QueueError, StorageError};
pub use self::event_type::EventType;
pub use self::events::QueueNotice;
pub use self::ids::{EventId, IdParseError};
pub use self::outcome::{DeliveryFailure, DeliveryOutcome};
pub use self::priority::{Priority, PriorityParseError};
pub use self::stats::QueueStats;
