//! Queue module: event records, state machine, retry policy and the store.

mod record;
mod retry;
mod state;
mod store;

pub use record::Event;
pub use retry::{Decision, RetryPolicy};
pub use state::EventStatus;
pub use store::{
    LoadReport, PersistedQueue, QueueStore, SNAPSHOT_VERSION, StatusCounts, StoreSettings,
};
