use serde::{Deserialize, Serialize};

/// Aggregate counts per status plus the loop flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
    /// Current connectivity belief.
    pub online: bool,
    /// A delivery call is outstanding.
    pub in_progress: bool,
}

impl QueueStats {
    /// Nothing left for the loop to do.
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.in_flight == 0 && !self.in_progress
    }
}
