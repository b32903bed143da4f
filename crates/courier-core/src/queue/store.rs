//! Queue store: ordered event list, eviction, retention and persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Event, EventStatus};
use crate::domain::{ErrorKind, EventId, Priority, QueueNotice, QueueStats, StorageError};
use crate::ports::{Clock, QueueStorage};

/// Bumped whenever the persisted shape changes incompatibly.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Persisted form of the queue. Always a value copy, never shared with the
/// live list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedQueue {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub events: Vec<Event>,
}

/// What `load()` found in storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub restored: usize,
    /// In-flight records demoted to pending.
    pub demoted: usize,
    /// Completed records dropped by retention.
    pub pruned: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub storage_key: String,
    pub max_queue_size: usize,
    /// Completed events kept for diagnostics.
    pub completed_retention: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            storage_key: "event_queue".to_string(),
            max_queue_size: 1000,
            completed_retention: 100,
        }
    }
}

/// Ordered collection of events.
///
/// Design:
/// - `events` keeps arrival order within each priority class. A high event
///   goes ahead of pending normal/low ones but never ahead of an earlier high
///   one; `next_pending` takes the first pending high in list order.
/// - Every mutating call persists afterwards. Persistence is best-effort: a
///   failed save is logged and turned into a notice, the in-memory list stays
///   authoritative.
/// - Notices are buffered here and drained by the owner after it releases its
///   lock, so sinks never run under the lock.
pub struct QueueStore {
    events: Vec<Event>,
    storage: Arc<dyn QueueStorage>,
    clock: Arc<dyn Clock>,
    settings: StoreSettings,
    notices: Vec<QueueNotice>,
    changed: bool,
}

impl QueueStore {
    pub fn new(
        storage: Arc<dyn QueueStorage>,
        clock: Arc<dyn Clock>,
        settings: StoreSettings,
    ) -> Self {
        Self {
            events: Vec::new(),
            storage,
            clock,
            settings,
            notices: Vec::new(),
            changed: false,
        }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Restore from storage, replacing whatever is in memory.
    ///
    /// An unreadable snapshot is logged and treated as empty.
    pub fn load(&mut self) -> LoadReport {
        let key = self.settings.storage_key.clone();
        let snapshot = match self.storage.load(&key) {
            Ok(Some(raw)) => match serde_json::from_str::<PersistedQueue>(&raw) {
                Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => Some(snapshot),
                Ok(snapshot) => {
                    self.persistence_failed(format!(
                        "unsupported snapshot version {} under {key}",
                        snapshot.version
                    ));
                    None
                }
                Err(e) => {
                    self.persistence_failed(format!("unreadable snapshot under {key}: {e}"));
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                self.persistence_failed(format!("load failed for {key}: {e}"));
                None
            }
        };

        let mut report = LoadReport::default();
        self.events = snapshot.map(|s| s.events).unwrap_or_default();
        report.restored = self.events.len();

        let now = self.clock.now();
        for event in &mut self.events {
            if event.status == EventStatus::InFlight {
                event.demote(now);
                report.demoted += 1;
            }
        }
        report.pruned = self.prune_completed();

        if report.demoted > 0 || report.pruned > 0 {
            self.persist();
        }
        self.changed = true;

        info!(
            storage_key = %key,
            restored = report.restored,
            demoted = report.demoted,
            pruned = report.pruned,
            "Queue restored"
        );
        report
    }

    /// Place an event by priority, evicting to stay within `max_queue_size`.
    ///
    /// Returns the ids of evicted events.
    pub fn insert(&mut self, event: Event) -> Vec<EventId> {
        let mut evicted = Vec::new();
        while self.events.len() >= self.settings.max_queue_size {
            let Some(victim) = self.evict_one() else {
                break;
            };
            warn!(
                event_id = %victim.id,
                priority = %victim.priority,
                status = %victim.status,
                "Queue full, evicted event"
            );
            self.notices.push(QueueNotice::Evicted {
                id: victim.id,
                priority: victim.priority,
            });
            evicted.push(victim.id);
        }

        let index = self.insertion_index(event.priority);
        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            priority = %event.priority,
            position = index,
            "Enqueued event"
        );
        self.events.insert(index, event);
        self.changed = true;
        self.persist();
        evicted
    }

    /// Apply a transition to one event. No-op (returns false) if absent.
    pub fn mutate<F>(&mut self, id: EventId, f: F) -> bool
    where
        F: FnOnce(&mut Event, DateTime<Utc>),
    {
        let now = self.clock.now();
        let Some(event) = self.events.iter_mut().find(|e| e.id == id) else {
            return false;
        };
        f(event, now);
        self.changed = true;
        self.persist();
        true
    }

    /// Delete one event. In-flight events cannot be removed.
    pub fn remove(&mut self, id: EventId) -> bool {
        let Some(index) = self.events.iter().position(|e| e.id == id) else {
            return false;
        };
        if self.events[index].status == EventStatus::InFlight {
            debug!(event_id = %id, "Refusing to remove in-flight event");
            return false;
        }
        self.events.remove(index);
        self.changed = true;
        self.persist();
        true
    }

    /// Delete completed events, or everything except the in-flight event.
    ///
    /// Returns the number of removed events.
    pub fn clear(&mut self, only_completed: bool) -> usize {
        let before = self.events.len();
        self.events.retain(|e| {
            if only_completed {
                e.status != EventStatus::Completed
            } else {
                e.status == EventStatus::InFlight
            }
        });
        let removed = before - self.events.len();
        if removed > 0 {
            self.changed = true;
            self.persist();
        }
        removed
    }

    /// Reset every failed event to pending with a fresh budget.
    pub fn reset_failed(&mut self) -> usize {
        let now = self.clock.now();
        let mut reset = 0;
        for event in self.events.iter_mut().filter(|e| e.status == EventStatus::Failed) {
            event.reset_for_retry(now);
            reset += 1;
        }
        if reset > 0 {
            self.changed = true;
            self.persist();
        }
        reset
    }

    /// Demote the in-flight event (if any) back to pending.
    pub fn demote_in_flight(&mut self) -> Option<EventId> {
        let id = self.in_flight()?.id;
        self.mutate(id, |e, now| e.demote(now));
        Some(id)
    }

    /// Drop the oldest completed events beyond the retention limit.
    pub fn prune_completed(&mut self) -> usize {
        let mut completed: Vec<(DateTime<Utc>, EventId)> = self
            .events
            .iter()
            .filter(|e| e.status.is_prunable())
            .map(|e| (e.completed_at.unwrap_or(e.updated_at), e.id))
            .collect();
        if completed.len() <= self.settings.completed_retention {
            return 0;
        }

        // newest first; everything after the retention window goes
        completed.sort_by(|a, b| b.0.cmp(&a.0));
        let doomed: Vec<EventId> = completed
            .into_iter()
            .skip(self.settings.completed_retention)
            .map(|(_, id)| id)
            .collect();

        self.events.retain(|e| !doomed.contains(&e.id));
        self.changed = true;
        doomed.len()
    }

    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.events.iter().find(|e| e.id == id)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn in_flight(&self) -> Option<&Event> {
        self.events.iter().find(|e| e.status == EventStatus::InFlight)
    }

    /// Next event for the delivery loop: first pending high, else first
    /// pending of the shared normal/low FIFO.
    pub fn next_pending(&self) -> Option<&Event> {
        let mut pending = self.events.iter().filter(|e| e.status.is_runnable());
        let first = pending.next()?;
        if first.priority == Priority::High {
            return Some(first);
        }
        pending
            .find(|e| e.priority == Priority::High)
            .or(Some(first))
    }

    pub fn has_pending(&self) -> bool {
        self.events.iter().any(|e| e.status.is_runnable())
    }

    pub fn pending_len(&self) -> usize {
        self.events.iter().filter(|e| e.status.is_runnable()).count()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for event in &self.events {
            match event.status {
                EventStatus::Pending => counts.pending += 1,
                EventStatus::InFlight => counts.in_flight += 1,
                EventStatus::Completed => counts.completed += 1,
                EventStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn stats(&self, online: bool, in_progress: bool) -> QueueStats {
        let counts = self.counts();
        QueueStats {
            total: self.events.len(),
            pending: counts.pending,
            in_flight: counts.in_flight,
            completed: counts.completed,
            failed: counts.failed,
            online,
            in_progress,
        }
    }

    pub fn snapshot(&self) -> PersistedQueue {
        PersistedQueue {
            version: SNAPSHOT_VERSION,
            saved_at: self.clock.now(),
            events: self.events.clone(),
        }
    }

    /// Write the current state. Errors are logged, never returned.
    pub fn persist(&mut self) {
        let key = self.settings.storage_key.clone();
        let result = serde_json::to_string(&self.snapshot())
            .map_err(StorageError::from)
            .and_then(|raw| self.storage.save(&key, &raw));
        if let Err(e) = result {
            self.persistence_failed(format!("save failed for {key}: {e}"));
        }
    }

    /// Queue a notice for the owner to dispatch.
    pub fn push_notice(&mut self, notice: QueueNotice) {
        self.notices.push(notice);
    }

    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    pub fn drain_notices(&mut self) -> Vec<QueueNotice> {
        std::mem::take(&mut self.notices)
    }

    /// Whether anything changed since the last call.
    pub fn take_changed(&mut self) -> bool {
        std::mem::replace(&mut self.changed, false)
    }

    fn persistence_failed(&mut self, detail: String) {
        warn!(kind = %ErrorKind::PersistenceError, error = %detail, "Persistence failed");
        self.notices.push(QueueNotice::PersistenceFailed { detail });
    }

    /// High: right after the last high event still waiting or in flight, so
    /// high events keep their arrival order even when a requeued normal event
    /// sits between them. With none, ahead of the first pending normal/low.
    fn insertion_index(&self, priority: Priority) -> usize {
        if priority != Priority::High {
            return self.events.len();
        }
        if let Some(last) = self.events.iter().rposition(|e| {
            e.priority == Priority::High
                && matches!(e.status, EventStatus::Pending | EventStatus::InFlight)
        }) {
            return last + 1;
        }
        self.events
            .iter()
            .position(|e| e.status == EventStatus::Pending)
            .unwrap_or(self.events.len())
    }

    /// Oldest pending low-priority event, else the oldest event that is not
    /// in flight. Failed events count as candidates in the fallback: they
    /// compete with completed ones purely by age.
    fn evict_one(&mut self) -> Option<Event> {
        let index = self
            .events
            .iter()
            .position(|e| e.status == EventStatus::Pending && e.priority == Priority::Low)
            .or_else(|| {
                self.events
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.status != EventStatus::InFlight)
                    .min_by_key(|(_, e)| e.created_at)
                    .map(|(i, _)| i)
            })?;
        self.changed = true;
        Some(self.events.remove(index))
    }
}
