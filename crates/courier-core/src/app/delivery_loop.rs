//! DeliveryLoop - 配送ループ
//!
//! # フロー
//! 1. wake / tick / shutdown を select で待つ
//! 2. online の間、pending を 1 件ずつ取り出す（single-flight）
//! 3. Pending → InFlight (attempts += 1) → persist
//! 4. DeliveryAdapter::send を delivery_timeout で包んで実行
//! 5. 結果を反映: Completed / Pending (retry) / Failed
//! 6. success_delay または backoff を挟んで次へ
//!
//! The loop is the only writer of `InFlight`, so single-flight holds as long
//! as exactly one loop task runs per queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use super::manager::Shared;
use crate::domain::{DeliveryFailure, DeliveryOutcome, EventEnvelope, EventId, EventType, QueueNotice};
use crate::queue::{Decision, EventStatus};

/// Main loop. Exits once shutdown is requested.
pub(crate) async fn run(shared: Arc<Shared>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = interval(shared.config.processing_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut consecutive_failures = 0u32;

    info!(
        interval_ms = shared.config.processing_interval_ms,
        "Delivery loop started"
    );

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        drain(&shared, &mut shutdown_rx, &mut consecutive_failures).await;

        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            _ = shutdown_rx.changed() => {}
            _ = shared.wake.notified() => {}
            _ = ticker.tick() => {}
        }
    }

    info!("Delivery loop stopped");
}

/// The in-flight attempt, as captured when it started.
struct Attempt {
    id: EventId,
    event_type: EventType,
    attempts: u32,
    envelope: EventEnvelope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finished {
    Delivered,
    Failed,
    /// The event was demoted or removed while the call was outstanding and
    /// the outcome no longer applies.
    Superseded,
}

/// Deliver pending events one at a time while online.
async fn drain(
    shared: &Shared,
    shutdown_rx: &mut watch::Receiver<bool>,
    consecutive_failures: &mut u32,
) {
    loop {
        if *shutdown_rx.borrow() || !shared.is_online() {
            return;
        }

        let Some(attempt) = begin_attempt(shared) else {
            return;
        };

        let outcome = deliver(shared, &attempt).await;

        let pause = match finish_attempt(shared, &attempt, outcome) {
            Finished::Delivered => {
                *consecutive_failures = 0;
                shared.policy.success_delay
            }
            Finished::Failed => {
                *consecutive_failures = consecutive_failures.saturating_add(1);
                shared.policy.backoff(*consecutive_failures)
            }
            Finished::Superseded => shared.policy.success_delay,
        };

        if !shared.is_online() || !shared.store.lock().has_pending() {
            return;
        }

        if !pause_or_shutdown(pause, shutdown_rx).await {
            return;
        }
    }
}

/// Sleep for `pause`. False if shutdown arrived first.
async fn pause_or_shutdown(pause: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    if pause.is_zero() {
        return true;
    }
    tokio::select! {
        _ = shutdown_rx.changed() => false,
        _ = tokio::time::sleep(pause) => true,
    }
}

/// Pick the next pending event and mark it in flight.
///
/// A pending event whose budget is already used up (its last attempt was
/// interrupted by an offline signal or a restart) goes straight to failed.
fn begin_attempt(shared: &Shared) -> Option<Attempt> {
    shared.with_store(|store| {
        let id = loop {
            let next = store.next_pending()?;
            if shared.policy.decide(next.attempts) == Decision::Retry {
                break next.id;
            }
            let (id, event_type, attempts) = (next.id, next.event_type.clone(), next.attempts);
            store.mutate(id, |event, now| {
                let detail = event
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "interrupted attempt used the last retry".to_string());
                event.mark_failed(detail, now);
            });
            error!(
                event_id = %id,
                event_type = %event_type,
                attempts,
                "Retry budget exhausted, event failed"
            );
            store.push_notice(QueueNotice::RetryExhausted {
                id,
                event_type,
                attempts,
            });
        };
        shared.set_in_progress(true);
        store.mutate(id, |event, now| event.start_attempt(now));

        let event = store.get(id)?;
        debug!(
            event_id = %id,
            event_type = %event.event_type,
            priority = %event.priority,
            attempts = event.attempts,
            "Selected event for delivery"
        );
        Some(Attempt {
            id,
            event_type: event.event_type.clone(),
            attempts: event.attempts,
            envelope: event.envelope(),
        })
    })
}

async fn deliver(shared: &Shared, attempt: &Attempt) -> DeliveryOutcome {
    let Some(delivery) = shared.delivery.as_ref() else {
        return Err(DeliveryFailure::transport("no delivery adapter configured"));
    };

    let timeout = shared.config.delivery_timeout();
    match tokio::time::timeout(timeout, delivery.send(&attempt.envelope)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(DeliveryFailure::timeout(timeout.as_millis() as u64)),
    }
}

/// Apply the outcome to the store and emit notices.
fn finish_attempt(shared: &Shared, attempt: &Attempt, outcome: DeliveryOutcome) -> Finished {
    shared.set_in_progress(false);

    match outcome {
        Ok(()) => shared.with_store(|store| {
            if store.get(attempt.id).is_none() {
                debug!(event_id = %attempt.id, "Delivered event no longer queued");
                store.mark_changed();
                return Finished::Superseded;
            }

            // a demoted event that still got through counts as delivered
            store.mutate(attempt.id, |event, now| event.mark_completed(now));
            if store.prune_completed() > 0 {
                store.persist();
            }

            info!(
                event_id = %attempt.id,
                event_type = %attempt.event_type,
                attempts = attempt.attempts,
                "Event delivered"
            );
            store.push_notice(QueueNotice::Delivered {
                id: attempt.id,
                event_type: attempt.event_type.clone(),
                attempts: attempt.attempts,
            });
            Finished::Delivered
        }),

        Err(failure) => {
            if failure.is_connectivity_loss() {
                let transition = shared.tracker.lock().connectivity_lost();
                shared.apply_transition(transition);
            }

            shared.with_store(|store| {
                let still_in_flight = store
                    .get(attempt.id)
                    .is_some_and(|e| e.status == EventStatus::InFlight);
                if !still_in_flight {
                    debug!(
                        event_id = %attempt.id,
                        error = %failure,
                        "Late failure for interrupted attempt ignored"
                    );
                    store.mark_changed();
                    return Finished::Superseded;
                }

                let detail = failure.to_string();
                let decision = shared.policy.decide(attempt.attempts);
                match decision {
                    Decision::Retry => {
                        store.mutate(attempt.id, |event, now| event.requeue(detail.clone(), now));
                        warn!(
                            event_id = %attempt.id,
                            event_type = %attempt.event_type,
                            attempts = attempt.attempts,
                            kind = %failure.kind(),
                            error = %failure,
                            "Delivery failed, will retry"
                        );
                    }
                    Decision::GiveUp => {
                        store.mutate(attempt.id, |event, now| {
                            event.mark_failed(detail.clone(), now)
                        });
                        error!(
                            event_id = %attempt.id,
                            event_type = %attempt.event_type,
                            attempts = attempt.attempts,
                            error = %failure,
                            "Retry budget exhausted, event failed"
                        );
                    }
                }

                store.push_notice(QueueNotice::DeliveryFailed {
                    id: attempt.id,
                    event_type: attempt.event_type.clone(),
                    kind: failure.kind(),
                    detail,
                    attempts: attempt.attempts,
                    will_retry: decision == Decision::Retry,
                });
                if decision == Decision::GiveUp {
                    store.push_notice(QueueNotice::RetryExhausted {
                        id: attempt.id,
                        event_type: attempt.event_type.clone(),
                        attempts: attempt.attempts,
                    });
                }
                Finished::Failed
            })
        }
    }
}
