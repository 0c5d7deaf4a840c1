//! Routing plus the per-event retry state machine.
//!
//! One dispatch owns an event's whole attempt sequence: attempts are strictly
//! serial, backoff sleeps are cancellable, and the loop never recurses so a
//! chronically failing event cannot grow the stack.

use std::time::Instant;

use tessera_core::{Event, Outcome, WorkerError};

use crate::handlers::Handlers;
use crate::metrics;
use crate::retry::RetryPolicy;
use crate::shutdown::Shutdown;

pub struct Dispatcher {
    handlers: Handlers,
    policy: RetryPolicy,
    shutdown: Shutdown,
}

impl Dispatcher {
    pub fn new(handlers: Handlers, policy: RetryPolicy, shutdown: Shutdown) -> Self {
        Self {
            handlers,
            policy,
            shutdown,
        }
    }

    /// Runs the event to a terminal outcome, bounded by `deadline` and the
    /// shutdown signal. Returns `Ok` only when a handler attempt succeeded;
    /// the caller must not acknowledge the message otherwise.
    pub async fn dispatch(&self, event: &Event, deadline: Instant) -> Result<(), WorkerError> {
        let started = Instant::now();
        let event_type = event.event_type.as_str();
        let mut stop = self.shutdown.subscribe();
        let mut attempt: u32 = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return self.terminal(event, started, attempt, WorkerError::Cancelled);
            }

            tracing::debug!(
                event_type,
                reservation_id = %event.reservation_id,
                event_id = %event.event_id,
                attempt,
                "attempting event"
            );

            let result = tokio::select! {
                biased;
                _ = stop.recv() => Err(WorkerError::Cancelled),
                outcome = tokio::time::timeout(remaining, self.handlers.handle(event)) => {
                    outcome.unwrap_or(Err(WorkerError::Cancelled))
                }
            };

            match result {
                Ok(()) => {
                    metrics::record_outcome(event_type, Outcome::Success);
                    metrics::record_latency(event_type, started.elapsed());
                    tracing::info!(
                        event_type,
                        reservation_id = %event.reservation_id,
                        event_id = %event.event_id,
                        attempts = attempt + 1,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "event processed"
                    );
                    return Ok(());
                }
                Err(err) if !err.is_retryable() || attempt >= self.policy.max_retries => {
                    return self.terminal(event, started, attempt, err);
                }
                Err(err) => {
                    metrics::record_outcome(event_type, Outcome::Retried);
                    let delay = self.policy.delay_for_attempt(attempt);
                    tracing::warn!(
                        event_type,
                        reservation_id = %event.reservation_id,
                        event_id = %event.event_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, backing off"
                    );

                    let sleep_for = delay.min(deadline.saturating_duration_since(Instant::now()));
                    tokio::select! {
                        biased;
                        _ = stop.recv() => {
                            return self.terminal(event, started, attempt, WorkerError::Cancelled);
                        }
                        _ = tokio::time::sleep(sleep_for) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    fn terminal(
        &self,
        event: &Event,
        started: Instant,
        attempt: u32,
        err: WorkerError,
    ) -> Result<(), WorkerError> {
        let event_type = event.event_type.as_str();
        metrics::record_outcome(event_type, err.outcome());
        metrics::record_latency(event_type, started.elapsed());
        tracing::error!(
            event_type,
            reservation_id = %event.reservation_id,
            event_id = %event.event_id,
            attempts = attempt + 1,
            outcome = %err.outcome(),
            error = %err,
            "event processing failed"
        );
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use tessera_client::mock::{MockInventory, MockReservation};
    use tessera_core::event::ExpiredDetail;
    use tessera_core::{EventDetail, EventType, ReceiptHandle};

    struct Fixture {
        inventory: Arc<MockInventory>,
        reservation: Arc<MockReservation>,
        shutdown: Shutdown,
        dispatcher: Dispatcher,
    }

    fn fixture(max_retries: u32, base: Duration) -> Fixture {
        let inventory = Arc::new(MockInventory::new());
        let reservation = Arc::new(MockReservation::new());
        let shutdown = Shutdown::new();
        let handlers = Handlers::new(inventory.clone(), reservation.clone());
        let dispatcher = Dispatcher::new(
            handlers,
            RetryPolicy::new(max_retries, base),
            shutdown.clone(),
        );
        Fixture {
            inventory,
            reservation,
            shutdown,
            dispatcher,
        }
    }

    fn expired_event() -> Event {
        Event {
            id: "msg-1".into(),
            event_type: EventType::ReservationExpired,
            reservation_id: "rsv_1".into(),
            event_id: "evt_1".into(),
            timestamp: None,
            trace_id: None,
            detail: EventDetail::Expired(ExpiredDetail {
                quantity: 1,
                seat_ids: vec!["A1".into()],
            }),
            receipt: ReceiptHandle::new("rcpt-1"),
        }
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(25)
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let f = fixture(5, Duration::from_millis(10));
        f.dispatcher
            .dispatch(&expired_event(), far_deadline())
            .await
            .expect("dispatch");
        assert_eq!(f.inventory.release_calls().len(), 1);
        assert_eq!(f.reservation.updates().len(), 1);
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let f = fixture(5, Duration::from_millis(10));
        f.inventory.fail_next(2);

        let started = Instant::now();
        f.dispatcher
            .dispatch(&expired_event(), far_deadline())
            .await
            .expect("dispatch");

        // Two failures, one success: three attempts with 10 + 20 ms backoff.
        assert_eq!(f.inventory.release_calls().len(), 3);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn exhausted_retries_return_the_last_error() {
        let f = fixture(2, Duration::from_millis(10));
        f.inventory.fail_always();

        let err = f
            .dispatcher
            .dispatch(&expired_event(), far_deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Downstream { .. }));
        assert_eq!(f.inventory.release_calls().len(), 3);
        assert!(f.reservation.updates().is_empty());
    }

    #[tokio::test]
    async fn zero_max_retries_means_exactly_one_attempt() {
        let f = fixture(0, Duration::from_millis(10));
        f.inventory.fail_always();

        let started = Instant::now();
        let err = f
            .dispatcher
            .dispatch(&expired_event(), far_deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Downstream { .. }));
        assert_eq!(f.inventory.release_calls().len(), 1);
        // No backoff sleep on the single attempt.
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn invalid_payload_is_not_retried() {
        let f = fixture(5, Duration::from_millis(10));
        let mut event = expired_event();
        event.detail = EventDetail::Approved(Default::default());

        let err = f
            .dispatcher
            .dispatch(&event, far_deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::InvalidPayload(_)));
        assert!(f.inventory.calls().is_empty());
    }

    #[tokio::test]
    async fn shutdown_interrupts_the_backoff_sleep() {
        let f = fixture(5, Duration::from_secs(5));
        f.inventory.fail_always();

        let shutdown = f.shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown.trigger();
        });

        let started = Instant::now();
        let err = f
            .dispatcher
            .dispatch(&expired_event(), far_deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(f.inventory.release_calls().len(), 1);
    }

    #[tokio::test]
    async fn elapsed_deadline_cancels_before_any_attempt() {
        let f = fixture(5, Duration::from_millis(10));
        let err = f
            .dispatcher
            .dispatch(&expired_event(), Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Cancelled));
        assert!(f.inventory.calls().is_empty());
    }
}
