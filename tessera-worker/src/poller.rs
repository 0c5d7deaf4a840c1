//! Long-poll receive loop. The poller is the sole owner of the queue's
//! receive operation and the only place a malformed message is deleted.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

use tessera_core::{Event, Outcome};
use tessera_queue::{EventQueue, ReceivedMessage};

use crate::metrics;
use crate::shutdown::{Shutdown, ShutdownListener};

pub const RECEIVE_BATCH_SIZE: usize = 10;
/// Per-attempt processing window granted by the queue.
pub const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);
/// Pause after a failed receive so a broken transport does not spin hot.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(5);
/// Soft limit on waiting for pool capacity before abandoning to redelivery.
const DEFAULT_ENQUEUE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Poller {
    queue: Arc<dyn EventQueue>,
    events_tx: mpsc::Sender<Event>,
    wait: Duration,
    enqueue_timeout: Duration,
    shutdown: Shutdown,
}

impl Poller {
    pub fn new(
        queue: Arc<dyn EventQueue>,
        events_tx: mpsc::Sender<Event>,
        wait: Duration,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            queue,
            events_tx,
            wait,
            enqueue_timeout: DEFAULT_ENQUEUE_TIMEOUT,
            shutdown,
        }
    }

    pub fn with_enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout = timeout;
        self
    }

    /// Polls until shutdown. In-flight messages are never drained on the way
    /// out; they redeliver once their visibility window lapses.
    pub async fn run(self) {
        let mut stop = self.shutdown.subscribe();
        tracing::info!(wait_seconds = self.wait.as_secs(), "poller started");

        loop {
            let received = tokio::select! {
                biased;
                _ = stop.recv() => break,
                received = self
                    .queue
                    .receive(RECEIVE_BATCH_SIZE, self.wait, VISIBILITY_TIMEOUT) => received,
            };

            match received {
                Ok(messages) => {
                    let mut flow = ControlFlow::Continue(());
                    for message in messages {
                        flow = self.process_message(message, &mut stop).await;
                        if flow.is_break() {
                            break;
                        }
                    }
                    if flow.is_break() {
                        break;
                    }
                }
                Err(err) => {
                    metrics::record_poll_error();
                    tracing::error!(error = %err, "queue receive failed");
                    tokio::select! {
                        biased;
                        _ = stop.recv() => break,
                        _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        tracing::info!("poller stopped");
    }

    async fn process_message(
        &self,
        message: ReceivedMessage,
        stop: &mut ShutdownListener,
    ) -> ControlFlow<()> {
        let message_id = message.message_id.clone();

        let mut event = match Event::from_json(&message.body, message.receipt_handle.clone()) {
            Ok(event) => event,
            Err(err) => {
                // A malformed message never becomes well-formed: delete now
                // instead of letting it cycle through redelivery.
                tracing::warn!(
                    message_id = %message_id,
                    error = %err,
                    "discarding malformed message"
                );
                metrics::record_outcome("unknown", Outcome::InvalidPayload);
                if let Err(err) = self.queue.delete(&message.receipt_handle).await {
                    tracing::error!(
                        message_id = %message_id,
                        error = %err,
                        "failed to delete malformed message"
                    );
                }
                return ControlFlow::Continue(());
            }
        };

        // Publishers that cannot touch the body put the correlation id in a
        // message attribute instead.
        if event.trace_id.is_none() {
            event.trace_id = message.trace_id().map(str::to_string);
        }

        tracing::debug!(
            message_id = %message_id,
            event_type = %event.event_type,
            reservation_id = %event.reservation_id,
            event_id = %event.event_id,
            receive_count = message.receive_count,
            "handing event to worker pool"
        );

        tokio::select! {
            biased;
            _ = stop.recv() => ControlFlow::Break(()),
            sent = self.events_tx.send_timeout(event, self.enqueue_timeout) => match sent {
                Ok(()) => ControlFlow::Continue(()),
                Err(SendTimeoutError::Timeout(event)) => {
                    // No ack: the visibility timeout resurfaces the message,
                    // so a full pool throttles the queue instead of memory.
                    metrics::record_pool_saturated();
                    metrics::record_outcome(event.event_type.as_str(), Outcome::Dropped);
                    tracing::warn!(
                        message_id = %message_id,
                        event_type = %event.event_type,
                        "worker pool saturated, leaving message for redelivery"
                    );
                    ControlFlow::Continue(())
                }
                Err(SendTimeoutError::Closed(_)) => ControlFlow::Break(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_queue::InMemoryQueue;

    fn expired_body(reservation: &str) -> String {
        format!(
            r#"{{"id":"msg-{reservation}","type":"reservation.expired","detail":{{"reservation_id":"{reservation}","event_id":"evt-{reservation}","qty":1,"seat_ids":["A1"]}}}}"#
        )
    }

    #[tokio::test]
    async fn forwards_parsed_events_without_deleting() {
        let queue = Arc::new(InMemoryQueue::new());
        queue.push(expired_body("rsv_1"));

        let shutdown = Shutdown::new();
        let (tx, mut rx) = mpsc::channel(4);
        let poller = Poller::new(
            queue.clone(),
            tx,
            Duration::from_millis(100),
            shutdown.clone(),
        );
        let handle = tokio::spawn(poller.run());

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event within deadline")
            .expect("channel open");
        assert_eq!(event.reservation_id, "rsv_1");
        assert_eq!(queue.delete_count(), 0);
        assert_eq!(queue.len(), 1);

        shutdown.trigger();
        handle.await.expect("poller joins");
    }

    #[tokio::test]
    async fn trace_id_attribute_fills_a_missing_envelope_trace() {
        let queue = Arc::new(InMemoryQueue::new());
        queue.push_with_attributes(
            expired_body("rsv_t"),
            std::collections::HashMap::from([(
                "TraceId".to_string(),
                "trace-attr".to_string(),
            )]),
        );

        let shutdown = Shutdown::new();
        let (tx, mut rx) = mpsc::channel(4);
        let poller = Poller::new(
            queue.clone(),
            tx,
            Duration::from_millis(100),
            shutdown.clone(),
        );
        let handle = tokio::spawn(poller.run());

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event within deadline")
            .expect("channel open");
        assert_eq!(event.trace_id.as_deref(), Some("trace-attr"));

        shutdown.trigger();
        handle.await.expect("poller joins");
    }

    #[tokio::test]
    async fn deletes_malformed_messages_immediately() {
        let queue = Arc::new(InMemoryQueue::new());
        queue.push(r#"{"type":"garbage","id":"x"}"#);

        let shutdown = Shutdown::new();
        let (tx, mut rx) = mpsc::channel(4);
        let poller = Poller::new(
            queue.clone(),
            tx,
            Duration::from_millis(100),
            shutdown.clone(),
        );
        let handle = tokio::spawn(poller.run());

        // Poll until the malformed message has been deleted.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while queue.delete_count() == 0 && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(queue.delete_count(), 1);
        assert!(queue.is_empty());

        shutdown.trigger();
        handle.await.expect("poller joins");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn saturation_leaves_messages_unacked() {
        let queue = Arc::new(InMemoryQueue::new());
        queue.push(expired_body("rsv_1"));
        queue.push(expired_body("rsv_2"));

        let shutdown = Shutdown::new();
        // Capacity one and no consumer: the second event cannot be enqueued.
        let (tx, mut rx) = mpsc::channel(1);
        let poller = Poller::new(
            queue.clone(),
            tx,
            Duration::from_millis(100),
            shutdown.clone(),
        )
        .with_enqueue_timeout(Duration::from_millis(50));
        let handle = tokio::spawn(poller.run());

        // Give the poller time to receive both and hit the soft send timeout
        // on the second.
        tokio::time::sleep(Duration::from_millis(400)).await;
        shutdown.trigger();
        handle.await.expect("poller joins");

        // One event made it into the channel, neither was deleted.
        assert!(rx.recv().await.is_some());
        assert_eq!(queue.delete_count(), 0);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn stops_receiving_after_shutdown() {
        let queue = Arc::new(InMemoryQueue::new());
        let shutdown = Shutdown::new();
        let (tx, mut rx) = mpsc::channel(4);
        let poller = Poller::new(
            queue.clone(),
            tx,
            Duration::from_millis(100),
            shutdown.clone(),
        );
        let handle = tokio::spawn(poller.run());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("poller exits promptly")
            .expect("poller joins");

        // Arrivals after shutdown are never received.
        queue.push(expired_body("rsv_late"));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(queue.len(), 1);
    }
}
