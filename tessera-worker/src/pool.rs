//! Bounded worker pool. Exactly N long-lived workers drain one shared
//! channel; whichever worker is free takes the next event, so no per-worker
//! routing exists. The worker owns its event from receive to outcome and is
//! the only place a successful event is acknowledged.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};

use tessera_core::{Event, WorkerError};
use tessera_queue::EventQueue;

use crate::dispatch::Dispatcher;
use crate::metrics;
use crate::poller::VISIBILITY_TIMEOUT;
use crate::shutdown::{Shutdown, ShutdownListener};

/// Kept between the per-event deadline and the visibility window so a delete
/// still lands before the receipt rotates.
const DEADLINE_MARGIN: Duration = Duration::from_secs(5);

pub struct WorkerPool {
    concurrency: usize,
    events_rx: Arc<Mutex<mpsc::Receiver<Event>>>,
    dispatcher: Arc<Dispatcher>,
    queue: Arc<dyn EventQueue>,
    shutdown: Shutdown,
}

impl WorkerPool {
    pub fn new(
        concurrency: usize,
        events_rx: mpsc::Receiver<Event>,
        dispatcher: Arc<Dispatcher>,
        queue: Arc<dyn EventQueue>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            concurrency,
            events_rx: Arc::new(Mutex::new(events_rx)),
            dispatcher,
            queue,
            shutdown,
        }
    }

    /// Spawns the workers and waits for all of them to exit.
    pub async fn run(self) {
        metrics::set_workers_active(self.concurrency);
        tracing::info!(concurrency = self.concurrency, "worker pool started");

        let mut handles = Vec::with_capacity(self.concurrency);
        for worker_id in 0..self.concurrency {
            let worker = Worker {
                worker_id,
                events_rx: Arc::clone(&self.events_rx),
                dispatcher: Arc::clone(&self.dispatcher),
                queue: Arc::clone(&self.queue),
                stop: self.shutdown.subscribe(),
            };
            handles.push(tokio::spawn(worker.run()));
        }

        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "worker task aborted");
            }
        }

        metrics::set_workers_active(0);
        tracing::info!("worker pool stopped");
    }
}

struct Worker {
    worker_id: usize,
    events_rx: Arc<Mutex<mpsc::Receiver<Event>>>,
    dispatcher: Arc<Dispatcher>,
    queue: Arc<dyn EventQueue>,
    stop: ShutdownListener,
}

impl Worker {
    async fn run(mut self) {
        tracing::debug!(worker_id = self.worker_id, "worker started");
        loop {
            let event = {
                let mut events = self.events_rx.lock().await;
                tokio::select! {
                    biased;
                    _ = self.stop.recv() => None,
                    event = events.recv() => event,
                }
            };
            let Some(event) = event else { break };
            self.process(event).await;
        }
        tracing::debug!(worker_id = self.worker_id, "worker stopped");
    }

    async fn process(&self, event: Event) {
        let deadline = Instant::now() + (VISIBILITY_TIMEOUT - DEADLINE_MARGIN);
        tracing::info!(
            worker_id = self.worker_id,
            event_type = %event.event_type,
            reservation_id = %event.reservation_id,
            event_id = %event.event_id,
            trace_id = event.trace_id.as_deref().unwrap_or(""),
            "processing event"
        );

        // The dispatch runs on its own task so a panicking handler surfaces
        // as a JoinError here instead of taking the worker down with it.
        let dispatcher = Arc::clone(&self.dispatcher);
        let dispatched = event.clone();
        let outcome = tokio::spawn(async move { dispatcher.dispatch(&dispatched, deadline).await })
            .await
            .unwrap_or_else(|join_err| {
                let err = WorkerError::Internal(join_err.to_string());
                metrics::record_outcome(event.event_type.as_str(), err.outcome());
                Err(err)
            });

        match outcome {
            Ok(()) => {
                // The business effect stands even if the ack fails; the
                // redelivered copy relies on downstream idempotency.
                if let Err(err) = self.queue.delete(&event.receipt).await {
                    tracing::error!(
                        worker_id = self.worker_id,
                        reservation_id = %event.reservation_id,
                        event_id = %event.event_id,
                        error = %err,
                        "failed to delete acknowledged message"
                    );
                }
            }
            Err(err) => {
                tracing::error!(
                    worker_id = self.worker_id,
                    reservation_id = %event.reservation_id,
                    event_id = %event.event_id,
                    error = %err,
                    "event abandoned for redelivery"
                );
            }
        }
    }
}
