//! In-memory queue with real visibility-timeout semantics.
//!
//! Backs integration tests and local development. A received message is
//! hidden for the visibility window and becomes receivable again afterwards
//! unless deleted; receipt handles rotate per delivery, so a stale receipt
//! can no longer delete the message.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use tessera_core::ReceiptHandle;

use crate::{EventQueue, QueueError, ReceivedMessage};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct StoredMessage {
    message_id: String,
    body: String,
    attributes: HashMap<String, String>,
    receive_count: u32,
    invisible_until: Option<Instant>,
    receipt: Option<ReceiptHandle>,
}

impl StoredMessage {
    fn is_visible(&self, now: Instant) -> bool {
        self.invisible_until.map_or(true, |until| until <= now)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryQueue {
    messages: Mutex<Vec<StoredMessage>>,
    deleted: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

fn poison_err<T>(_: PoisonError<T>) -> QueueError {
    QueueError::Transport("queue lock poisoned".into())
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a raw message body, returning its message id.
    pub fn push(&self, body: impl Into<String>) -> String {
        self.push_with_attributes(body, HashMap::new())
    }

    /// Enqueues a message body together with transport attributes.
    pub fn push_with_attributes(
        &self,
        body: impl Into<String>,
        attributes: HashMap<String, String>,
    ) -> String {
        let message_id = format!("msg-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        messages.push(StoredMessage {
            message_id: message_id.clone(),
            body: body.into(),
            attributes,
            receive_count: 0,
            invisible_until: None,
            receipt: None,
        });
        message_id
    }

    /// Message ids deleted so far, in deletion order.
    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn delete_count(&self) -> usize {
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of messages still on the queue, visible or not.
    pub fn len(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collapses every in-flight visibility window, as if the timeout had
    /// elapsed. Outstanding receipts become stale.
    pub fn expire_visibility(&self) {
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        for message in messages.iter_mut() {
            message.invisible_until = None;
            message.receipt = None;
        }
    }

    fn try_receive(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let now = Instant::now();
        let mut messages = self.messages.lock().map_err(poison_err)?;
        let mut batch = Vec::new();
        for message in messages.iter_mut() {
            if batch.len() >= max_messages {
                break;
            }
            if !message.is_visible(now) {
                continue;
            }
            let receipt = ReceiptHandle::new(Uuid::new_v4().to_string());
            message.receive_count += 1;
            message.invisible_until = Some(now + visibility_timeout);
            message.receipt = Some(receipt.clone());
            batch.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                body: message.body.clone(),
                receipt_handle: receipt,
                receive_count: message.receive_count,
                attributes: message.attributes.clone(),
            });
        }
        Ok(batch)
    }
}

#[async_trait]
impl EventQueue for InMemoryQueue {
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let deadline = Instant::now() + wait;
        loop {
            let batch = self.try_receive(max_messages, visibility_timeout)?;
            if !batch.is_empty() || Instant::now() >= deadline {
                return Ok(batch);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let now = Instant::now();
        let mut messages = self.messages.lock().map_err(poison_err)?;
        let position = messages.iter().position(|message| {
            message.receipt.as_ref() == Some(receipt) && !message.is_visible(now)
        });
        match position {
            Some(index) => {
                let removed = messages.remove(index);
                drop(messages);
                self.deleted
                    .lock()
                    .map_err(poison_err)?
                    .push(removed.message_id);
                Ok(())
            }
            None => Err(QueueError::ReceiptExpired),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receive_hides_message_for_visibility_window() {
        let queue = InMemoryQueue::new();
        queue.push(r#"{"n":1}"#);

        let first = queue
            .receive(10, Duration::ZERO, Duration::from_secs(30))
            .await
            .expect("receive");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].receive_count, 1);

        // Still in flight, so a second receive comes back empty.
        let second = queue
            .receive(10, Duration::ZERO, Duration::from_secs(30))
            .await
            .expect("receive");
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn expired_visibility_redelivers_with_fresh_receipt() {
        let queue = InMemoryQueue::new();
        queue.push(r#"{"n":1}"#);

        let first = queue
            .receive(10, Duration::ZERO, Duration::from_secs(30))
            .await
            .expect("receive");
        let stale = first[0].receipt_handle.clone();

        queue.expire_visibility();

        let second = queue
            .receive(10, Duration::ZERO, Duration::from_secs(30))
            .await
            .expect("receive");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].receive_count, 2);
        assert_ne!(second[0].receipt_handle, stale);

        // The rotated-out receipt no longer deletes.
        assert!(matches!(
            queue.delete(&stale).await,
            Err(QueueError::ReceiptExpired)
        ));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_message_exactly_once() {
        let queue = InMemoryQueue::new();
        let id = queue.push(r#"{"n":1}"#);

        let batch = queue
            .receive(10, Duration::ZERO, Duration::from_secs(30))
            .await
            .expect("receive");
        let receipt = batch[0].receipt_handle.clone();

        queue.delete(&receipt).await.expect("delete");
        assert_eq!(queue.deleted_ids(), vec![id]);
        assert!(queue.is_empty());

        assert!(matches!(
            queue.delete(&receipt).await,
            Err(QueueError::ReceiptExpired)
        ));
        assert_eq!(queue.delete_count(), 1);
    }

    #[tokio::test]
    async fn batch_is_capped_at_max_messages() {
        let queue = InMemoryQueue::new();
        for n in 0..15 {
            queue.push(format!(r#"{{"n":{n}}}"#));
        }

        let batch = queue
            .receive(10, Duration::ZERO, Duration::from_secs(30))
            .await
            .expect("receive");
        assert_eq!(batch.len(), 10);
    }

    #[tokio::test]
    async fn attributes_travel_with_every_delivery() {
        let queue = InMemoryQueue::new();
        queue.push_with_attributes(
            r#"{"n":1}"#,
            HashMap::from([("TraceId".to_string(), "trace-9".to_string())]),
        );

        let batch = queue
            .receive(10, Duration::ZERO, Duration::from_secs(30))
            .await
            .expect("receive");
        assert_eq!(batch[0].trace_id(), Some("trace-9"));

        queue.expire_visibility();
        let redelivered = queue
            .receive(10, Duration::ZERO, Duration::from_secs(30))
            .await
            .expect("receive");
        assert_eq!(redelivered[0].trace_id(), Some("trace-9"));
    }

    #[tokio::test]
    async fn long_poll_picks_up_late_arrivals() {
        let queue = std::sync::Arc::new(InMemoryQueue::new());
        let producer = std::sync::Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            producer.push(r#"{"late":true}"#);
        });

        let batch = queue
            .receive(10, Duration::from_secs(2), Duration::from_secs(30))
            .await
            .expect("receive");
        assert_eq!(batch.len(), 1);
    }
}
