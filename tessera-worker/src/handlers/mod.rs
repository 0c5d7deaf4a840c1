//! Event handlers: the only layer that knows the compensating workflows.
//! Each handler runs a short, ordered sequence of downstream calls and stops
//! at the first failure; the dispatcher decides whether to retry.

mod approved;
mod expired;
mod failed;

use std::sync::Arc;

pub use approved::ApprovedHandler;
pub use expired::ExpiredHandler;
pub use failed::FailedHandler;

use tessera_client::{InventoryApi, ReservationApi};
use tessera_core::{Event, EventType, WorkerError};

/// Routing table from event type to handler.
pub struct Handlers {
    expired: ExpiredHandler,
    approved: ApprovedHandler,
    failed: FailedHandler,
}

impl Handlers {
    pub fn new(inventory: Arc<dyn InventoryApi>, reservation: Arc<dyn ReservationApi>) -> Self {
        Self {
            expired: ExpiredHandler::new(Arc::clone(&inventory), Arc::clone(&reservation)),
            approved: ApprovedHandler::new(Arc::clone(&inventory), Arc::clone(&reservation)),
            failed: FailedHandler::new(inventory, reservation),
        }
    }

    pub async fn handle(&self, event: &Event) -> Result<(), WorkerError> {
        match event.event_type {
            EventType::ReservationExpired => self.expired.handle(event).await,
            EventType::PaymentApproved => self.approved.handle(event).await,
            EventType::PaymentFailed => self.failed.handle(event).await,
        }
    }
}
