use std::sync::Arc;

use tessera_client::{InventoryApi, ReleaseHold, ReservationApi};
use tessera_core::{Event, EventDetail, ReservationStatus, WorkerError};

/// Handles `reservation.expired`: the hold is released back to inventory,
/// then the reservation is marked EXPIRED.
pub struct ExpiredHandler {
    inventory: Arc<dyn InventoryApi>,
    reservation: Arc<dyn ReservationApi>,
}

impl ExpiredHandler {
    pub fn new(inventory: Arc<dyn InventoryApi>, reservation: Arc<dyn ReservationApi>) -> Self {
        Self {
            inventory,
            reservation,
        }
    }

    pub async fn handle(&self, event: &Event) -> Result<(), WorkerError> {
        let EventDetail::Expired(detail) = &event.detail else {
            return Err(WorkerError::InvalidPayload(
                "detail does not match reservation.expired".into(),
            ));
        };

        // Order matters: the constrained resource is freed before the status
        // update, which is reconcilable later.
        self.inventory
            .release_hold(ReleaseHold {
                event_id: event.event_id.clone(),
                reservation_id: event.reservation_id.clone(),
                quantity: detail.quantity,
                seat_ids: detail.seat_ids.clone(),
            })
            .await?;

        self.reservation
            .update_status(&event.reservation_id, ReservationStatus::Expired, None)
            .await?;

        tracing::info!(
            reservation_id = %event.reservation_id,
            event_id = %event.event_id,
            quantity = detail.quantity,
            seats = detail.seat_ids.len(),
            "expired reservation released"
        );
        Ok(())
    }
}
