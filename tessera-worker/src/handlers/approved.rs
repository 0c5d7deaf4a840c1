use std::sync::Arc;

use tessera_client::{CommitReservation, InventoryApi, ReservationApi};
use tessera_core::{Event, EventDetail, ReservationStatus, WorkerError};

/// Handles `payment.approved`: the reservation is confirmed, then the hold is
/// committed in inventory when the payload pins concrete seats. A payload
/// without seat ids means capacity was already committed when the hold was
/// created, so there is nothing to commit here.
pub struct ApprovedHandler {
    inventory: Arc<dyn InventoryApi>,
    reservation: Arc<dyn ReservationApi>,
}

impl ApprovedHandler {
    pub fn new(inventory: Arc<dyn InventoryApi>, reservation: Arc<dyn ReservationApi>) -> Self {
        Self {
            inventory,
            reservation,
        }
    }

    pub async fn handle(&self, event: &Event) -> Result<(), WorkerError> {
        let EventDetail::Approved(detail) = &event.detail else {
            return Err(WorkerError::InvalidPayload(
                "detail does not match payment.approved".into(),
            ));
        };

        self.reservation
            .update_status(
                &event.reservation_id,
                ReservationStatus::Confirmed,
                detail.order_id.as_deref(),
            )
            .await?;

        if !detail.seat_ids.is_empty() {
            self.inventory
                .commit_reservation(CommitReservation {
                    event_id: event.event_id.clone(),
                    reservation_id: event.reservation_id.clone(),
                    quantity: detail.quantity,
                    seat_ids: detail.seat_ids.clone(),
                    payment_intent_id: detail.payment_intent_id.clone(),
                })
                .await?;
        }

        tracing::info!(
            reservation_id = %event.reservation_id,
            event_id = %event.event_id,
            payment_intent_id = %detail.payment_intent_id,
            amount = detail.amount,
            committed = !detail.seat_ids.is_empty(),
            "payment approved, reservation confirmed"
        );
        Ok(())
    }
}
