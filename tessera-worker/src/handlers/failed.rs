use std::sync::Arc;

use tessera_client::{InventoryApi, ReleaseHold, ReservationApi};
use tessera_core::{Event, EventDetail, ReservationStatus, WorkerError};

/// Handles `payment.failed`: the reservation is cancelled, then the hold is
/// released when the payload carries enough data to address it. Without seat
/// ids the release is skipped and the expiry reaper reclaims the hold.
pub struct FailedHandler {
    inventory: Arc<dyn InventoryApi>,
    reservation: Arc<dyn ReservationApi>,
}

impl FailedHandler {
    pub fn new(inventory: Arc<dyn InventoryApi>, reservation: Arc<dyn ReservationApi>) -> Self {
        Self {
            inventory,
            reservation,
        }
    }

    pub async fn handle(&self, event: &Event) -> Result<(), WorkerError> {
        let EventDetail::Failed(detail) = &event.detail else {
            return Err(WorkerError::InvalidPayload(
                "detail does not match payment.failed".into(),
            ));
        };

        self.reservation
            .update_status(&event.reservation_id, ReservationStatus::Cancelled, None)
            .await?;

        if !detail.seat_ids.is_empty() {
            self.inventory
                .release_hold(ReleaseHold {
                    event_id: event.event_id.clone(),
                    reservation_id: event.reservation_id.clone(),
                    quantity: detail.quantity,
                    seat_ids: detail.seat_ids.clone(),
                })
                .await?;
        }

        tracing::info!(
            reservation_id = %event.reservation_id,
            event_id = %event.event_id,
            payment_intent_id = %detail.payment_intent_id,
            error_code = detail.error_code.as_deref().unwrap_or(""),
            released = !detail.seat_ids.is_empty(),
            "payment failed, reservation cancelled"
        );
        Ok(())
    }
}
