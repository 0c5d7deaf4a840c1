//! Scripted in-memory collaborators for tests and local development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use tessera_core::ReservationStatus;

use crate::error::ClientError;
use crate::inventory::{CommitReservation, InventoryApi, ReleaseHold};
use crate::reservation::ReservationApi;

#[derive(Debug, Clone, PartialEq)]
pub enum InventoryCall {
    Release(ReleaseHold),
    Commit(CommitReservation),
}

/// Inventory double that records every call and can be scripted to fail the
/// next N calls or all of them.
#[derive(Debug, Default)]
pub struct MockInventory {
    calls: Mutex<Vec<InventoryCall>>,
    fail_next: AtomicUsize,
    fail_always: AtomicBool,
    panic_next: AtomicBool,
}

impl MockInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` calls fail with a transient error, then calls succeed.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn fail_always(&self) {
        self.fail_always.store(true, Ordering::SeqCst);
    }

    /// The next call panics, simulating a handler bug.
    pub fn panic_once(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<InventoryCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn release_calls(&self) -> Vec<ReleaseHold> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                InventoryCall::Release(request) => Some(request),
                InventoryCall::Commit(_) => None,
            })
            .collect()
    }

    pub fn commit_calls(&self) -> Vec<CommitReservation> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                InventoryCall::Commit(request) => Some(request),
                InventoryCall::Release(_) => None,
            })
            .collect()
    }

    fn record(&self, call: InventoryCall) -> Result<(), ClientError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("scripted inventory panic");
        }
        if self.fail_always.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let scripted = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            });
        if scripted.is_ok() {
            return Err(Self::unavailable());
        }
        Ok(())
    }

    fn unavailable() -> ClientError {
        ClientError::Unavailable {
            service: "inventory",
            message: "scripted failure".into(),
        }
    }
}

#[async_trait]
impl InventoryApi for MockInventory {
    async fn release_hold(&self, request: ReleaseHold) -> Result<(), ClientError> {
        self.record(InventoryCall::Release(request))
    }

    async fn commit_reservation(&self, request: CommitReservation) -> Result<(), ClientError> {
        self.record(InventoryCall::Commit(request))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub reservation_id: String,
    pub status: ReservationStatus,
    pub order_id: Option<String>,
}

/// Reservation double that records status transitions and tracks how many
/// updates run concurrently, for concurrency-bound assertions.
#[derive(Debug, Default)]
pub struct MockReservation {
    updates: Mutex<Vec<StatusUpdate>>,
    statuses: Mutex<HashMap<String, ReservationStatus>>,
    fail_next: AtomicUsize,
    delay: Mutex<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockReservation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Adds an artificial in-call delay so overlap becomes observable.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Highest number of `update_status` calls observed in flight at once.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReservationApi for MockReservation {
    async fn update_status(
        &self,
        reservation_id: &str,
        status: ReservationStatus,
        order_id: Option<&str>,
    ) -> Result<(), ClientError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            });
        if scripted.is_ok() {
            return Err(ClientError::Unavailable {
                service: "reservation",
                message: "scripted failure".into(),
            });
        }

        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StatusUpdate {
                reservation_id: reservation_id.to_string(),
                status,
                order_id: order_id.map(ToString::to_string),
            });
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(reservation_id.to_string(), status);
        Ok(())
    }

    async fn get_status(&self, reservation_id: &str) -> Result<ReservationStatus, ClientError> {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(reservation_id)
            .copied()
            .ok_or(ClientError::Rejected {
                service: "reservation",
                status: 404,
                body: format!("reservation {reservation_id} not found"),
            })
    }
}
