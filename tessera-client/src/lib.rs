//! Typed clients for the worker's two downstream collaborators: the inventory
//! service (seat-hold release and commit) and the reservation service
//! (reservation-state transitions). Both are thin adapters that enforce
//! per-call deadlines and translate transport failures into a classified
//! error, and both are safe to share across all workers.

pub mod error;
pub mod inventory;
pub mod mock;
pub mod reservation;

pub use error::ClientError;
pub use inventory::{CommitReservation, InventoryApi, InventoryClient, ReleaseHold};
pub use reservation::{ReservationApi, ReservationClient};
