//! Inventory domain module.
//!
//! This crate contains the business rules for stock lines, the movement
//! ledger, reservations and warehouse transfers, implemented purely as
//! deterministic domain logic (no IO, no storage). The infra engine loads and
//! locks the records, calls into these types, and persists the results.

pub mod movement;
pub mod reservation;
pub mod stock_line;
pub mod transfer;

pub use movement::{MovementDirection, MovementEntry, MovementKind};
pub use reservation::{Reservation, ReservationState, ReserveStock};
pub use stock_line::{StockDelta, StockKey, StockLine};
pub use transfer::{CancelTransfer, ConfirmTransfer, CreateTransfer, Transfer, TransferState};
