//! `stockledger-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the error taxonomy and decimal quantity helpers.

pub mod error;
pub mod id;
pub mod quantity;

pub use error::{InventoryError, InventoryResult};
pub use id::{
    LocationId, MovementId, ProductId, PurchaseId, ReservationId, SupplierId, TransferId, UserId,
    WarehouseId,
};
pub use quantity::{
    COST_SCALE, ensure_checked, ensure_cost, ensure_positive, ensure_storable, max_amount,
    weighted_average,
};

pub use rust_decimal::Decimal;
