//! Inventory error taxonomy.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::id::{ProductId, ReservationId, SupplierId, TransferId};

/// Result type used across the inventory domain and engine.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Inventory-level error.
///
/// Every variant except [`InventoryError::Storage`] is an expected business
/// condition that callers surface as a 4xx-class response. `Storage` is the
/// transient infrastructure category and is safe to retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("product {0} does not exist or is inactive")]
    ProductNotFound(ProductId),

    #[error("supplier {0} does not exist or is inactive")]
    SupplierNotFound(SupplierId),

    #[error("tax id {tax_id} is already registered to supplier {existing}")]
    DuplicateSupplier { tax_id: String, existing: SupplierId },

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: Decimal,
        available: Decimal,
    },

    #[error("reservation {0} not found")]
    ReservationNotFound(ReservationId),

    #[error("reservation {id} is not active (state: {state})")]
    ReservationNotActive { id: ReservationId, state: String },

    #[error("transfer {0} not found")]
    TransferNotFound(TransferId),

    #[error("transfer {id} is not pending (state: {state})")]
    TransferNotPending { id: TransferId, state: String },

    #[error("product {0} appears more than once in the purchase")]
    DuplicateProductInPurchase(ProductId),

    #[error("quantity must be greater than zero (got {0})")]
    InvalidQuantity(Decimal),

    #[error("an adjustment requires a non-empty reason")]
    MissingAdjustmentReason,

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Persistence substrate failure (unreachable, serialization failure, ...).
    #[error("storage error: {0}")]
    Storage(String),
}

impl InventoryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            InventoryError::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            InventoryError::SupplierNotFound(_) => "SUPPLIER_NOT_FOUND",
            InventoryError::DuplicateSupplier { .. } => "DUPLICATE_SUPPLIER",
            InventoryError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            InventoryError::ReservationNotFound(_) => "RESERVATION_NOT_FOUND",
            InventoryError::ReservationNotActive { .. } => "RESERVATION_NOT_ACTIVE",
            InventoryError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            InventoryError::TransferNotPending { .. } => "TRANSFER_NOT_PENDING",
            InventoryError::DuplicateProductInPurchase(_) => "DUPLICATE_PRODUCT_IN_PURCHASE",
            InventoryError::InvalidQuantity(_) => "INVALID_QUANTITY",
            InventoryError::MissingAdjustmentReason => "MISSING_ADJUSTMENT_REASON",
            InventoryError::Validation(_) => "VALIDATION_ERROR",
            InventoryError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            InventoryError::Storage(_) => "STORAGE_UNAVAILABLE",
        }
    }

    /// Whether retrying the same call may succeed without caller changes.
    pub fn is_transient(&self) -> bool {
        matches!(self, InventoryError::Storage(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            InventoryError::ProductNotFound(_)
                | InventoryError::SupplierNotFound(_)
                | InventoryError::ReservationNotFound(_)
                | InventoryError::TransferNotFound(_)
        )
    }
}
