//! Transactional persistence substrate for the inventory engine.
//!
//! Every engine operation runs inside one [`InventoryTx`]: it reads and locks
//! the rows it needs, mutates them, and commits. Dropping a transaction
//! without calling [`InventoryTx::commit`] rolls it back, so an early `?`
//! return never leaves a partial write behind.
//!
//! Two implementations exist:
//! - [`InMemoryInventoryStore`]: one tokio mutex held for the whole
//!   transaction (fully serialised), for tests and local runs.
//! - [`PostgresInventoryStore`]: row-level `SELECT … FOR UPDATE` locks, so
//!   writers on different stock lines proceed in parallel.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use stockledger_core::{InventoryError, ProductId, ReservationId, SupplierId, TransferId};
use stockledger_inventory::{MovementEntry, Reservation, StockKey, StockLine, Transfer};
use stockledger_parties::{Supplier, TaxId};
use stockledger_products::Product;
use stockledger_purchasing::Purchase;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;

/// Persistence failure.
///
/// These are infrastructure errors, as opposed to the business conditions in
/// [`InventoryError`]. All of them surface to callers as the transient
/// `Storage` category.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend unreachable, pool closed, timeout.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Unique constraint or serialization failure; retrying may succeed.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// A stored row could not be decoded into a domain record.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<StoreError> for InventoryError {
    fn from(err: StoreError) -> Self {
        InventoryError::storage(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Factory for transactions.
#[async_trait]
pub trait InventoryStore: Send + Sync + 'static {
    type Tx: InventoryTx;

    async fn begin(&self) -> StoreResult<Self::Tx>;
}

/// Typed repository functions available inside one transaction.
///
/// `lock_*` methods take a row lock held until commit/rollback; the plain
/// readers do not lock.
#[async_trait]
pub trait InventoryTx: Send {
    // Catalog
    async fn product(&mut self, id: ProductId) -> StoreResult<Option<Product>>;
    async fn put_product(&mut self, product: &Product) -> StoreResult<()>;

    // Stock lines
    /// Lock the line for `key`, creating a zero baseline row if absent.
    async fn lock_stock_line(&mut self, key: &StockKey) -> StoreResult<StockLine>;
    async fn stock_line(&mut self, key: &StockKey) -> StoreResult<Option<StockLine>>;
    /// Persist a line previously returned by [`InventoryTx::lock_stock_line`].
    async fn put_stock_line(&mut self, line: &StockLine) -> StoreResult<()>;
    async fn stock_lines_for_product(&mut self, product_id: ProductId) -> StoreResult<Vec<StockLine>>;
    /// Lines with a positive minimum whose `available` is at or below it.
    async fn low_stock_lines(&mut self) -> StoreResult<Vec<StockLine>>;

    // Ledger
    async fn insert_movement(&mut self, entry: &MovementEntry) -> StoreResult<()>;
    /// Newest first.
    async fn recent_movements(
        &mut self,
        product_id: ProductId,
        limit: usize,
    ) -> StoreResult<Vec<MovementEntry>>;
    /// Oldest first.
    async fn movements_for_line(&mut self, key: &StockKey) -> StoreResult<Vec<MovementEntry>>;

    // Reservations
    async fn reservation(&mut self, id: ReservationId) -> StoreResult<Option<Reservation>>;
    async fn lock_reservation(&mut self, id: ReservationId) -> StoreResult<Option<Reservation>>;
    async fn put_reservation(&mut self, reservation: &Reservation) -> StoreResult<()>;
    async fn active_reservations_for_transaction(
        &mut self,
        linked_transaction_id: Uuid,
    ) -> StoreResult<Vec<ReservationId>>;
    /// Active reservations whose deadline (`expires_at`, or `created_at +
    /// default_ttl` when unset) is before `now`, oldest deadline first.
    async fn expired_reservation_candidates(
        &mut self,
        now: DateTime<Utc>,
        default_ttl: Duration,
        limit: usize,
    ) -> StoreResult<Vec<ReservationId>>;

    // Transfers
    async fn transfer(&mut self, id: TransferId) -> StoreResult<Option<Transfer>>;
    async fn lock_transfer(&mut self, id: TransferId) -> StoreResult<Option<Transfer>>;
    async fn put_transfer(&mut self, transfer: &Transfer) -> StoreResult<()>;

    // Suppliers and purchases
    async fn supplier(&mut self, id: SupplierId) -> StoreResult<Option<Supplier>>;
    async fn supplier_by_tax_id(&mut self, tax_id: &TaxId) -> StoreResult<Option<Supplier>>;
    async fn put_supplier(&mut self, supplier: &Supplier) -> StoreResult<()>;
    async fn insert_purchase(&mut self, purchase: &Purchase) -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>;
    async fn rollback(self) -> StoreResult<()>;
}
