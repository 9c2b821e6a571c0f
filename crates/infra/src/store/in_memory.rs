use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use stockledger_core::{ProductId, ReservationId, SupplierId, TransferId};
use stockledger_inventory::{MovementEntry, Reservation, StockKey, StockLine, Transfer};
use stockledger_parties::{Supplier, TaxId};
use stockledger_products::Product;
use stockledger_purchasing::Purchase;

use super::{InventoryStore, InventoryTx, StoreError, StoreResult};

#[derive(Debug, Clone, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    lines: BTreeMap<StockKey, StockLine>,
    movements: Vec<MovementEntry>,
    reservations: HashMap<ReservationId, Reservation>,
    transfers: HashMap<TransferId, Transfer>,
    suppliers: HashMap<SupplierId, Supplier>,
    purchases: Vec<Purchase>,
}

/// In-memory transactional store.
///
/// Intended for tests/dev. A transaction holds the store mutex until it is
/// committed or dropped and works on a private copy of the state, so
/// transactions are serialisable and a dropped transaction leaves no trace.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a catalog product (outside any transaction).
    pub async fn insert_product(&self, product: Product) {
        self.state.lock().await.products.insert(product.id, product);
    }

    /// Number of ledger entries written so far.
    pub async fn movement_count(&self) -> usize {
        self.state.lock().await.movements.len()
    }

    pub async fn purchases(&self) -> Vec<Purchase> {
        self.state.lock().await.purchases.clone()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(InMemoryTx { guard, staged })
    }
}

/// Transaction over [`InMemoryInventoryStore`].
#[derive(Debug)]
pub struct InMemoryTx {
    guard: OwnedMutexGuard<State>,
    staged: State,
}

fn sorted_by_deadline(mut due: Vec<(DateTime<Utc>, ReservationId)>, limit: usize) -> Vec<ReservationId> {
    due.sort();
    due.into_iter().take(limit).map(|(_, id)| id).collect()
}

#[async_trait]
impl InventoryTx for InMemoryTx {
    async fn product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        Ok(self.staged.products.get(&id).cloned())
    }

    async fn put_product(&mut self, product: &Product) -> StoreResult<()> {
        let taken = self
            .staged
            .products
            .values()
            .any(|p| p.sku == product.sku && p.id != product.id);
        if taken {
            return Err(StoreError::Conflict(format!(
                "sku '{}' already belongs to another product",
                product.sku
            )));
        }
        self.staged.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn lock_stock_line(&mut self, key: &StockKey) -> StoreResult<StockLine> {
        Ok(self
            .staged
            .lines
            .entry(*key)
            .or_insert_with(|| StockLine::empty(*key))
            .clone())
    }

    async fn stock_line(&mut self, key: &StockKey) -> StoreResult<Option<StockLine>> {
        Ok(self.staged.lines.get(key).cloned())
    }

    async fn put_stock_line(&mut self, line: &StockLine) -> StoreResult<()> {
        self.staged.lines.insert(line.key, line.clone());
        Ok(())
    }

    async fn stock_lines_for_product(&mut self, product_id: ProductId) -> StoreResult<Vec<StockLine>> {
        Ok(self
            .staged
            .lines
            .values()
            .filter(|l| l.key.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn low_stock_lines(&mut self) -> StoreResult<Vec<StockLine>> {
        Ok(self
            .staged
            .lines
            .values()
            .filter(|l| l.is_below_minimum())
            .cloned()
            .collect())
    }

    async fn insert_movement(&mut self, entry: &MovementEntry) -> StoreResult<()> {
        if self.staged.movements.iter().any(|m| m.id == entry.id) {
            return Err(StoreError::Conflict(format!(
                "movement {} already recorded",
                entry.id
            )));
        }
        self.staged.movements.push(entry.clone());
        Ok(())
    }

    async fn recent_movements(
        &mut self,
        product_id: ProductId,
        limit: usize,
    ) -> StoreResult<Vec<MovementEntry>> {
        Ok(self
            .staged
            .movements
            .iter()
            .rev()
            .filter(|m| m.product_id == product_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn movements_for_line(&mut self, key: &StockKey) -> StoreResult<Vec<MovementEntry>> {
        Ok(self
            .staged
            .movements
            .iter()
            .filter(|m| m.stock_key == *key)
            .cloned()
            .collect())
    }

    async fn reservation(&mut self, id: ReservationId) -> StoreResult<Option<Reservation>> {
        Ok(self.staged.reservations.get(&id).cloned())
    }

    async fn lock_reservation(&mut self, id: ReservationId) -> StoreResult<Option<Reservation>> {
        Ok(self.staged.reservations.get(&id).cloned())
    }

    async fn put_reservation(&mut self, reservation: &Reservation) -> StoreResult<()> {
        self.staged
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn active_reservations_for_transaction(
        &mut self,
        linked_transaction_id: Uuid,
    ) -> StoreResult<Vec<ReservationId>> {
        let mut active: Vec<_> = self
            .staged
            .reservations
            .values()
            .filter(|r| r.is_active() && r.linked_transaction_id == Some(linked_transaction_id))
            .map(|r| (r.created_at, r.id))
            .collect();
        active.sort();
        Ok(active.into_iter().map(|(_, id)| id).collect())
    }

    async fn expired_reservation_candidates(
        &mut self,
        now: DateTime<Utc>,
        default_ttl: Duration,
        limit: usize,
    ) -> StoreResult<Vec<ReservationId>> {
        let due = self
            .staged
            .reservations
            .values()
            .filter(|r| r.is_expired_at(now, default_ttl))
            .map(|r| (r.expiry_deadline(default_ttl), r.id))
            .collect();
        Ok(sorted_by_deadline(due, limit))
    }

    async fn transfer(&mut self, id: TransferId) -> StoreResult<Option<Transfer>> {
        Ok(self.staged.transfers.get(&id).cloned())
    }

    async fn lock_transfer(&mut self, id: TransferId) -> StoreResult<Option<Transfer>> {
        Ok(self.staged.transfers.get(&id).cloned())
    }

    async fn put_transfer(&mut self, transfer: &Transfer) -> StoreResult<()> {
        self.staged.transfers.insert(transfer.id, transfer.clone());
        Ok(())
    }

    async fn supplier(&mut self, id: SupplierId) -> StoreResult<Option<Supplier>> {
        Ok(self.staged.suppliers.get(&id).cloned())
    }

    async fn supplier_by_tax_id(&mut self, tax_id: &TaxId) -> StoreResult<Option<Supplier>> {
        Ok(self
            .staged
            .suppliers
            .values()
            .find(|s| &s.tax_id == tax_id)
            .cloned())
    }

    async fn put_supplier(&mut self, supplier: &Supplier) -> StoreResult<()> {
        let taken = self
            .staged
            .suppliers
            .values()
            .any(|s| s.tax_id == supplier.tax_id && s.id != supplier.id);
        if taken {
            return Err(StoreError::Conflict(format!(
                "tax id {} already registered",
                supplier.tax_id
            )));
        }
        self.staged.suppliers.insert(supplier.id, supplier.clone());
        Ok(())
    }

    async fn insert_purchase(&mut self, purchase: &Purchase) -> StoreResult<()> {
        self.staged.purchases.push(purchase.clone());
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        let InMemoryTx { mut guard, staged } = self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}
