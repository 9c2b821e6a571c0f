//! Movement ledger: append-only entries written in the same transaction as the
//! stock mutation they explain.

use tracing::instrument;

use stockledger_core::{InventoryError, InventoryResult, ProductId};
use stockledger_inventory::{MovementEntry, StockDelta, StockLine};

use super::{InventoryCore, apply_delta, require_product};
use crate::store::{InventoryStore, InventoryTx};

/// Apply `delta` to the entry's stock line, then append the entry.
///
/// The delta and the entry must describe the same physical change: the net
/// on-hand effect of the delta has to equal the entry's signed quantity.
/// Validation happens before either write, so a failure leaves no orphaned
/// ledger row.
pub async fn record_movement<T: InventoryTx>(
    tx: &mut T,
    delta: StockDelta,
    entry: &MovementEntry,
) -> InventoryResult<StockLine> {
    if delta.available + delta.committed != entry.signed_quantity() {
        return Err(InventoryError::invariant(format!(
            "{} entry of {} does not match stock delta (available {}, committed {})",
            entry.kind.as_str(),
            entry.signed_quantity(),
            delta.available,
            delta.committed
        )));
    }
    let line = apply_delta(tx, &entry.stock_key, delta, entry.created_at).await?;
    tx.insert_movement(entry).await?;
    Ok(line)
}

impl<S: InventoryStore> InventoryCore<S> {
    /// Newest ledger entries of a product, across all its lines.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn list_recent_movements(
        &self,
        product_id: ProductId,
        limit: usize,
    ) -> InventoryResult<Vec<MovementEntry>> {
        let mut tx = self.store.begin().await?;
        require_product(&mut tx, product_id).await?;
        let movements = tx.recent_movements(product_id, limit).await?;
        tx.rollback().await?;
        Ok(movements)
    }
}
