//! Stock aggregate access: the single mutation path for stock lines, plus
//! per-line reads and ledger verification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use stockledger_core::{Decimal, InventoryResult, ProductId, UserId};
use stockledger_inventory::{StockDelta, StockKey, StockLine};

use super::{InventoryCore, require_product};
use crate::store::{InventoryStore, InventoryTx};

/// Lock the line for `key` (zero baseline if absent), apply `delta`, persist.
///
/// Must run inside the caller's transaction. Returns the post-mutation
/// snapshot. Fails with `InsufficientStock` when `available` would go
/// negative; the line is left untouched in that case.
pub async fn apply_delta<T: InventoryTx>(
    tx: &mut T,
    key: &StockKey,
    delta: StockDelta,
    now: DateTime<Utc>,
) -> InventoryResult<StockLine> {
    let mut line = tx.lock_stock_line(key).await?;
    line.apply(delta, now)?;
    tx.put_stock_line(&line).await?;
    Ok(line)
}

/// Outcome of replaying the ledger of one stock line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineVerification {
    pub key: StockKey,
    /// Sum of signed ledger quantities.
    pub ledger_on_hand: Decimal,
    /// `available + committed` on the aggregate.
    pub aggregate_on_hand: Decimal,
    pub movement_count: usize,
    pub consistent: bool,
}

impl<S: InventoryStore> InventoryCore<S> {
    /// Every line of a product across warehouses and locations.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn stock_by_product(&self, product_id: ProductId) -> InventoryResult<Vec<StockLine>> {
        let mut tx = self.store.begin().await?;
        require_product(&mut tx, product_id).await?;
        let lines = tx.stock_lines_for_product(product_id).await?;
        tx.rollback().await?;
        Ok(lines)
    }

    /// Configure the low-stock threshold of a line. Zero disables alerts.
    ///
    /// Quantities are unchanged, so no ledger entry is written.
    #[instrument(skip(self), fields(key = %key), err)]
    pub async fn set_minimum_stock(
        &self,
        key: StockKey,
        minimum: Decimal,
        actor: UserId,
    ) -> InventoryResult<StockLine> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        require_product(&mut tx, key.product_id).await?;
        let mut line = tx.lock_stock_line(&key).await?;
        line.set_minimum(minimum, now)?;
        tx.put_stock_line(&line).await?;
        tx.commit().await?;

        info!(minimum = %minimum, "minimum stock updated");
        self.record_audit(
            actor,
            "STOCK_MINIMUM_SET",
            format!("minimum stock for {key} set to {minimum}"),
            "stock_lines",
        );
        Ok(line)
    }

    /// Replay the ledger for one line and compare it with the aggregate.
    ///
    /// Reservations move stock between `available` and `committed` without a
    /// ledger entry, so the comparison is against the physical on-hand.
    #[instrument(skip(self), fields(key = %key), err)]
    pub async fn verify_stock_line(&self, key: StockKey) -> InventoryResult<LineVerification> {
        let mut tx = self.store.begin().await?;
        let line = tx
            .stock_line(&key)
            .await?
            .unwrap_or_else(|| StockLine::empty(key));
        let movements = tx.movements_for_line(&key).await?;
        tx.rollback().await?;

        let ledger_on_hand: Decimal = movements.iter().map(|m| m.signed_quantity()).sum();
        let aggregate_on_hand = line.on_hand();
        let consistent = ledger_on_hand == aggregate_on_hand;
        if !consistent {
            warn!(
                ledger = %ledger_on_hand,
                aggregate = %aggregate_on_hand,
                "stock line disagrees with its ledger"
            );
        }

        Ok(LineVerification {
            key,
            ledger_on_hand,
            aggregate_on_hand,
            movement_count: movements.len(),
            consistent,
        })
    }
}
