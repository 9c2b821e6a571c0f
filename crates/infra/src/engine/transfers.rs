//! Two-phase warehouse transfers.
//!
//! Create dispatches from the origin (TRANSFER_DISPATCH), confirm receives at
//! the destination (TRANSFER_RECEIPT), cancel returns the goods to the origin
//! with a compensating AJUSTE. Dispatched units travel at the origin's
//! average cost and are blended into the destination's average on receipt.

use chrono::Utc;
use tracing::{info, instrument};

use stockledger_core::{Decimal, InventoryError, InventoryResult, TransferId};
use stockledger_inventory::{
    CancelTransfer, ConfirmTransfer, CreateTransfer, MovementEntry, MovementKind, StockDelta,
    Transfer,
};

use super::{InventoryCore, record_movement, require_product};
use crate::store::{InventoryStore, InventoryTx};

impl<S: InventoryStore> InventoryCore<S> {
    #[instrument(
        skip(self, cmd),
        fields(
            product_id = %cmd.product_id,
            origin = %cmd.origin_warehouse_id,
            destination = %cmd.destination_warehouse_id,
            quantity = %cmd.quantity
        ),
        err
    )]
    pub async fn create_transfer(&self, cmd: CreateTransfer) -> InventoryResult<Transfer> {
        let now = Utc::now();
        let mut transfer = Transfer::open(&cmd, Decimal::ZERO, now)?;

        let mut tx = self.store.begin().await?;
        require_product(&mut tx, cmd.product_id).await?;
        let origin = tx.lock_stock_line(&transfer.origin_key()).await?;
        transfer.unit_cost = origin.average_cost;

        let dispatch = MovementEntry::new(
            MovementKind::TransferDispatch,
            transfer.origin_key(),
            transfer.quantity,
            cmd.actor,
            now,
        )
        .with_id(transfer.dispatch_movement_id)
        .with_unit_cost(transfer.unit_cost)
        .with_reference(transfer.movement_reference());
        record_movement(&mut tx, StockDelta::outbound(transfer.quantity), &dispatch).await?;
        tx.put_transfer(&transfer).await?;
        tx.commit().await?;

        info!(transfer_id = %transfer.id, "transfer dispatched");
        self.record_audit(
            cmd.actor,
            "TRANSFER_CREATE",
            format!(
                "transfer {} of {} from {} to {}",
                transfer.id,
                transfer.quantity,
                transfer.origin_warehouse_id,
                transfer.destination_warehouse_id
            ),
            "transfers",
        );
        Ok(transfer)
    }

    /// PENDING → CONFIRMED: the destination receives the dispatched quantity.
    #[instrument(skip(self, cmd), fields(transfer_id = %id), err)]
    pub async fn confirm_transfer(
        &self,
        id: TransferId,
        cmd: ConfirmTransfer,
    ) -> InventoryResult<Transfer> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut transfer = lock_transfer(&mut tx, id).await?;
        let receipt_id = transfer.confirm(&cmd, now)?;

        let receipt = MovementEntry::new(
            MovementKind::TransferReceipt,
            transfer.destination_key(),
            transfer.quantity,
            cmd.actor,
            now,
        )
        .with_id(receipt_id)
        .with_unit_cost(transfer.unit_cost)
        .with_reference(transfer.movement_reference());
        let delta = StockDelta::inbound(transfer.quantity, Some(transfer.unit_cost));
        record_movement(&mut tx, delta, &receipt).await?;
        tx.put_transfer(&transfer).await?;
        tx.commit().await?;

        info!("transfer received");
        self.record_audit(
            cmd.actor,
            "TRANSFER_CONFIRM",
            format!("transfer {id} received at {}", transfer.destination_warehouse_id),
            "transfers",
        );
        Ok(transfer)
    }

    /// PENDING → CANCELLED: the dispatched quantity returns to the origin.
    #[instrument(skip(self, cmd), fields(transfer_id = %id), err)]
    pub async fn cancel_transfer(
        &self,
        id: TransferId,
        cmd: CancelTransfer,
    ) -> InventoryResult<Transfer> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut transfer = lock_transfer(&mut tx, id).await?;
        let return_id = transfer.cancel(&cmd, now)?;

        // Restoring at the origin's own cost keeps its average unchanged.
        let compensation =
            MovementEntry::adjustment(transfer.origin_key(), transfer.quantity, true, cmd.actor, now)
                .with_id(return_id)
                .with_reference(transfer.movement_reference());
        record_movement(
            &mut tx,
            StockDelta::inbound(transfer.quantity, None),
            &compensation,
        )
        .await?;
        tx.put_transfer(&transfer).await?;
        tx.commit().await?;

        info!("transfer cancelled, origin restored");
        self.record_audit(
            cmd.actor,
            "TRANSFER_CANCEL",
            format!(
                "transfer {id} cancelled: {}",
                cmd.reason.as_deref().unwrap_or("no reason given")
            ),
            "transfers",
        );
        Ok(transfer)
    }

    pub async fn get_transfer(&self, id: TransferId) -> InventoryResult<Transfer> {
        let mut tx = self.store.begin().await?;
        let transfer = tx
            .transfer(id)
            .await?
            .ok_or(InventoryError::TransferNotFound(id))?;
        tx.rollback().await?;
        Ok(transfer)
    }
}

async fn lock_transfer<T: InventoryTx>(tx: &mut T, id: TransferId) -> InventoryResult<Transfer> {
    tx.lock_transfer(id)
        .await?
        .ok_or(InventoryError::TransferNotFound(id))
}
