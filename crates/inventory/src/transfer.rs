use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    Decimal, InventoryError, InventoryResult, MovementId, ProductId, TransferId, UserId,
    WarehouseId, ensure_positive,
};

use crate::stock_line::StockKey;

/// Transfer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferState {
    Pending,
    Confirmed,
    Cancelled,
}

impl TransferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Pending => "PENDING",
            TransferState::Confirmed => "CONFIRMED",
            TransferState::Cancelled => "CANCELLED",
        }
    }
}

impl core::str::FromStr for TransferState {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransferState::Pending),
            "CONFIRMED" => Ok(TransferState::Confirmed),
            "CANCELLED" => Ok(TransferState::Cancelled),
            other => Err(InventoryError::validation(format!(
                "unknown transfer state '{other}'"
            ))),
        }
    }
}

/// Command: CreateTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransfer {
    pub product_id: ProductId,
    pub origin_warehouse_id: WarehouseId,
    pub destination_warehouse_id: WarehouseId,
    pub quantity: Decimal,
    pub reference: Option<String>,
    pub actor: UserId,
}

/// Command: ConfirmTransfer (goods received at destination).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmTransfer {
    pub actor: UserId,
    pub notes: Option<String>,
}

/// Command: CancelTransfer (goods return to origin).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTransfer {
    pub actor: UserId,
    pub reason: Option<String>,
}

/// Two-phase relocation of stock between warehouses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub product_id: ProductId,
    pub origin_warehouse_id: WarehouseId,
    pub destination_warehouse_id: WarehouseId,
    pub quantity: Decimal,
    pub state: TransferState,
    /// Origin average cost at dispatch; becomes the receipt's incoming cost.
    pub unit_cost: Decimal,
    pub dispatch_movement_id: MovementId,
    pub receipt_movement_id: Option<MovementId>,
    /// Compensating origin entry written on cancel.
    pub return_movement_id: Option<MovementId>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub closed_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Transfer {
    /// Validate a transfer request and build the `Pending` record.
    ///
    /// `unit_cost` is the origin line's average cost at dispatch time.
    pub fn open(cmd: &CreateTransfer, unit_cost: Decimal, now: DateTime<Utc>) -> InventoryResult<Self> {
        let quantity = ensure_positive(cmd.quantity)?;
        if cmd.origin_warehouse_id == cmd.destination_warehouse_id {
            return Err(InventoryError::validation(
                "origin and destination warehouse must differ",
            ));
        }

        Ok(Self {
            id: TransferId::new(),
            product_id: cmd.product_id,
            origin_warehouse_id: cmd.origin_warehouse_id,
            destination_warehouse_id: cmd.destination_warehouse_id,
            quantity,
            state: TransferState::Pending,
            unit_cost,
            dispatch_movement_id: MovementId::new(),
            receipt_movement_id: None,
            return_movement_id: None,
            reference: cmd
                .reference
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            notes: None,
            created_by: cmd.actor,
            closed_by: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
        })
    }

    pub fn origin_key(&self) -> StockKey {
        StockKey::new(self.product_id, self.origin_warehouse_id)
    }

    pub fn destination_key(&self) -> StockKey {
        StockKey::new(self.product_id, self.destination_warehouse_id)
    }

    pub fn movement_reference(&self) -> String {
        match &self.reference {
            Some(doc) => format!("TRANSFER:{}:{doc}", self.id),
            None => format!("TRANSFER:{}", self.id),
        }
    }

    /// Mark as received; returns the id of the receipt movement to write.
    pub fn confirm(&mut self, cmd: &ConfirmTransfer, now: DateTime<Utc>) -> InventoryResult<MovementId> {
        self.ensure_pending()?;
        let receipt = MovementId::new();
        self.state = TransferState::Confirmed;
        self.receipt_movement_id = Some(receipt);
        self.close(cmd.actor, cmd.notes.clone(), now);
        Ok(receipt)
    }

    /// Mark as cancelled; returns the id of the compensating origin movement.
    pub fn cancel(&mut self, cmd: &CancelTransfer, now: DateTime<Utc>) -> InventoryResult<MovementId> {
        self.ensure_pending()?;
        let compensation = MovementId::new();
        self.state = TransferState::Cancelled;
        self.return_movement_id = Some(compensation);
        self.close(cmd.actor, cmd.reason.clone(), now);
        Ok(compensation)
    }

    fn ensure_pending(&self) -> InventoryResult<()> {
        if self.state != TransferState::Pending {
            return Err(InventoryError::TransferNotPending {
                id: self.id,
                state: self.state.as_str().to_string(),
            });
        }
        Ok(())
    }

    fn close(&mut self, actor: UserId, notes: Option<String>, now: DateTime<Utc>) {
        self.notes = notes.filter(|n| !n.trim().is_empty());
        self.closed_by = Some(actor);
        self.closed_at = Some(now);
        self.updated_at = now;
    }
}
