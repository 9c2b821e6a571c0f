use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Decimal, InventoryError, MovementId, ProductId, UserId};

use crate::stock_line::StockKey;

/// Kind of stock-affecting event recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementKind {
    #[serde(rename = "INGRESO")]
    Inbound,
    #[serde(rename = "SALIDA")]
    Outbound,
    #[serde(rename = "AJUSTE")]
    Adjustment,
    #[serde(rename = "TRANSFER_DISPATCH")]
    TransferDispatch,
    #[serde(rename = "TRANSFER_RECEIPT")]
    TransferReceipt,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Inbound => "INGRESO",
            MovementKind::Outbound => "SALIDA",
            MovementKind::Adjustment => "AJUSTE",
            MovementKind::TransferDispatch => "TRANSFER_DISPATCH",
            MovementKind::TransferReceipt => "TRANSFER_RECEIPT",
        }
    }

    /// Direction implied by the kind; adjustments can go either way.
    pub fn implied_direction(&self) -> Option<MovementDirection> {
        match self {
            MovementKind::Inbound | MovementKind::TransferReceipt => Some(MovementDirection::In),
            MovementKind::Outbound | MovementKind::TransferDispatch => Some(MovementDirection::Out),
            MovementKind::Adjustment => None,
        }
    }
}

impl core::str::FromStr for MovementKind {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INGRESO" => Ok(MovementKind::Inbound),
            "SALIDA" => Ok(MovementKind::Outbound),
            "AJUSTE" => Ok(MovementKind::Adjustment),
            "TRANSFER_DISPATCH" => Ok(MovementKind::TransferDispatch),
            "TRANSFER_RECEIPT" => Ok(MovementKind::TransferReceipt),
            other => Err(InventoryError::validation(format!(
                "unknown movement kind '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementDirection {
    In,
    Out,
}

impl MovementDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementDirection::In => "IN",
            MovementDirection::Out => "OUT",
        }
    }
}

impl core::str::FromStr for MovementDirection {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(MovementDirection::In),
            "OUT" => Ok(MovementDirection::Out),
            other => Err(InventoryError::validation(format!(
                "unknown movement direction '{other}'"
            ))),
        }
    }
}

/// Immutable ledger record explaining one stock-affecting event.
///
/// `quantity` is always positive; the sign comes from `direction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementEntry {
    pub id: MovementId,
    pub kind: MovementKind,
    pub direction: MovementDirection,
    pub product_id: ProductId,
    pub stock_key: StockKey,
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    pub reference: Option<String>,
    pub actor_user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl MovementEntry {
    /// New entry of a kind with a fixed direction.
    ///
    /// Adjustments go through [`MovementEntry::adjustment`] instead; passing
    /// `Adjustment` here records an inbound adjustment.
    pub fn new(
        kind: MovementKind,
        stock_key: StockKey,
        quantity: Decimal,
        actor_user_id: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            kind,
            direction: kind.implied_direction().unwrap_or(MovementDirection::In),
            product_id: stock_key.product_id,
            stock_key,
            quantity,
            unit_cost: None,
            reference: None,
            actor_user_id,
            created_at,
        }
    }

    pub fn adjustment(
        stock_key: StockKey,
        quantity: Decimal,
        increment: bool,
        actor_user_id: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut entry = Self::new(
            MovementKind::Adjustment,
            stock_key,
            quantity,
            actor_user_id,
            created_at,
        );
        if !increment {
            entry.direction = MovementDirection::Out;
        }
        entry
    }

    pub fn with_id(mut self, id: MovementId) -> Self {
        self.id = id;
        self
    }

    pub fn with_unit_cost(mut self, unit_cost: Decimal) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Effect of this entry on the physical on-hand quantity.
    pub fn signed_quantity(&self) -> Decimal {
        match self.direction {
            MovementDirection::In => self.quantity,
            MovementDirection::Out => -self.quantity,
        }
    }
}
