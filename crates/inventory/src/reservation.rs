use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockledger_core::{
    Decimal, InventoryError, InventoryResult, LocationId, ProductId, ReservationId, UserId,
    WarehouseId, ensure_positive,
};

use crate::stock_line::{StockDelta, StockKey};

/// Reservation lifecycle. Every state other than `Active` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationState {
    Active,
    Confirmed,
    Released,
    Cancelled,
    Expired,
}

impl ReservationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Active => "ACTIVE",
            ReservationState::Confirmed => "CONFIRMED",
            ReservationState::Released => "RELEASED",
            ReservationState::Cancelled => "CANCELLED",
            ReservationState::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self != ReservationState::Active
    }
}

impl core::str::FromStr for ReservationState {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(ReservationState::Active),
            "CONFIRMED" => Ok(ReservationState::Confirmed),
            "RELEASED" => Ok(ReservationState::Released),
            "CANCELLED" => Ok(ReservationState::Cancelled),
            "EXPIRED" => Ok(ReservationState::Expired),
            other => Err(InventoryError::validation(format!(
                "unknown reservation state '{other}'"
            ))),
        }
    }
}

/// Command: ReserveStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub location_id: Option<LocationId>,
    pub quantity: Decimal,
    /// Sales transaction (order) the reservation is held for.
    pub linked_transaction_id: Option<Uuid>,
    pub linked_detail_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub actor: UserId,
}

/// Stock committed against a future consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub location_id: Option<LocationId>,
    pub quantity: Decimal,
    pub state: ReservationState,
    pub linked_transaction_id: Option<Uuid>,
    pub linked_detail_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    /// Why the reservation left `Active` (release reason, expiry note).
    pub state_reason: Option<String>,
    pub created_by: UserId,
    pub closed_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Validate a reservation request and build the `Active` record.
    ///
    /// Availability is checked by the caller when it applies
    /// [`Reservation::hold_delta`] to the locked stock line.
    pub fn create(cmd: &ReserveStock, now: DateTime<Utc>) -> InventoryResult<Self> {
        let quantity = ensure_positive(cmd.quantity)?;
        if let Some(expires_at) = cmd.expires_at {
            if expires_at <= now {
                return Err(InventoryError::validation(
                    "expires_at must be in the future",
                ));
            }
        }

        Ok(Self {
            id: ReservationId::new(),
            product_id: cmd.product_id,
            warehouse_id: cmd.warehouse_id,
            location_id: cmd.location_id,
            quantity,
            state: ReservationState::Active,
            linked_transaction_id: cmd.linked_transaction_id,
            linked_detail_id: cmd.linked_detail_id,
            expires_at: cmd.expires_at,
            reason: cmd.reason.clone(),
            state_reason: None,
            created_by: cmd.actor,
            closed_by: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
        })
    }

    pub fn stock_key(&self) -> StockKey {
        StockKey::new(self.product_id, self.warehouse_id).at_location(self.location_id)
    }

    pub fn is_active(&self) -> bool {
        self.state == ReservationState::Active
    }

    /// Delta applied when the reservation is taken.
    pub fn hold_delta(&self) -> StockDelta {
        StockDelta::reserve(self.quantity)
    }

    /// Delta applied when the reservation is confirmed (stock leaves).
    pub fn consume_delta(&self) -> StockDelta {
        StockDelta::consume_reserved(self.quantity)
    }

    /// Delta applied on release, cancel and expiry.
    pub fn restore_delta(&self) -> StockDelta {
        StockDelta::unreserve(self.quantity)
    }

    /// Ledger reference for the outbound movement written on confirm.
    pub fn movement_reference(&self) -> String {
        match self.linked_transaction_id {
            Some(tx) => format!("SALE:{tx}"),
            None => format!("RESERVATION:{}", self.id),
        }
    }

    /// Moment after which the sweep may expire this reservation.
    ///
    /// Reservations without an explicit `expires_at` fall back to the TTL.
    pub fn expiry_deadline(&self, default_ttl: Duration) -> DateTime<Utc> {
        self.expires_at.unwrap_or(self.created_at + default_ttl)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>, default_ttl: Duration) -> bool {
        self.is_active() && self.expiry_deadline(default_ttl) < now
    }

    pub fn confirm(&mut self, actor: UserId, now: DateTime<Utc>) -> InventoryResult<()> {
        self.close(ReservationState::Confirmed, actor, None, now)
    }

    pub fn release(
        &mut self,
        actor: UserId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> InventoryResult<()> {
        self.close(ReservationState::Released, actor, Some(reason.into()), now)
    }

    pub fn cancel(
        &mut self,
        actor: UserId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> InventoryResult<()> {
        self.close(ReservationState::Cancelled, actor, Some(reason.into()), now)
    }

    /// System transition; `triggered_by` is recorded for audit.
    pub fn expire(&mut self, triggered_by: UserId, now: DateTime<Utc>) -> InventoryResult<()> {
        let note = match self.expires_at {
            Some(at) => format!("expired at {}", at.to_rfc3339()),
            None => "expired after default ttl".to_string(),
        };
        self.close(ReservationState::Expired, triggered_by, Some(note), now)
    }

    fn close(
        &mut self,
        to: ReservationState,
        actor: UserId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> InventoryResult<()> {
        if !self.is_active() {
            return Err(InventoryError::ReservationNotActive {
                id: self.id,
                state: self.state.as_str().to_string(),
            });
        }
        self.state = to;
        self.state_reason = reason.filter(|r| !r.trim().is_empty());
        self.closed_by = Some(actor);
        self.closed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}
