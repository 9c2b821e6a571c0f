//! Reservation engine: ACTIVE → CONFIRMED | RELEASED | CANCELLED | EXPIRED.
//!
//! Creating, releasing, cancelling and expiring a reservation only moves stock
//! between `available` and `committed` (no ledger entry). Confirming is the
//! physical outflow and appends a SALIDA.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use stockledger_core::{InventoryError, InventoryResult, ReservationId, UserId};
use stockledger_inventory::{MovementEntry, MovementKind, Reservation, ReserveStock};

use super::{InventoryCore, apply_delta, record_movement, require_product};
use crate::store::{InventoryStore, InventoryTx};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closing {
    Release,
    Cancel,
}

impl<S: InventoryStore> InventoryCore<S> {
    /// Commit `quantity` of free stock to a future consumption.
    #[instrument(
        skip(self, cmd),
        fields(product_id = %cmd.product_id, warehouse_id = %cmd.warehouse_id, quantity = %cmd.quantity),
        err
    )]
    pub async fn reserve_stock(&self, cmd: ReserveStock) -> InventoryResult<Reservation> {
        let now = Utc::now();
        let reservation = Reservation::create(&cmd, now)?;

        let mut tx = self.store.begin().await?;
        require_product(&mut tx, reservation.product_id).await?;
        let line = apply_delta(
            &mut tx,
            &reservation.stock_key(),
            reservation.hold_delta(),
            now,
        )
        .await?;
        tx.put_reservation(&reservation).await?;
        tx.commit().await?;

        info!(
            reservation_id = %reservation.id,
            available = %line.available,
            committed = %line.committed,
            "stock reserved"
        );
        self.record_audit(
            cmd.actor,
            "RESERVATION_CREATE",
            format!(
                "reserved {} of product {} ({})",
                reservation.quantity,
                reservation.product_id,
                reservation.id
            ),
            "reservations",
        );
        Ok(reservation)
    }

    /// ACTIVE → CONFIRMED: committed stock leaves the warehouse.
    #[instrument(skip(self), fields(reservation_id = %id), err)]
    pub async fn confirm_reservation(
        &self,
        id: ReservationId,
        actor: UserId,
    ) -> InventoryResult<Reservation> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut reservation = lock_reservation(&mut tx, id).await?;
        reservation.confirm(actor, now)?;

        let entry = MovementEntry::new(
            MovementKind::Outbound,
            reservation.stock_key(),
            reservation.quantity,
            actor,
            now,
        )
        .with_reference(reservation.movement_reference());
        record_movement(&mut tx, reservation.consume_delta(), &entry).await?;
        tx.put_reservation(&reservation).await?;
        tx.commit().await?;

        info!(movement_id = %entry.id, "reservation confirmed");
        self.record_audit(
            actor,
            "RESERVATION_CONFIRM",
            format!("confirmed reservation {id}, outflow {}", reservation.quantity),
            "reservations",
        );
        Ok(reservation)
    }

    /// ACTIVE → RELEASED: the consumer no longer needs the stock.
    pub async fn release_reservation(
        &self,
        id: ReservationId,
        actor: UserId,
        reason: impl Into<String>,
    ) -> InventoryResult<Reservation> {
        self.close_reservation(id, actor, reason.into(), Closing::Release)
            .await
    }

    /// ACTIVE → CANCELLED: the originating document was cancelled.
    pub async fn cancel_reservation(
        &self,
        id: ReservationId,
        actor: UserId,
        reason: impl Into<String>,
    ) -> InventoryResult<Reservation> {
        self.close_reservation(id, actor, reason.into(), Closing::Cancel)
            .await
    }

    #[instrument(skip(self, reason), fields(reservation_id = %id, closing = ?closing), err)]
    async fn close_reservation(
        &self,
        id: ReservationId,
        actor: UserId,
        reason: String,
        closing: Closing,
    ) -> InventoryResult<Reservation> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut reservation = lock_reservation(&mut tx, id).await?;
        match closing {
            Closing::Release => reservation.release(actor, reason.as_str(), now)?,
            Closing::Cancel => reservation.cancel(actor, reason.as_str(), now)?,
        }
        apply_delta(&mut tx, &reservation.stock_key(), reservation.restore_delta(), now).await?;
        tx.put_reservation(&reservation).await?;
        tx.commit().await?;

        let action = match closing {
            Closing::Release => "RESERVATION_RELEASE",
            Closing::Cancel => "RESERVATION_CANCEL",
        };
        info!(state = reservation.state.as_str(), "reservation closed");
        self.record_audit(
            actor,
            action,
            format!("reservation {id} closed: {reason}"),
            "reservations",
        );
        Ok(reservation)
    }

    /// ACTIVE → EXPIRED, regardless of the deadline. System-triggered only.
    #[instrument(skip(self), fields(reservation_id = %id), err)]
    pub async fn expire_reservation(
        &self,
        id: ReservationId,
        triggered_by: UserId,
    ) -> InventoryResult<Reservation> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut reservation = lock_reservation(&mut tx, id).await?;
        expire_locked(&mut tx, &mut reservation, triggered_by, now).await?;
        tx.commit().await?;

        self.audit_expiry(&reservation, triggered_by);
        Ok(reservation)
    }

    /// Expire `id` if it is still active and past its deadline at `now`.
    ///
    /// Re-validated under the row lock: a reservation closed since it was
    /// listed is skipped (`Ok(None)`), never transitioned twice.
    pub(crate) async fn expire_if_due(
        &self,
        id: ReservationId,
        triggered_by: UserId,
        default_ttl: Duration,
        now: DateTime<Utc>,
    ) -> InventoryResult<Option<Reservation>> {
        let mut tx = self.store.begin().await?;
        let mut reservation = lock_reservation(&mut tx, id).await?;
        if !reservation.is_expired_at(now, default_ttl) {
            debug!(reservation_id = %id, state = reservation.state.as_str(), "no longer due, skipped");
            tx.rollback().await?;
            return Ok(None);
        }
        expire_locked(&mut tx, &mut reservation, triggered_by, now).await?;
        tx.commit().await?;

        self.audit_expiry(&reservation, triggered_by);
        Ok(Some(reservation))
    }

    fn audit_expiry(&self, reservation: &Reservation, triggered_by: UserId) {
        info!(reservation_id = %reservation.id, "reservation expired");
        self.record_audit(
            triggered_by,
            "RESERVATION_EXPIRE",
            format!(
                "reservation {} expired, {} returned to available",
                reservation.id, reservation.quantity
            ),
            "reservations",
        );
    }

    /// Release every active reservation held for a sales transaction, in one
    /// transaction (all or nothing).
    #[instrument(skip(self, reason), fields(linked_transaction_id = %linked_transaction_id), err)]
    pub async fn release_reservations_for_transaction(
        &self,
        linked_transaction_id: Uuid,
        actor: UserId,
        reason: impl Into<String>,
    ) -> InventoryResult<Vec<Reservation>> {
        let reason = reason.into();
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let ids = tx
            .active_reservations_for_transaction(linked_transaction_id)
            .await?;

        let mut released = Vec::with_capacity(ids.len());
        for id in ids {
            let mut reservation = lock_reservation(&mut tx, id).await?;
            reservation.release(actor, reason.as_str(), now)?;
            apply_delta(&mut tx, &reservation.stock_key(), reservation.restore_delta(), now)
                .await?;
            tx.put_reservation(&reservation).await?;
            released.push(reservation);
        }
        tx.commit().await?;

        if !released.is_empty() {
            info!(count = released.len(), "reservations released for transaction");
            self.record_audit(
                actor,
                "RESERVATION_RELEASE",
                format!(
                    "released {} reservation(s) of transaction {linked_transaction_id}: {reason}",
                    released.len()
                ),
                "reservations",
            );
        }
        Ok(released)
    }

    pub async fn get_reservation(&self, id: ReservationId) -> InventoryResult<Reservation> {
        let mut tx = self.store.begin().await?;
        let reservation = tx
            .reservation(id)
            .await?
            .ok_or(InventoryError::ReservationNotFound(id))?;
        tx.rollback().await?;
        Ok(reservation)
    }
}

async fn lock_reservation<T: InventoryTx>(
    tx: &mut T,
    id: ReservationId,
) -> InventoryResult<Reservation> {
    tx.lock_reservation(id)
        .await?
        .ok_or(InventoryError::ReservationNotFound(id))
}

async fn expire_locked<T: InventoryTx>(
    tx: &mut T,
    reservation: &mut Reservation,
    triggered_by: UserId,
    now: DateTime<Utc>,
) -> InventoryResult<()> {
    reservation.expire(triggered_by, now)?;
    apply_delta(tx, &reservation.stock_key(), reservation.restore_delta(), now).await?;
    tx.put_reservation(reservation).await?;
    Ok(())
}
