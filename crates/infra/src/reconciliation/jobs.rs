use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::SweepOptions;
use crate::engine::InventoryCore;
use crate::scheduler::RecurringJob;
use crate::store::InventoryStore;

/// Recurring release of reservations past their deadline.
pub struct ExpiredReservationSweepJob<S: InventoryStore> {
    core: Arc<InventoryCore<S>>,
    opts: SweepOptions,
}

impl<S: InventoryStore> ExpiredReservationSweepJob<S> {
    pub fn new(core: Arc<InventoryCore<S>>, opts: SweepOptions) -> Self {
        Self { core, opts }
    }
}

#[async_trait]
impl<S: InventoryStore> RecurringJob for ExpiredReservationSweepJob<S> {
    fn name(&self) -> &'static str {
        "expired-reservation-sweep"
    }

    async fn run(&self) -> anyhow::Result<()> {
        let report = self.core.sweep_expired_reservations(self.opts).await?;
        // Per-item failures are retried by the next scheduled run.
        if report.failed > 0 {
            warn!(
                failed = report.failed,
                scanned = report.scanned,
                released = report.released_count,
                "some reservations could not be expired"
            );
        }
        Ok(())
    }
}

/// Recurring low-stock report and alert.
pub struct LowStockSweepJob<S: InventoryStore> {
    core: Arc<InventoryCore<S>>,
}

impl<S: InventoryStore> LowStockSweepJob<S> {
    pub fn new(core: Arc<InventoryCore<S>>) -> Self {
        Self { core }
    }
}

#[async_trait]
impl<S: InventoryStore> RecurringJob for LowStockSweepJob<S> {
    fn name(&self) -> &'static str {
        "low-stock-sweep"
    }

    async fn run(&self) -> anyhow::Result<()> {
        let report = self.core.sweep_low_stock().await?;
        info!(critical = report.critical_count, "low stock sweep finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use stockledger_core::{Decimal, UserId};
    use stockledger_inventory::{ReservationState, ReserveStock};

    use crate::engine::CoreSettings;
    use crate::engine::test_support::test_harness;
    use crate::store::{InMemoryInventoryStore, InventoryTx};

    #[tokio::test]
    async fn jobs_run_against_an_empty_store() {
        let store = Arc::new(InMemoryInventoryStore::new());
        let core = Arc::new(InventoryCore::new(store, CoreSettings::default()));

        let expired = ExpiredReservationSweepJob::new(core.clone(), SweepOptions::default());
        let low_stock = LowStockSweepJob::new(core);
        assert_eq!(expired.name(), "expired-reservation-sweep");
        expired.run().await.unwrap();
        low_stock.run().await.unwrap();
    }

    #[tokio::test]
    async fn item_failures_do_not_fail_the_run() {
        let h = test_harness();
        let key = h.default_key(h.product().await);
        h.seed(key, 5).await;
        let reservation = h
            .core
            .reserve_stock(ReserveStock {
                product_id: key.product_id,
                warehouse_id: key.warehouse_id,
                location_id: None,
                quantity: Decimal::from(3),
                linked_transaction_id: None,
                linked_detail_id: None,
                expires_at: Some(Utc::now() + Duration::minutes(5)),
                reason: None,
                actor: UserId::new(),
            })
            .await
            .unwrap();

        // Overdue reservation whose committed stock has gone missing.
        let mut tx = h.store.begin().await.unwrap();
        let mut overdue = tx.lock_reservation(reservation.id).await.unwrap().unwrap();
        overdue.expires_at = Some(Utc::now() - Duration::minutes(1));
        tx.put_reservation(&overdue).await.unwrap();
        let mut line = tx.lock_stock_line(&key).await.unwrap();
        line.committed = Decimal::ZERO;
        tx.put_stock_line(&line).await.unwrap();
        tx.commit().await.unwrap();

        let core = Arc::new(h.core);
        let report = core
            .sweep_expired_reservations(SweepOptions::default())
            .await
            .unwrap();
        assert_eq!((report.scanned, report.failed), (1, 1));

        let job = ExpiredReservationSweepJob::new(core.clone(), SweepOptions::default());
        job.run().await.unwrap();
        assert_eq!(
            core.get_reservation(reservation.id).await.unwrap().state,
            ReservationState::Active
        );
    }
}
