//! Reconciliation sweeps run by the scheduler.
//!
//! Both sweeps go through the same transactional operations as any other
//! caller. The expired sweep re-validates every candidate inside its own
//! transaction, so a reservation confirmed while the sweep is running is
//! skipped rather than transitioned twice. Individual failures are logged and
//! counted, never fatal for the batch.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use stockledger_core::{Decimal, InventoryError, InventoryResult, ReservationId, UserId};
use stockledger_inventory::{StockKey, StockLine};

use crate::engine::InventoryCore;
use crate::sinks::Notification;
use crate::store::{InventoryStore, InventoryTx};

pub mod jobs;

pub use jobs::{ExpiredReservationSweepJob, LowStockSweepJob};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepOptions {
    /// Most reservations examined per run.
    pub batch_limit: usize,
    /// Lifetime of reservations without an explicit `expires_at`.
    pub ttl_hours: i64,
    /// Report candidates without mutating anything.
    pub dry_run: bool,
}

impl SweepOptions {
    /// Longest TTL a sweep accepts (one year).
    pub const MAX_TTL_HOURS: i64 = 24 * 365;

    /// `ttl_hours` as a duration, rejected outside `1..=MAX_TTL_HOURS`.
    pub fn ttl(&self) -> InventoryResult<Duration> {
        if !(1..=Self::MAX_TTL_HOURS).contains(&self.ttl_hours) {
            return Err(InventoryError::validation(format!(
                "sweep ttl must be between 1 and {} hours (got {})",
                Self::MAX_TTL_HOURS,
                self.ttl_hours
            )));
        }
        Ok(Duration::hours(self.ttl_hours))
    }
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            batch_limit: 500,
            ttl_hours: 24,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiredSweepReport {
    pub scanned: usize,
    /// Reservations expired (or, in dry-run mode, that would be).
    pub released_count: usize,
    /// Candidates already closed by the time they were locked.
    pub skipped: usize,
    pub failed: usize,
    pub dry_run: bool,
    pub released: Vec<ReservationId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalItem {
    pub key: StockKey,
    pub available: Decimal,
    pub minimum_stock: Decimal,
    /// `minimum_stock - available`, never negative.
    pub shortfall: Decimal,
}

impl From<&StockLine> for CriticalItem {
    fn from(line: &StockLine) -> Self {
        Self {
            key: line.key,
            available: line.available,
            minimum_stock: line.minimum_stock,
            shortfall: (line.minimum_stock - line.available).max(Decimal::ZERO),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockReport {
    pub critical_count: usize,
    pub items: Vec<CriticalItem>,
}

impl<S: InventoryStore> InventoryCore<S> {
    pub async fn sweep_expired_reservations(
        &self,
        opts: SweepOptions,
    ) -> InventoryResult<ExpiredSweepReport> {
        self.sweep_expired_reservations_at(opts, Utc::now()).await
    }

    /// Expire active reservations whose deadline is before `now`.
    #[instrument(skip(self), fields(batch_limit = opts.batch_limit, dry_run = opts.dry_run), err)]
    pub async fn sweep_expired_reservations_at(
        &self,
        opts: SweepOptions,
        now: DateTime<Utc>,
    ) -> InventoryResult<ExpiredSweepReport> {
        let ttl = opts.ttl()?;
        let candidates = self.expired_candidates(opts, ttl, now).await?;
        if opts.dry_run {
            info!(candidates = candidates.len(), "dry run, nothing expired");
            return Ok(ExpiredSweepReport {
                scanned: candidates.len(),
                released_count: candidates.len(),
                dry_run: true,
                released: candidates,
                ..ExpiredSweepReport::default()
            });
        }
        Ok(self.expire_candidates(candidates, ttl, now).await)
    }

    /// Snapshot of due reservation ids; nothing is locked past the read.
    pub(crate) async fn expired_candidates(
        &self,
        opts: SweepOptions,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> InventoryResult<Vec<ReservationId>> {
        let mut tx = self.store().begin().await?;
        let candidates = tx
            .expired_reservation_candidates(now, ttl, opts.batch_limit)
            .await?;
        tx.rollback().await?;
        Ok(candidates)
    }

    /// Expire each candidate in its own transaction, re-checking it first.
    pub(crate) async fn expire_candidates(
        &self,
        candidates: Vec<ReservationId>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> ExpiredSweepReport {
        let mut report = ExpiredSweepReport {
            scanned: candidates.len(),
            ..ExpiredSweepReport::default()
        };
        for id in candidates {
            match self.expire_if_due(id, UserId::SYSTEM, ttl, now).await {
                Ok(Some(_)) => report.released.push(id),
                Ok(None) => report.skipped += 1,
                Err(err) => {
                    warn!(reservation_id = %id, error = %err, code = err.code(), "failed to expire reservation");
                    report.failed += 1;
                }
            }
        }
        report.released_count = report.released.len();

        info!(
            scanned = report.scanned,
            released = report.released_count,
            skipped = report.skipped,
            failed = report.failed,
            "expired reservation sweep finished"
        );
        report
    }

    /// Report lines at or below their minimum and alert the configured
    /// recipients. Enqueue failures are logged; the report is still returned.
    #[instrument(skip(self), err)]
    pub async fn sweep_low_stock(&self) -> InventoryResult<LowStockReport> {
        let mut tx = self.store().begin().await?;
        let lines = tx.low_stock_lines().await?;
        tx.rollback().await?;

        let items: Vec<CriticalItem> = lines.iter().map(CriticalItem::from).collect();
        let report = LowStockReport {
            critical_count: items.len(),
            items,
        };
        if report.items.is_empty() {
            debug!("no critical stock lines");
            return Ok(report);
        }

        let recipients = &self.settings().alert_recipients;
        if recipients.is_empty() {
            warn!(critical = report.critical_count, "low stock detected but no alert recipients configured");
            return Ok(report);
        }

        let notification = Notification {
            recipients: recipients.clone(),
            payload: json!({
                "kind": "LOW_STOCK",
                "critical_count": report.critical_count,
                "items": report.items,
            }),
        };
        match self.notifier().enqueue(notification) {
            Ok(()) => info!(critical = report.critical_count, "low stock alert enqueued"),
            Err(err) => warn!(error = %err, "low stock alert not enqueued"),
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::test_harness;
    use stockledger_inventory::{ReservationState, ReserveStock};

    fn reserve(key: StockKey, quantity: i64, expires_at: Option<DateTime<Utc>>) -> ReserveStock {
        ReserveStock {
            product_id: key.product_id,
            warehouse_id: key.warehouse_id,
            location_id: None,
            quantity: Decimal::from(quantity),
            linked_transaction_id: None,
            linked_detail_id: None,
            expires_at,
            reason: Some("checkout".to_string()),
            actor: UserId::new(),
        }
    }

    #[tokio::test]
    async fn expired_sweep_releases_only_overdue_reservations() {
        let h = test_harness();
        let key = h.default_key(h.product().await);
        h.seed(key, 10).await;

        let short = h
            .core
            .reserve_stock(reserve(key, 2, Some(Utc::now() + Duration::minutes(5))))
            .await
            .unwrap();
        let long = h
            .core
            .reserve_stock(reserve(key, 3, Some(Utc::now() + Duration::days(3))))
            .await
            .unwrap();

        let later = Utc::now() + Duration::hours(1);
        let report = h
            .core
            .sweep_expired_reservations_at(SweepOptions::default(), later)
            .await
            .unwrap();
        assert_eq!(report.released, vec![short.id]);
        assert_eq!(report.released_count, 1);
        assert_eq!(report.failed, 0);

        let line = h.line(key).await;
        assert_eq!((line.available, line.committed), (Decimal::from(7), Decimal::from(3)));
        assert_eq!(
            h.core.get_reservation(short.id).await.unwrap().state,
            ReservationState::Expired
        );
        assert!(h.core.get_reservation(long.id).await.unwrap().is_active());
    }

    #[tokio::test]
    async fn default_ttl_applies_without_expiry() {
        let h = test_harness();
        let key = h.default_key(h.product().await);
        h.seed(key, 4).await;
        let reservation = h.core.reserve_stock(reserve(key, 4, None)).await.unwrap();

        let opts = SweepOptions {
            ttl_hours: 2,
            ..SweepOptions::default()
        };
        let report = h
            .core
            .sweep_expired_reservations_at(opts, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(report.released_count, 0);

        let report = h
            .core
            .sweep_expired_reservations_at(opts, Utc::now() + Duration::hours(3))
            .await
            .unwrap();
        assert_eq!(report.released, vec![reservation.id]);
        assert_eq!(h.line(key).await.available, Decimal::from(4));
    }

    #[tokio::test]
    async fn reservation_confirmed_after_listing_is_skipped() {
        let h = test_harness();
        let key = h.default_key(h.product().await);
        h.seed(key, 6).await;
        let raced = h
            .core
            .reserve_stock(reserve(key, 4, Some(Utc::now() + Duration::minutes(1))))
            .await
            .unwrap();

        let opts = SweepOptions::default();
        let ttl = opts.ttl().unwrap();
        let later = Utc::now() + Duration::hours(1);
        let candidates = h.core.expired_candidates(opts, ttl, later).await.unwrap();
        assert_eq!(candidates, vec![raced.id]);

        h.core.confirm_reservation(raced.id, UserId::new()).await.unwrap();

        let report = h.core.expire_candidates(candidates, ttl, later).await;
        assert_eq!((report.scanned, report.skipped), (1, 1));
        assert_eq!((report.released_count, report.failed), (0, 0));
        assert_eq!(
            h.core.get_reservation(raced.id).await.unwrap().state,
            ReservationState::Confirmed
        );
        let line = h.line(key).await;
        assert_eq!((line.available, line.committed), (Decimal::from(2), Decimal::ZERO));
        assert!(h.audit.actions().iter().all(|a| a != "RESERVATION_EXPIRE"));
    }

    #[tokio::test]
    async fn out_of_range_ttl_is_rejected() {
        let h = test_harness();
        for ttl_hours in [0, -5, SweepOptions::MAX_TTL_HOURS + 1, i64::MAX] {
            let opts = SweepOptions {
                ttl_hours,
                ..SweepOptions::default()
            };
            let err = h.core.sweep_expired_reservations(opts).await.unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn dry_run_reports_without_mutating() {
        let h = test_harness();
        let key = h.default_key(h.product().await);
        h.seed(key, 5).await;
        let reservation = h
            .core
            .reserve_stock(reserve(key, 5, Some(Utc::now() + Duration::minutes(1))))
            .await
            .unwrap();

        let opts = SweepOptions {
            dry_run: true,
            ..SweepOptions::default()
        };
        let report = h
            .core
            .sweep_expired_reservations_at(opts, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        assert!(report.dry_run);
        assert_eq!(report.released, vec![reservation.id]);
        assert!(h.core.get_reservation(reservation.id).await.unwrap().is_active());
        assert_eq!(h.line(key).await.committed, Decimal::from(5));
        assert!(h.audit.actions().iter().all(|a| a != "RESERVATION_EXPIRE"));
    }

    #[tokio::test]
    async fn batch_limit_bounds_each_run() {
        let h = test_harness();
        let key = h.default_key(h.product().await);
        h.seed(key, 10).await;
        for _ in 0..3 {
            h.core
                .reserve_stock(reserve(key, 1, Some(Utc::now() + Duration::minutes(1))))
                .await
                .unwrap();
        }

        let opts = SweepOptions {
            batch_limit: 2,
            ..SweepOptions::default()
        };
        let later = Utc::now() + Duration::hours(1);
        let first = h.core.sweep_expired_reservations_at(opts, later).await.unwrap();
        let second = h.core.sweep_expired_reservations_at(opts, later).await.unwrap();
        assert_eq!((first.released_count, second.released_count), (2, 1));
        assert_eq!(h.line(key).await.available, Decimal::from(10));
    }

    #[tokio::test]
    async fn low_stock_sweep_alerts_recipients() {
        let h = test_harness();
        let low = h.default_key(h.product().await);
        let fine = h.default_key(h.product().await);
        let unset = h.default_key(h.product().await);
        h.seed(low, 2).await;
        h.seed(fine, 50).await;
        h.seed(unset, 0).await;
        for key in [low, fine] {
            h.core
                .set_minimum_stock(key, Decimal::from(5), UserId::new())
                .await
                .unwrap();
        }

        let report = h.core.sweep_low_stock().await.unwrap();
        assert_eq!(report.critical_count, 1);
        assert_eq!(report.items[0].key, low);
        assert_eq!(report.items[0].shortfall, Decimal::from(3));

        let sent = h.notifications.all();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients, vec!["warehouse@example.test".to_string()]);
        assert_eq!(sent[0].payload["kind"], "LOW_STOCK");
        assert_eq!(sent[0].payload["items"][0]["available"], "2");
    }

    #[tokio::test]
    async fn low_stock_sweep_is_quiet_when_nothing_is_critical() {
        let h = test_harness();
        let key = h.default_key(h.product().await);
        h.seed(key, 1).await;

        let report = h.core.sweep_low_stock().await.unwrap();
        assert_eq!(report, LowStockReport::default());
        assert!(h.notifications.all().is_empty());
    }
}
