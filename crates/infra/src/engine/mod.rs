//! Transactional inventory engine.
//!
//! [`InventoryCore`] is the narrow API callers use (order processing, purchase
//! intake, manual stock actions, the reconciliation jobs). Each public
//! operation:
//!
//! 1. validates what it can without IO (pure domain constructors),
//! 2. opens one store transaction and locks the rows it touches,
//! 3. applies domain transitions and stock deltas, appending ledger entries,
//! 4. commits, then logs and writes the audit entry.
//!
//! Any error before commit drops the transaction, so failure paths never leave
//! partial ledger or aggregate writes.

use std::sync::Arc;

use uuid::Uuid;

use stockledger_core::{InventoryResult, ProductId, UserId, WarehouseId};
use stockledger_products::{Product, require_stockable};

use crate::sinks::{
    AuditEntry, AuditSink, NoopAuditSink, NoopNotificationSink, NotificationSink,
};
use crate::store::{InventoryStore, InventoryTx};

pub mod basic;
pub mod ledger;
pub mod reservations;
pub mod stock;
pub mod transfers;

pub use basic::{RegisterAdjustment, RegisterOutflow, StockSnapshot};
pub use ledger::record_movement;
pub use stock::{LineVerification, apply_delta};

/// Engine settings, resolved by the caller (see `config::Settings`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreSettings {
    /// Warehouse used by the purchase/outflow/adjustment module.
    pub default_warehouse_id: WarehouseId,
    pub recent_movements_limit: usize,
    /// Recipients of low-stock alerts.
    pub alert_recipients: Vec<String>,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            default_warehouse_id: WarehouseId::from_uuid(Uuid::nil()),
            recent_movements_limit: 20,
            alert_recipients: Vec::new(),
        }
    }
}

/// Inventory ledger, reservation and transfer engine over a store `S`.
pub struct InventoryCore<S: InventoryStore> {
    store: Arc<S>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn NotificationSink>,
    settings: CoreSettings,
}

impl<S: InventoryStore> InventoryCore<S> {
    /// Engine with no-op audit and notification sinks.
    pub fn new(store: Arc<S>, settings: CoreSettings) -> Self {
        Self {
            store,
            audit: Arc::new(NoopAuditSink),
            notifier: Arc::new(NoopNotificationSink),
            settings,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn settings(&self) -> &CoreSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Mirror a catalog record into the store (create or replace).
    pub async fn sync_product(&self, product: &Product) -> InventoryResult<()> {
        let mut tx = self.store.begin().await?;
        tx.put_product(product).await?;
        tx.commit().await?;
        Ok(())
    }

    pub(crate) fn notifier(&self) -> &dyn NotificationSink {
        self.notifier.as_ref()
    }

    pub(crate) fn record_audit(
        &self,
        actor: UserId,
        action: &str,
        description: String,
        table: &str,
    ) {
        self.audit
            .record(AuditEntry::new(actor, action, description, table));
    }
}

/// Load a product and require it to be stockable (exists and active).
pub(crate) async fn require_product<T: InventoryTx>(
    tx: &mut T,
    product_id: ProductId,
) -> InventoryResult<Product> {
    let product = tx.product(product_id).await?;
    require_stockable(product, product_id)
}


#[cfg(test)]
mod tests {
    use super::test_support::test_harness;
    use super::*;
    use stockledger_core::InventoryError;

    #[tokio::test]
    async fn sync_product_makes_it_visible() {
        let h = test_harness();
        let id = ProductId::new();
        let mut product = Product::active(id, "P-1", "Pallet").unwrap();
        h.core.sync_product(&product).await.unwrap();

        let mut tx = h.store.begin().await.unwrap();
        assert!(require_product(&mut tx, id).await.is_ok());
        drop(tx);

        product.archive();
        h.core.sync_product(&product).await.unwrap();
        let mut tx = h.store.begin().await.unwrap();
        assert_eq!(
            require_product(&mut tx, id).await.unwrap_err(),
            InventoryError::ProductNotFound(id)
        );
    }
}
