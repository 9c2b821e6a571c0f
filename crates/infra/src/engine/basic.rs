//! Direct purchases, manual outflows and adjustments, supplier registration
//! and stock reads. These flows never touch reservations or transfers and
//! always work on the default warehouse line of a product.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use stockledger_core::{
    Decimal, InventoryError, InventoryResult, ProductId, UserId, ensure_positive,
};
use stockledger_inventory::{MovementEntry, MovementKind, StockDelta, StockKey, StockLine};
use stockledger_parties::{RegisterSupplier, SupplierUpsert, TaxId, resolve_registration};
use stockledger_products::Product;
use stockledger_purchasing::{Purchase, PurchaseReceipt, RegisterPurchase};

use super::{InventoryCore, record_movement, require_product};
use crate::store::{InventoryStore, InventoryTx};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterOutflow {
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub reference: Option<String>,
    pub actor: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterAdjustment {
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub reason: String,
    /// `true` adds to `available`, `false` removes from it.
    pub increment: bool,
    pub actor: UserId,
}

/// Stock read for one product: its default line plus the newest ledger
/// entries. Decimals serialize as exact strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub product: Product,
    pub line: StockLine,
    pub recent_movements: Vec<MovementEntry>,
}

impl<S: InventoryStore> InventoryCore<S> {
    fn default_key(&self, product_id: ProductId) -> StockKey {
        StockKey::new(product_id, self.settings.default_warehouse_id)
    }

    /// Receive goods from a supplier: one INGRESO per line, costs blended
    /// into each line's weighted average.
    #[instrument(
        skip(self, cmd),
        fields(supplier_id = %cmd.supplier_id, lines = cmd.lines.len()),
        err
    )]
    pub async fn register_purchase(&self, cmd: RegisterPurchase) -> InventoryResult<PurchaseReceipt> {
        let now = Utc::now();
        let purchase = Purchase::draft(&cmd, now)?;

        let mut tx = self.store.begin().await?;
        match tx.supplier(purchase.supplier_id).await? {
            Some(supplier) if supplier.can_transact() => {}
            _ => return Err(InventoryError::SupplierNotFound(purchase.supplier_id)),
        }
        for line in &purchase.lines {
            require_product(&mut tx, line.product_id).await?;
        }

        // Lock lines in key order so concurrent purchases cannot deadlock.
        let mut lines: Vec<_> = purchase
            .lines
            .iter()
            .map(|line| (self.default_key(line.product_id), line))
            .collect();
        lines.sort_by_key(|(key, _)| *key);

        let reference = purchase.movement_reference();
        for (key, line) in lines {
            let entry = MovementEntry::new(MovementKind::Inbound, key, line.quantity, cmd.actor, now)
                .with_unit_cost(line.unit_cost)
                .with_reference(reference.as_str());
            record_movement(
                &mut tx,
                StockDelta::inbound(line.quantity, Some(line.unit_cost)),
                &entry,
            )
            .await?;
        }
        tx.insert_purchase(&purchase).await?;
        tx.commit().await?;

        let receipt = purchase.receipt();
        info!(purchase_id = %receipt.purchase_id, total = %receipt.total, "purchase registered");
        self.record_audit(
            cmd.actor,
            "PURCHASE_REGISTER",
            format!(
                "purchase {} from supplier {}: {} line(s), total {}",
                receipt.purchase_id, purchase.supplier_id, receipt.line_count, receipt.total
            ),
            "purchases",
        );
        Ok(receipt)
    }

    /// Manual stock-out (SALIDA) from the default warehouse.
    #[instrument(skip(self, cmd), fields(product_id = %cmd.product_id, quantity = %cmd.quantity), err)]
    pub async fn register_outflow(&self, cmd: RegisterOutflow) -> InventoryResult<StockLine> {
        let now = Utc::now();
        let quantity = ensure_positive(cmd.quantity)?;

        let mut tx = self.store.begin().await?;
        require_product(&mut tx, cmd.product_id).await?;
        let mut entry = MovementEntry::new(
            MovementKind::Outbound,
            self.default_key(cmd.product_id),
            quantity,
            cmd.actor,
            now,
        );
        if let Some(reference) = cmd.reference.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            entry = entry.with_reference(reference);
        }
        let line = record_movement(&mut tx, StockDelta::outbound(quantity), &entry).await?;
        tx.commit().await?;

        info!(available = %line.available, "outflow registered");
        self.record_audit(
            cmd.actor,
            "STOCK_OUTFLOW",
            format!("outflow of {quantity} for product {}", cmd.product_id),
            "stock_movements",
        );
        Ok(line)
    }

    /// Manual correction (AJUSTE). A reason is mandatory.
    #[instrument(
        skip(self, cmd),
        fields(product_id = %cmd.product_id, quantity = %cmd.quantity, increment = cmd.increment),
        err
    )]
    pub async fn register_adjustment(&self, cmd: RegisterAdjustment) -> InventoryResult<StockLine> {
        let now = Utc::now();
        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(InventoryError::MissingAdjustmentReason);
        }
        let quantity = ensure_positive(cmd.quantity)?;

        let mut tx = self.store.begin().await?;
        require_product(&mut tx, cmd.product_id).await?;
        let entry = MovementEntry::adjustment(
            self.default_key(cmd.product_id),
            quantity,
            cmd.increment,
            cmd.actor,
            now,
        )
        .with_reference(reason);
        let delta = if cmd.increment {
            StockDelta::inbound(quantity, None)
        } else {
            StockDelta::outbound(quantity)
        };
        let line = record_movement(&mut tx, delta, &entry).await?;
        tx.commit().await?;

        info!(available = %line.available, "adjustment registered");
        self.record_audit(
            cmd.actor,
            "STOCK_ADJUSTMENT",
            format!(
                "adjustment {}{quantity} for product {}: {reason}",
                if cmd.increment { "+" } else { "-" },
                cmd.product_id
            ),
            "stock_movements",
        );
        Ok(line)
    }

    /// Create or update a supplier keyed by tax id.
    #[instrument(skip(self, cmd), fields(tax_id = %cmd.tax_id), err)]
    pub async fn register_supplier(&self, cmd: RegisterSupplier) -> InventoryResult<SupplierUpsert> {
        let now = Utc::now();
        let tax_id = TaxId::parse(&cmd.tax_id)?;

        let mut tx = self.store.begin().await?;
        let by_tax_id = tx.supplier_by_tax_id(&tax_id).await?;
        let by_id = match cmd.supplier_id {
            Some(id) => tx.supplier(id).await?,
            None => None,
        };
        let upsert = resolve_registration(&cmd, by_tax_id, by_id, now)?;
        tx.put_supplier(upsert.supplier()).await?;
        tx.commit().await?;

        let (action, verb) = match &upsert {
            SupplierUpsert::Created(_) => ("SUPPLIER_CREATE", "registered"),
            SupplierUpsert::Updated(_) => ("SUPPLIER_UPDATE", "updated"),
        };
        let supplier = upsert.supplier();
        info!(supplier_id = %supplier.id, "supplier {verb}");
        self.record_audit(
            cmd.actor,
            action,
            format!("supplier {} ({}) {verb}", supplier.name, supplier.tax_id),
            "suppliers",
        );
        Ok(upsert)
    }

    /// Default-warehouse line of a product (zero line if never stocked) and
    /// its newest movements.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn get_stock(&self, product_id: ProductId) -> InventoryResult<StockSnapshot> {
        let key = self.default_key(product_id);
        let mut tx = self.store.begin().await?;
        let product = require_product(&mut tx, product_id).await?;
        let line = tx
            .stock_line(&key)
            .await?
            .unwrap_or_else(|| StockLine::empty(key));
        let recent_movements = tx
            .recent_movements(product_id, self.settings.recent_movements_limit)
            .await?;
        tx.rollback().await?;

        Ok(StockSnapshot {
            product,
            line,
            recent_movements,
        })
    }
}
