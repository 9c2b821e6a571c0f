//! Postgres-backed inventory store.
//!
//! Stock lines are serialised per row: every mutator goes through
//! [`InventoryTx::lock_stock_line`], which upserts a zero baseline row and then
//! takes `SELECT … FOR UPDATE`. Writers on the same line queue behind each
//! other; writers on different lines never block.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Conflict` |
//! | Database (check / foreign key violation) | `23514` / `23503` | `Corrupt` |
//! | Database (other) | Any other | `Unavailable` |
//! | Decode / ColumnDecode / ColumnNotFound | N/A | `Corrupt` |
//! | PoolClosed / PoolTimedOut / Io / other | N/A | `Unavailable` |

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use stockledger_core::{ProductId, ReservationId, SupplierId, TransferId};
use stockledger_inventory::{
    MovementEntry, Reservation, StockKey, StockLine, Transfer,
};
use stockledger_parties::{ContactInfo, Supplier, TaxId};
use stockledger_products::Product;
use stockledger_purchasing::Purchase;

use super::{InventoryStore, InventoryTx, StoreError, StoreResult};

const SCHEMA: &str = include_str!("../../migrations/0001_inventory.sql");

macro_rules! stock_line_columns {
    () => {
        "product_id, warehouse_id, location_id, available, committed, average_cost, minimum_stock, updated_at"
    };
}

macro_rules! movement_columns {
    () => {
        "id, kind, direction, product_id, warehouse_id, location_id, quantity, unit_cost, reference, actor_user_id, created_at"
    };
}

macro_rules! reservation_columns {
    () => {
        "id, product_id, warehouse_id, location_id, quantity, state, linked_transaction_id, linked_detail_id, \
         expires_at, reason, state_reason, created_by, closed_by, created_at, updated_at, closed_at"
    };
}

macro_rules! transfer_columns {
    () => {
        "id, product_id, origin_warehouse_id, destination_warehouse_id, quantity, state, unit_cost, \
         dispatch_movement_id, receipt_movement_id, return_movement_id, reference, notes, created_by, \
         closed_by, created_at, updated_at, closed_at"
    };
}

macro_rules! supplier_columns {
    () => {
        "id, name, tax_id, email, phone, address, contact_name, status, created_by, created_at, updated_at"
    };
}

/// Postgres inventory store over a shared connection pool.
#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `url`.
    #[instrument(skip(url), err)]
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn apply_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresTx { tx })
    }
}

/// One database transaction. Dropped without commit = rolled back.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

impl PostgresTx {
    async fn fetch_reservation(&mut self, id: ReservationId, lock: bool) -> StoreResult<Option<Reservation>> {
        let sql = if lock {
            concat!("SELECT ", reservation_columns!(), " FROM reservations WHERE id = $1 FOR UPDATE")
        } else {
            concat!("SELECT ", reservation_columns!(), " FROM reservations WHERE id = $1")
        };
        let row = sqlx::query(sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("select_reservation", e))?;
        row.map(|r| decode::<ReservationRow>(&r)?.into_domain()).transpose()
    }

    async fn fetch_transfer(&mut self, id: TransferId, lock: bool) -> StoreResult<Option<Transfer>> {
        let sql = if lock {
            concat!("SELECT ", transfer_columns!(), " FROM transfers WHERE id = $1 FOR UPDATE")
        } else {
            concat!("SELECT ", transfer_columns!(), " FROM transfers WHERE id = $1")
        };
        let row = sqlx::query(sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("select_transfer", e))?;
        row.map(|r| decode::<TransferRow>(&r)?.into_domain()).transpose()
    }

    async fn fetch_supplier(&mut self, sql: &'static str, bind: Uuid) -> StoreResult<Option<Supplier>> {
        let row = sqlx::query(sql)
            .bind(bind)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("select_supplier", e))?;
        row.map(|r| decode::<SupplierRow>(&r)?.into_domain()).transpose()
    }
}

#[async_trait]
impl InventoryTx for PostgresTx {
    async fn product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        let row = sqlx::query("SELECT id, sku, name, status FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("select_product", e))?;
        row.map(|r| decode::<ProductRow>(&r)?.into_domain()).transpose()
    }

    async fn put_product(&mut self, product: &Product) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, sku, name, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET sku = EXCLUDED.sku, name = EXCLUDED.name, status = EXCLUDED.status
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_product", e))?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self), fields(key = %key), err)]
    async fn lock_stock_line(&mut self, key: &StockKey) -> StoreResult<StockLine> {
        // Baseline first so concurrent first-writers converge on one row.
        sqlx::query(
            r#"
            INSERT INTO stock_lines (product_id, warehouse_id, location_id)
            VALUES ($1, $2, $3)
            ON CONFLICT ON CONSTRAINT stock_lines_key DO NOTHING
            "#,
        )
        .bind(key.product_id.as_uuid())
        .bind(key.warehouse_id.as_uuid())
        .bind(key.location_id.map(Uuid::from))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_stock_line_baseline", e))?;

        let row = sqlx::query(concat!(
            "SELECT ",
            stock_line_columns!(),
            " FROM stock_lines WHERE product_id = $1 AND warehouse_id = $2 \
             AND location_id IS NOT DISTINCT FROM $3 FOR UPDATE"
        ))
        .bind(key.product_id.as_uuid())
        .bind(key.warehouse_id.as_uuid())
        .bind(key.location_id.map(Uuid::from))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_stock_line", e))?;

        Ok::<_, StoreError>(decode::<StockLineRow>(&row)?.into_domain())
    }

    async fn stock_line(&mut self, key: &StockKey) -> StoreResult<Option<StockLine>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            stock_line_columns!(),
            " FROM stock_lines WHERE product_id = $1 AND warehouse_id = $2 \
             AND location_id IS NOT DISTINCT FROM $3"
        ))
        .bind(key.product_id.as_uuid())
        .bind(key.warehouse_id.as_uuid())
        .bind(key.location_id.map(Uuid::from))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("select_stock_line", e))?;

        row.map(|r| Ok::<_, StoreError>(decode::<StockLineRow>(&r)?.into_domain()))
            .transpose()
    }

    async fn put_stock_line(&mut self, line: &StockLine) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE stock_lines
            SET available = $4, committed = $5, average_cost = $6, minimum_stock = $7, updated_at = $8
            WHERE product_id = $1 AND warehouse_id = $2 AND location_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(line.key.product_id.as_uuid())
        .bind(line.key.warehouse_id.as_uuid())
        .bind(line.key.location_id.map(Uuid::from))
        .bind(line.available)
        .bind(line.committed)
        .bind(line.average_cost)
        .bind(line.minimum_stock)
        .bind(line.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_stock_line", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Corrupt(format!(
                "stock line {} was not locked before update",
                line.key
            )));
        }
        Ok(())
    }

    async fn stock_lines_for_product(&mut self, product_id: ProductId) -> StoreResult<Vec<StockLine>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            stock_line_columns!(),
            " FROM stock_lines WHERE product_id = $1 ORDER BY warehouse_id, location_id NULLS FIRST"
        ))
        .bind(product_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("select_stock_lines_for_product", e))?;

        rows.iter()
            .map(|r| Ok::<_, StoreError>(decode::<StockLineRow>(r)?.into_domain()))
            .collect()
    }

    async fn low_stock_lines(&mut self) -> StoreResult<Vec<StockLine>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            stock_line_columns!(),
            " FROM stock_lines WHERE minimum_stock > 0 AND available <= minimum_stock \
             ORDER BY product_id, warehouse_id"
        ))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("select_low_stock_lines", e))?;

        rows.iter()
            .map(|r| Ok::<_, StoreError>(decode::<StockLineRow>(r)?.into_domain()))
            .collect()
    }

    #[instrument(
        level = "debug",
        skip(self, entry),
        fields(movement_id = %entry.id, kind = entry.kind.as_str()),
        err
    )]
    async fn insert_movement(&mut self, entry: &MovementEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, kind, direction, product_id, warehouse_id, location_id,
                quantity, unit_cost, reference, actor_user_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.kind.as_str())
        .bind(entry.direction.as_str())
        .bind(entry.product_id.as_uuid())
        .bind(entry.stock_key.warehouse_id.as_uuid())
        .bind(entry.stock_key.location_id.map(Uuid::from))
        .bind(entry.quantity)
        .bind(entry.unit_cost)
        .bind(entry.reference.as_deref())
        .bind(entry.actor_user_id.as_uuid())
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;
        Ok(())
    }

    async fn recent_movements(
        &mut self,
        product_id: ProductId,
        limit: usize,
    ) -> StoreResult<Vec<MovementEntry>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            movement_columns!(),
            " FROM stock_movements WHERE product_id = $1 ORDER BY created_at DESC, seq DESC LIMIT $2"
        ))
        .bind(product_id.as_uuid())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("select_recent_movements", e))?;

        rows.iter()
            .map(|r| decode::<MovementRow>(r)?.into_domain())
            .collect()
    }

    async fn movements_for_line(&mut self, key: &StockKey) -> StoreResult<Vec<MovementEntry>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            movement_columns!(),
            " FROM stock_movements WHERE product_id = $1 AND warehouse_id = $2 \
             AND location_id IS NOT DISTINCT FROM $3 ORDER BY seq ASC"
        ))
        .bind(key.product_id.as_uuid())
        .bind(key.warehouse_id.as_uuid())
        .bind(key.location_id.map(Uuid::from))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("select_line_movements", e))?;

        rows.iter()
            .map(|r| decode::<MovementRow>(r)?.into_domain())
            .collect()
    }

    async fn reservation(&mut self, id: ReservationId) -> StoreResult<Option<Reservation>> {
        self.fetch_reservation(id, false).await
    }

    async fn lock_reservation(&mut self, id: ReservationId) -> StoreResult<Option<Reservation>> {
        self.fetch_reservation(id, true).await
    }

    async fn put_reservation(&mut self, r: &Reservation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reservations (
                id, product_id, warehouse_id, location_id, quantity, state,
                linked_transaction_id, linked_detail_id, expires_at, reason, state_reason,
                created_by, closed_by, created_at, updated_at, closed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (id) DO UPDATE
            SET state = EXCLUDED.state,
                state_reason = EXCLUDED.state_reason,
                closed_by = EXCLUDED.closed_by,
                updated_at = EXCLUDED.updated_at,
                closed_at = EXCLUDED.closed_at
            "#,
        )
        .bind(r.id.as_uuid())
        .bind(r.product_id.as_uuid())
        .bind(r.warehouse_id.as_uuid())
        .bind(r.location_id.map(Uuid::from))
        .bind(r.quantity)
        .bind(r.state.as_str())
        .bind(r.linked_transaction_id)
        .bind(r.linked_detail_id)
        .bind(r.expires_at)
        .bind(r.reason.as_deref())
        .bind(r.state_reason.as_deref())
        .bind(r.created_by.as_uuid())
        .bind(r.closed_by.map(Uuid::from))
        .bind(r.created_at)
        .bind(r.updated_at)
        .bind(r.closed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_reservation", e))?;
        Ok(())
    }

    async fn active_reservations_for_transaction(
        &mut self,
        linked_transaction_id: Uuid,
    ) -> StoreResult<Vec<ReservationId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM reservations
            WHERE linked_transaction_id = $1 AND state = 'ACTIVE'
            ORDER BY created_at ASC
            "#,
        )
        .bind(linked_transaction_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("select_reservations_for_transaction", e))?;
        Ok(ids.into_iter().map(ReservationId::from).collect())
    }

    async fn expired_reservation_candidates(
        &mut self,
        now: DateTime<Utc>,
        default_ttl: Duration,
        limit: usize,
    ) -> StoreResult<Vec<ReservationId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM reservations
            WHERE state = 'ACTIVE'
              AND COALESCE(expires_at, created_at + make_interval(secs => $2)) < $1
            ORDER BY COALESCE(expires_at, created_at + make_interval(secs => $2)) ASC
            LIMIT $3
            "#,
        )
        .bind(now)
        .bind(default_ttl.num_seconds() as f64)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("select_expired_reservations", e))?;
        Ok(ids.into_iter().map(ReservationId::from).collect())
    }

    async fn transfer(&mut self, id: TransferId) -> StoreResult<Option<Transfer>> {
        self.fetch_transfer(id, false).await
    }

    async fn lock_transfer(&mut self, id: TransferId) -> StoreResult<Option<Transfer>> {
        self.fetch_transfer(id, true).await
    }

    async fn put_transfer(&mut self, t: &Transfer) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transfers (
                id, product_id, origin_warehouse_id, destination_warehouse_id, quantity, state,
                unit_cost, dispatch_movement_id, receipt_movement_id, return_movement_id,
                reference, notes, created_by, closed_by, created_at, updated_at, closed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (id) DO UPDATE
            SET state = EXCLUDED.state,
                receipt_movement_id = EXCLUDED.receipt_movement_id,
                return_movement_id = EXCLUDED.return_movement_id,
                notes = EXCLUDED.notes,
                closed_by = EXCLUDED.closed_by,
                updated_at = EXCLUDED.updated_at,
                closed_at = EXCLUDED.closed_at
            "#,
        )
        .bind(t.id.as_uuid())
        .bind(t.product_id.as_uuid())
        .bind(t.origin_warehouse_id.as_uuid())
        .bind(t.destination_warehouse_id.as_uuid())
        .bind(t.quantity)
        .bind(t.state.as_str())
        .bind(t.unit_cost)
        .bind(t.dispatch_movement_id.as_uuid())
        .bind(t.receipt_movement_id.map(Uuid::from))
        .bind(t.return_movement_id.map(Uuid::from))
        .bind(t.reference.as_deref())
        .bind(t.notes.as_deref())
        .bind(t.created_by.as_uuid())
        .bind(t.closed_by.map(Uuid::from))
        .bind(t.created_at)
        .bind(t.updated_at)
        .bind(t.closed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_transfer", e))?;
        Ok(())
    }

    async fn supplier(&mut self, id: SupplierId) -> StoreResult<Option<Supplier>> {
        self.fetch_supplier(
            concat!("SELECT ", supplier_columns!(), " FROM suppliers WHERE id = $1"),
            *id.as_uuid(),
        )
        .await
    }

    async fn supplier_by_tax_id(&mut self, tax_id: &TaxId) -> StoreResult<Option<Supplier>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            supplier_columns!(),
            " FROM suppliers WHERE tax_id = $1 FOR UPDATE"
        ))
        .bind(tax_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("select_supplier_by_tax_id", e))?;
        row.map(|r| decode::<SupplierRow>(&r)?.into_domain()).transpose()
    }

    async fn put_supplier(&mut self, s: &Supplier) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO suppliers (
                id, name, tax_id, email, phone, address, contact_name, status,
                created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                tax_id = EXCLUDED.tax_id,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                address = EXCLUDED.address,
                contact_name = EXCLUDED.contact_name,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(s.id.as_uuid())
        .bind(&s.name)
        .bind(s.tax_id.as_str())
        .bind(s.contact.email.as_deref())
        .bind(s.contact.phone.as_deref())
        .bind(s.contact.address.as_deref())
        .bind(s.contact.contact_name.as_deref())
        .bind(s.status.as_str())
        .bind(s.created_by.as_uuid())
        .bind(s.created_at)
        .bind(s.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_supplier", e))?;
        Ok(())
    }

    async fn insert_purchase(&mut self, purchase: &Purchase) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO purchases (id, supplier_id, reference, total, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(purchase.id.as_uuid())
        .bind(purchase.supplier_id.as_uuid())
        .bind(purchase.reference.as_deref())
        .bind(purchase.total)
        .bind(purchase.created_by.as_uuid())
        .bind(purchase.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_purchase", e))?;

        for line in &purchase.lines {
            sqlx::query(
                r#"
                INSERT INTO purchase_lines (purchase_id, line_no, product_id, quantity, unit_cost, subtotal)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(purchase.id.as_uuid())
            .bind(i32::try_from(line.line_no).unwrap_or(i32::MAX))
            .bind(line.product_id.as_uuid())
            .bind(line.quantity)
            .bind(line.unit_cost)
            .bind(line.subtotal)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_purchase_line", e))?;
        }
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback_transaction", e))
    }
}

fn decode<'r, T: FromRow<'r, PgRow>>(row: &'r PgRow) -> StoreResult<T> {
    T::from_row(row).map_err(|e| StoreError::Corrupt(format!("failed to decode row: {e}")))
}

fn parse<T: core::str::FromStr>(column: &str, raw: &str) -> StoreResult<T>
where
    T::Err: core::fmt::Display,
{
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

struct ProductRow {
    id: Uuid,
    sku: String,
    name: String,
    status: String,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            sku: row.try_get("sku")?,
            name: row.try_get("name")?,
            status: row.try_get("status")?,
        })
    }
}

impl ProductRow {
    fn into_domain(self) -> StoreResult<Product> {
        Ok(Product {
            id: self.id.into(),
            sku: self.sku,
            name: self.name,
            status: parse("status", &self.status)?,
        })
    }
}

struct StockLineRow {
    product_id: Uuid,
    warehouse_id: Uuid,
    location_id: Option<Uuid>,
    available: Decimal,
    committed: Decimal,
    average_cost: Decimal,
    minimum_stock: Decimal,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for StockLineRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StockLineRow {
            product_id: row.try_get("product_id")?,
            warehouse_id: row.try_get("warehouse_id")?,
            location_id: row.try_get("location_id")?,
            available: row.try_get("available")?,
            committed: row.try_get("committed")?,
            average_cost: row.try_get("average_cost")?,
            minimum_stock: row.try_get("minimum_stock")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl StockLineRow {
    fn into_domain(self) -> StockLine {
        StockLine {
            key: StockKey::new(self.product_id.into(), self.warehouse_id.into())
                .at_location(self.location_id.map(Into::into)),
            available: self.available.normalize(),
            committed: self.committed.normalize(),
            average_cost: self.average_cost.normalize(),
            minimum_stock: self.minimum_stock.normalize(),
            updated_at: self.updated_at,
        }
    }
}

struct MovementRow {
    id: Uuid,
    kind: String,
    direction: String,
    product_id: Uuid,
    warehouse_id: Uuid,
    location_id: Option<Uuid>,
    quantity: Decimal,
    unit_cost: Option<Decimal>,
    reference: Option<String>,
    actor_user_id: Uuid,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            direction: row.try_get("direction")?,
            product_id: row.try_get("product_id")?,
            warehouse_id: row.try_get("warehouse_id")?,
            location_id: row.try_get("location_id")?,
            quantity: row.try_get("quantity")?,
            unit_cost: row.try_get("unit_cost")?,
            reference: row.try_get("reference")?,
            actor_user_id: row.try_get("actor_user_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl MovementRow {
    fn into_domain(self) -> StoreResult<MovementEntry> {
        let stock_key = StockKey::new(self.product_id.into(), self.warehouse_id.into())
            .at_location(self.location_id.map(Into::into));
        Ok(MovementEntry {
            id: self.id.into(),
            kind: parse("kind", &self.kind)?,
            direction: parse("direction", &self.direction)?,
            product_id: stock_key.product_id,
            stock_key,
            quantity: self.quantity.normalize(),
            unit_cost: self.unit_cost.map(|c| c.normalize()),
            reference: self.reference,
            actor_user_id: self.actor_user_id.into(),
            created_at: self.created_at,
        })
    }
}

struct ReservationRow {
    id: Uuid,
    product_id: Uuid,
    warehouse_id: Uuid,
    location_id: Option<Uuid>,
    quantity: Decimal,
    state: String,
    linked_transaction_id: Option<Uuid>,
    linked_detail_id: Option<Uuid>,
    expires_at: Option<DateTime<Utc>>,
    reason: Option<String>,
    state_reason: Option<String>,
    created_by: Uuid,
    closed_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for ReservationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ReservationRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            warehouse_id: row.try_get("warehouse_id")?,
            location_id: row.try_get("location_id")?,
            quantity: row.try_get("quantity")?,
            state: row.try_get("state")?,
            linked_transaction_id: row.try_get("linked_transaction_id")?,
            linked_detail_id: row.try_get("linked_detail_id")?,
            expires_at: row.try_get("expires_at")?,
            reason: row.try_get("reason")?,
            state_reason: row.try_get("state_reason")?,
            created_by: row.try_get("created_by")?,
            closed_by: row.try_get("closed_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            closed_at: row.try_get("closed_at")?,
        })
    }
}

impl ReservationRow {
    fn into_domain(self) -> StoreResult<Reservation> {
        Ok(Reservation {
            id: self.id.into(),
            product_id: self.product_id.into(),
            warehouse_id: self.warehouse_id.into(),
            location_id: self.location_id.map(Into::into),
            quantity: self.quantity.normalize(),
            state: parse("state", &self.state)?,
            linked_transaction_id: self.linked_transaction_id,
            linked_detail_id: self.linked_detail_id,
            expires_at: self.expires_at,
            reason: self.reason,
            state_reason: self.state_reason,
            created_by: self.created_by.into(),
            closed_by: self.closed_by.map(Into::into),
            created_at: self.created_at,
            updated_at: self.updated_at,
            closed_at: self.closed_at,
        })
    }
}

struct TransferRow {
    id: Uuid,
    product_id: Uuid,
    origin_warehouse_id: Uuid,
    destination_warehouse_id: Uuid,
    quantity: Decimal,
    state: String,
    unit_cost: Decimal,
    dispatch_movement_id: Uuid,
    receipt_movement_id: Option<Uuid>,
    return_movement_id: Option<Uuid>,
    reference: Option<String>,
    notes: Option<String>,
    created_by: Uuid,
    closed_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for TransferRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TransferRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            origin_warehouse_id: row.try_get("origin_warehouse_id")?,
            destination_warehouse_id: row.try_get("destination_warehouse_id")?,
            quantity: row.try_get("quantity")?,
            state: row.try_get("state")?,
            unit_cost: row.try_get("unit_cost")?,
            dispatch_movement_id: row.try_get("dispatch_movement_id")?,
            receipt_movement_id: row.try_get("receipt_movement_id")?,
            return_movement_id: row.try_get("return_movement_id")?,
            reference: row.try_get("reference")?,
            notes: row.try_get("notes")?,
            created_by: row.try_get("created_by")?,
            closed_by: row.try_get("closed_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            closed_at: row.try_get("closed_at")?,
        })
    }
}

impl TransferRow {
    fn into_domain(self) -> StoreResult<Transfer> {
        Ok(Transfer {
            id: self.id.into(),
            product_id: self.product_id.into(),
            origin_warehouse_id: self.origin_warehouse_id.into(),
            destination_warehouse_id: self.destination_warehouse_id.into(),
            quantity: self.quantity.normalize(),
            state: parse("state", &self.state)?,
            unit_cost: self.unit_cost.normalize(),
            dispatch_movement_id: self.dispatch_movement_id.into(),
            receipt_movement_id: self.receipt_movement_id.map(Into::into),
            return_movement_id: self.return_movement_id.map(Into::into),
            reference: self.reference,
            notes: self.notes,
            created_by: self.created_by.into(),
            closed_by: self.closed_by.map(Into::into),
            created_at: self.created_at,
            updated_at: self.updated_at,
            closed_at: self.closed_at,
        })
    }
}

struct SupplierRow {
    id: Uuid,
    name: String,
    tax_id: String,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    contact_name: Option<String>,
    status: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for SupplierRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SupplierRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            tax_id: row.try_get("tax_id")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            address: row.try_get("address")?,
            contact_name: row.try_get("contact_name")?,
            status: row.try_get("status")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl SupplierRow {
    fn into_domain(self) -> StoreResult<Supplier> {
        Ok(Supplier {
            id: self.id.into(),
            name: self.name,
            tax_id: TaxId::parse(&self.tax_id)
                .map_err(|e| StoreError::Corrupt(format!("column tax_id: {e}")))?,
            contact: ContactInfo {
                email: self.email,
                phone: self.phone,
                address: self.address,
                contact_name: self.contact_name,
            },
            status: parse("status", &self.status)?,
            created_by: self.created_by.into(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Map sqlx errors to store errors, keyed on the SQLSTATE where available.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                Some("23503") | Some("23514") => StoreError::Corrupt(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::RowNotFound => {
            StoreError::Corrupt(format!("unexpected row shape in {operation}: {err}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}
