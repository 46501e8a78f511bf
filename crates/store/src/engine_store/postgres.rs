//! Postgres-backed engine store.
//!
//! Every `EngineStore` method runs as one database transaction with explicit
//! commit; an error on any statement rolls the whole unit back.
//!
//! ## Sequence allocation
//!
//! Reference numbers come from a dedicated per-scope counter row, bumped
//! with a single `INSERT .. ON CONFLICT .. DO UPDATE .. RETURNING` inside
//! the caller's transaction. The row lock taken by that statement is the
//! serialization point for a scope: a concurrent allocator blocks until the
//! preceding transaction commits or rolls back. The upsert also covers the
//! first allocation of a brand-new scope, so there is no unlockable
//! "no prior row" window.
//!
//! ## Error mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx error | Postgres code | StoreError | Scenario |
//! |------------|---------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | duplicate reference number, retried internally |
//! | Database (other) | any other | `Database` | constraint/connection failures |
//! | non-database errors | n/a | `Database` | pool closed, I/O, decode |

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value as Json;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{instrument, warn};
use uuid::Uuid;

use sokoni_core::{
    Country, EngineError, OrderId, ProductId, StockShortage, TransactionId, UserId,
};
use sokoni_inventory::{check_availability, StockLevel, StockRequest};
use sokoni_ledger::{
    FinancialSummary, TransactionDraft, TransactionKind, TransactionRecord,
};
use sokoni_orders::{number, DeliveryUpdate, Order, OrderDraft, PaymentDetails};

use super::error::StoreError;
use super::query::{OrderFilter, Page, Pagination, SummaryFilter, TransactionFilter};
use super::r#trait::{DeliveryChange, EngineStore, PaymentRecorded};

/// Bounded retry for reference-number unique-constraint collisions. With the
/// counter table these should not occur; the loop is the backstop that keeps
/// `AllocationConflict` internal.
const ALLOCATION_RETRIES: u32 = 3;

const ORDER_COLUMNS: &str = "id, order_number, country, user_id, recipient_name, \
    recipient_email, recipient_phone, address_line, city, district, postal_code, \
    items, subtotal, tax_amount, total_amount, delivery_status, payment_status, \
    payment_method, paid_at, payment_reference, payment_notes, tracking_number, \
    carrier, estimated_delivery_date, actual_delivery_date, delivery_notes, \
    status_history, email_message_id, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, transaction_number, kind, order_id, country, \
    currency, amount, subtotal, vat_amount, description, transaction_date, \
    recorded_by, details, created_at";

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct PostgresStoreConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl PostgresStoreConfig {
    /// Read `DATABASE_URL` (required) and `DATABASE_MAX_CONNECTIONS`
    /// (default 5).
    pub fn from_env() -> Result<Self, StoreError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| StoreError::database("config", "DATABASE_URL is not set"))?;
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        Ok(Self {
            database_url,
            max_connections,
        })
    }
}

/// Postgres-backed [`EngineStore`].
///
/// Cloning shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct PostgresEngineStore {
    pool: PgPool,
}

impl PostgresEngineStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and ensure the schema exists.
    pub async fn connect(config: PostgresStoreConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Create tables and indexes. Idempotent.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS products (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                unit_price NUMERIC NOT NULL,
                tax_pct NUMERIC NOT NULL,
                stock BIGINT NOT NULL CHECK (stock >= 0),
                in_stock BOOLEAN NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id UUID PRIMARY KEY,
                order_number TEXT NOT NULL UNIQUE,
                country TEXT NOT NULL,
                user_id UUID,
                recipient_name TEXT NOT NULL,
                recipient_email TEXT,
                recipient_phone TEXT,
                address_line TEXT NOT NULL,
                city TEXT NOT NULL,
                district TEXT,
                postal_code TEXT,
                items JSONB NOT NULL,
                subtotal NUMERIC NOT NULL,
                tax_amount NUMERIC NOT NULL,
                total_amount NUMERIC NOT NULL,
                delivery_status TEXT NOT NULL,
                payment_status TEXT NOT NULL,
                payment_method TEXT,
                paid_at TIMESTAMPTZ,
                payment_reference TEXT,
                payment_notes TEXT,
                tracking_number TEXT,
                carrier TEXT,
                estimated_delivery_date DATE,
                actual_delivery_date TIMESTAMPTZ,
                delivery_notes TEXT,
                status_history JSONB NOT NULL,
                email_message_id TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_orders_delivery_status ON orders(delivery_status)",
            "CREATE INDEX IF NOT EXISTS idx_orders_created_at ON orders(created_at)",
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id UUID PRIMARY KEY,
                transaction_number TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                order_id UUID,
                country TEXT NOT NULL,
                currency TEXT NOT NULL,
                amount NUMERIC NOT NULL,
                subtotal NUMERIC,
                vat_amount NUMERIC,
                description TEXT NOT NULL,
                transaction_date TIMESTAMPTZ NOT NULL,
                recorded_by UUID NOT NULL,
                details JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_transactions_kind ON transactions(kind)",
            "CREATE INDEX IF NOT EXISTS idx_transactions_country ON transactions(country)",
            "CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(transaction_date)",
            r#"
            CREATE TABLE IF NOT EXISTS sequence_counters (
                scope TEXT PRIMARY KEY,
                next_value BIGINT NOT NULL
            )
            "#,
        ];
        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl EngineStore for PostgresEngineStore {
    #[instrument(skip(self, product), fields(product_id = %product.product_id), err)]
    async fn put_product(&self, product: StockLevel) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, unit_price, tax_pct, stock, in_stock, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                unit_price = EXCLUDED.unit_price,
                tax_pct = EXCLUDED.tax_pct,
                stock = EXCLUDED.stock,
                in_stock = EXCLUDED.in_stock,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(product.product_id.as_uuid())
        .bind(&product.name)
        .bind(product.unit_price)
        .bind(product.tax_pct)
        .bind(product.stock)
        .bind(product.in_stock)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("put_product", e))?;
        Ok(())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn stock_levels(&self, ids: &[ProductId]) -> Result<Vec<StockLevel>, StoreError> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query(
            "SELECT id, name, unit_price, tax_pct, stock, in_stock, updated_at \
             FROM products WHERE id = ANY($1)",
        )
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("stock_levels", e))?;

        rows.iter()
            .map(|row| ProductRow::from_row(row).map(ProductRow::into_level))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::serialization(format!("product row: {e}")))
    }

    #[instrument(
        skip(self, draft),
        fields(scope = tracing::field::Empty, order_number = tracing::field::Empty),
        err
    )]
    async fn create_order(&self, draft: OrderDraft) -> Result<Order, StoreError> {
        let scope = draft.number_scope();
        tracing::Span::current().record("scope", scope.as_str());
        let requests = draft.stock_requests();

        for attempt in 0..ALLOCATION_RETRIES {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| map_sqlx_error("begin", e))?;

            let sequence = allocate_sequence(&mut tx, &scope).await?;
            let order_number = number::format_number(&scope, sequence);
            reserve_stock(&mut tx, &requests).await?;

            let order = draft.clone().into_order(order_number.clone());
            match insert_order_row(&mut tx, &order).await {
                Ok(()) => {
                    tx.commit()
                        .await
                        .map_err(|e| map_sqlx_error("commit", e))?;
                    tracing::Span::current().record("order_number", order_number.as_str());
                    return Ok(order);
                }
                Err(StoreError::Conflict(message)) => {
                    warn!(%order_number, attempt, %message, "order number collision, retrying");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
        Err(StoreError::Conflict(format!(
            "order number allocation kept colliding for scope {scope}"
        )))
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("order", e))?;
        row.map(|r| order_from_row(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn order_by_number(&self, order_number: &str) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"
        ))
        .bind(order_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("order_by_number", e))?;
        row.map(|r| order_from_row(&r)).transpose()
    }

    #[instrument(skip(self, filter), err)]
    async fn orders(
        &self,
        filter: &OrderFilter,
        pagination: Pagination,
    ) -> Result<Page<Order>, StoreError> {
        let status = filter.delivery_status.map(|s| s.as_str().to_string());

        let count_row = sqlx::query(
            "SELECT COUNT(*) AS total FROM orders \
             WHERE ($1::text IS NULL OR delivery_status = $1)",
        )
        .bind(&status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_orders", e))?;
        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| StoreError::serialization(format!("count row: {e}")))?;

        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE ($1::text IS NULL OR delivery_status = $1) \
             ORDER BY created_at DESC, order_number DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(&status)
        .bind(pagination.limit as i64)
        .bind(pagination.offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;

        let items = rows
            .iter()
            .map(order_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total as u64, pagination))
    }

    #[instrument(skip(self, update), fields(order_id = %id, new_status = %update.new_status), err)]
    async fn apply_delivery_update(
        &self,
        id: OrderId,
        update: DeliveryUpdate,
    ) -> Result<DeliveryChange, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let mut order = fetch_order_for_update(&mut tx, id)
            .await?
            .ok_or(StoreError::Domain(EngineError::NotFound))?;
        let previous = order.apply_delivery_update(&update, Utc::now())?;
        update_order_row(&mut tx, &order).await?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(DeliveryChange { previous, order })
    }

    #[instrument(skip(self, notes), fields(order_id = %id), err)]
    async fn append_delivery_notes(&self, id: OrderId, notes: &str) -> Result<Order, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let mut order = fetch_order_for_update(&mut tx, id)
            .await?
            .ok_or(StoreError::Domain(EngineError::NotFound))?;
        order.append_delivery_notes(notes, Utc::now());
        update_order_row(&mut tx, &order).await?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(order)
    }

    #[instrument(skip(self, payment), fields(order_id = %id), err)]
    async fn record_payment(
        &self,
        id: OrderId,
        payment: PaymentDetails,
        recorded_by: UserId,
    ) -> Result<PaymentRecorded, StoreError> {
        for attempt in 0..ALLOCATION_RETRIES {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| map_sqlx_error("begin", e))?;
            let now = Utc::now();

            let mut order = fetch_order_for_update(&mut tx, id)
                .await?
                .ok_or(StoreError::Domain(EngineError::NotFound))?;
            order.mark_paid(&payment, now)?;

            let draft = TransactionDraft::sale_from_order(&order, recorded_by, now);
            let scope = draft.number_scope();
            let sequence = allocate_sequence(&mut tx, &scope).await?;
            let entry = draft.into_record(number::format_number(&scope, sequence));

            update_order_row(&mut tx, &order).await?;
            match insert_transaction_row(&mut tx, &entry).await {
                Ok(()) => {
                    tx.commit()
                        .await
                        .map_err(|e| map_sqlx_error("commit", e))?;
                    return Ok(PaymentRecorded { order, entry });
                }
                Err(StoreError::Conflict(message)) => {
                    warn!(attempt, %message, "transaction number collision, retrying");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
        Err(StoreError::Conflict(
            "transaction number allocation kept colliding".to_string(),
        ))
    }

    #[instrument(skip(self, message_id), fields(order_id = %id), err)]
    async fn set_email_message_id(
        &self,
        id: OrderId,
        message_id: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET email_message_id = $2, updated_at = NOW() \
             WHERE id = $1 AND email_message_id IS NULL",
        )
        .bind(id.as_uuid())
        .bind(message_id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_email_message_id", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, draft), fields(kind = %draft.kind), err)]
    async fn insert_transaction(
        &self,
        draft: TransactionDraft,
    ) -> Result<TransactionRecord, StoreError> {
        let scope = draft.number_scope();
        for attempt in 0..ALLOCATION_RETRIES {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| map_sqlx_error("begin", e))?;

            let sequence = allocate_sequence(&mut tx, &scope).await?;
            let entry = draft
                .clone()
                .into_record(number::format_number(&scope, sequence));
            match insert_transaction_row(&mut tx, &entry).await {
                Ok(()) => {
                    tx.commit()
                        .await
                        .map_err(|e| map_sqlx_error("commit", e))?;
                    return Ok(entry);
                }
                Err(StoreError::Conflict(message)) => {
                    warn!(attempt, %message, "transaction number collision, retrying");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
        Err(StoreError::Conflict(format!(
            "transaction number allocation kept colliding for scope {scope}"
        )))
    }

    #[instrument(skip(self), fields(transaction_id = %id), err)]
    async fn transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("transaction", e))?;
        row.map(|r| transaction_from_row(&r)).transpose()
    }

    #[instrument(skip(self, filter), err)]
    async fn transactions(
        &self,
        filter: &TransactionFilter,
        pagination: Pagination,
    ) -> Result<Page<TransactionRecord>, StoreError> {
        let kind = filter.kind.map(|k| k.as_str().to_string());
        let country = filter.country.as_ref().map(|c| c.as_str().to_string());

        let count_row = sqlx::query(
            "SELECT COUNT(*) AS total FROM transactions \
             WHERE ($1::text IS NULL OR kind = $1) \
               AND ($2::text IS NULL OR country = $2) \
               AND ($3::timestamptz IS NULL OR transaction_date >= $3) \
               AND ($4::timestamptz IS NULL OR transaction_date <= $4)",
        )
        .bind(&kind)
        .bind(&country)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_transactions", e))?;
        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| StoreError::serialization(format!("count row: {e}")))?;

        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE ($1::text IS NULL OR kind = $1) \
               AND ($2::text IS NULL OR country = $2) \
               AND ($3::timestamptz IS NULL OR transaction_date >= $3) \
               AND ($4::timestamptz IS NULL OR transaction_date <= $4) \
             ORDER BY transaction_date DESC, transaction_number DESC \
             LIMIT $5 OFFSET $6"
        ))
        .bind(&kind)
        .bind(&country)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(pagination.limit as i64)
        .bind(pagination.offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_transactions", e))?;

        let items = rows
            .iter()
            .map(transaction_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total as u64, pagination))
    }

    #[instrument(skip(self), fields(transaction_id = %id), err)]
    async fn delete_transaction(&self, id: TransactionId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM transactions WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_transaction", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, filter), err)]
    async fn financial_summary(
        &self,
        filter: &SummaryFilter,
    ) -> Result<FinancialSummary, StoreError> {
        let country = filter.country.as_ref().map(|c| c.as_str().to_string());
        let rows = sqlx::query(
            "SELECT kind, COUNT(*) AS count, COALESCE(SUM(amount), 0) AS total \
             FROM transactions \
             WHERE ($1::text IS NULL OR country = $1) \
               AND ($2::timestamptz IS NULL OR transaction_date >= $2) \
               AND ($3::timestamptz IS NULL OR transaction_date <= $3) \
             GROUP BY kind",
        )
        .bind(&country)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("financial_summary", e))?;

        let mut total_sales = Decimal::ZERO;
        let mut total_expenses = Decimal::ZERO;
        let mut sales_count = 0u64;
        let mut expenses_count = 0u64;
        for row in rows {
            let kind: String = row
                .try_get("kind")
                .map_err(|e| StoreError::serialization(format!("summary row: {e}")))?;
            let count: i64 = row
                .try_get("count")
                .map_err(|e| StoreError::serialization(format!("summary row: {e}")))?;
            let total: Decimal = row
                .try_get("total")
                .map_err(|e| StoreError::serialization(format!("summary row: {e}")))?;
            match kind.parse::<TransactionKind>() {
                Ok(TransactionKind::Sale) => {
                    total_sales = total;
                    sales_count = count as u64;
                }
                Ok(TransactionKind::Expense) => {
                    total_expenses = total;
                    expenses_count = count as u64;
                }
                Err(_) => {
                    return Err(StoreError::serialization(format!(
                        "unknown transaction kind in summary: {kind}"
                    )))
                }
            }
        }
        Ok(FinancialSummary::from_parts(
            total_sales,
            total_expenses,
            sales_count,
            expenses_count,
        ))
    }
}

/// Bump and return the counter for a scope, inside the caller's transaction.
#[instrument(skip(tx), err)]
async fn allocate_sequence(
    tx: &mut Transaction<'_, Postgres>,
    scope: &str,
) -> Result<i64, StoreError> {
    let row = sqlx::query(
        "INSERT INTO sequence_counters (scope, next_value) VALUES ($1, 1) \
         ON CONFLICT (scope) DO UPDATE SET next_value = sequence_counters.next_value + 1 \
         RETURNING next_value",
    )
    .bind(scope)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("allocate_sequence", e))?;
    row.try_get("next_value")
        .map_err(|e| StoreError::serialization(format!("counter row: {e}")))
}

/// Validate and conditionally decrement stock for every requested line.
///
/// Rows are locked in id order so concurrent reservations cannot deadlock.
/// The conditional decrement is the authoritative check; the locked re-read
/// exists to produce the complete aggregate diagnostic.
async fn reserve_stock(
    tx: &mut Transaction<'_, Postgres>,
    requests: &[StockRequest],
) -> Result<(), StoreError> {
    let uuids: Vec<Uuid> = requests.iter().map(|r| *r.product_id.as_uuid()).collect();
    let rows = sqlx::query(
        "SELECT id, name, unit_price, tax_pct, stock, in_stock, updated_at \
         FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE",
    )
    .bind(&uuids)
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_products", e))?;

    let levels = rows
        .iter()
        .map(|row| ProductRow::from_row(row).map(ProductRow::into_level))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::serialization(format!("product row: {e}")))?;
    check_availability(&levels, requests)?;

    for request in requests {
        let result = sqlx::query(
            "UPDATE products SET stock = stock - $2, in_stock = (stock - $2) > 0, \
             updated_at = NOW() WHERE id = $1 AND stock >= $2",
        )
        .bind(request.product_id.as_uuid())
        .bind(request.quantity)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("decrement_stock", e))?;

        if result.rows_affected() == 0 {
            let available = levels
                .iter()
                .find(|l| l.product_id == request.product_id)
                .map(|l| l.stock)
                .unwrap_or(0);
            return Err(StoreError::Domain(EngineError::InsufficientStock(vec![
                StockShortage {
                    product_id: request.product_id,
                    requested: request.quantity,
                    available,
                },
            ])));
        }
    }
    Ok(())
}

async fn fetch_order_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: OrderId,
) -> Result<Option<Order>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("fetch_order_for_update", e))?;
    row.map(|r| order_from_row(&r)).transpose()
}

async fn insert_order_row(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
) -> Result<(), StoreError> {
    let items = serde_json::to_value(&order.items)
        .map_err(|e| StoreError::serialization(format!("order items: {e}")))?;
    let status_history = serde_json::to_value(&order.status_history)
        .map_err(|e| StoreError::serialization(format!("status history: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO orders (
            id, order_number, country, user_id, recipient_name, recipient_email,
            recipient_phone, address_line, city, district, postal_code, items,
            subtotal, tax_amount, total_amount, delivery_status, payment_status,
            payment_method, paid_at, payment_reference, payment_notes,
            tracking_number, carrier, estimated_delivery_date, actual_delivery_date,
            delivery_notes, status_history, email_message_id, created_at, updated_at
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
            $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30
        )
        "#,
    )
    .bind(order.id.as_uuid())
    .bind(&order.order_number)
    .bind(order.country.as_str())
    .bind(order.user_id.map(|u| *u.as_uuid()))
    .bind(&order.shipping.recipient_name)
    .bind(&order.shipping.recipient_email)
    .bind(&order.shipping.recipient_phone)
    .bind(&order.shipping.address_line)
    .bind(&order.shipping.city)
    .bind(&order.shipping.district)
    .bind(&order.shipping.postal_code)
    .bind(items)
    .bind(order.subtotal)
    .bind(order.tax_amount)
    .bind(order.total_amount)
    .bind(order.delivery_status.as_str())
    .bind(order.payment_status.as_str())
    .bind(&order.payment_method)
    .bind(order.paid_at)
    .bind(&order.payment_reference)
    .bind(&order.payment_notes)
    .bind(&order.tracking_number)
    .bind(&order.carrier)
    .bind(order.estimated_delivery_date)
    .bind(order.actual_delivery_date)
    .bind(&order.delivery_notes)
    .bind(status_history)
    .bind(&order.email_message_id)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_order", e))?;
    Ok(())
}

/// Write back every mutable order column. The immutable creation-time
/// columns (number, country, recipient, items, totals) are never updated.
async fn update_order_row(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
) -> Result<(), StoreError> {
    let status_history = serde_json::to_value(&order.status_history)
        .map_err(|e| StoreError::serialization(format!("status history: {e}")))?;

    sqlx::query(
        r#"
        UPDATE orders SET
            delivery_status = $2,
            payment_status = $3,
            payment_method = $4,
            paid_at = $5,
            payment_reference = $6,
            payment_notes = $7,
            tracking_number = $8,
            carrier = $9,
            estimated_delivery_date = $10,
            actual_delivery_date = $11,
            delivery_notes = $12,
            status_history = $13,
            updated_at = $14
        WHERE id = $1
        "#,
    )
    .bind(order.id.as_uuid())
    .bind(order.delivery_status.as_str())
    .bind(order.payment_status.as_str())
    .bind(&order.payment_method)
    .bind(order.paid_at)
    .bind(&order.payment_reference)
    .bind(&order.payment_notes)
    .bind(&order.tracking_number)
    .bind(&order.carrier)
    .bind(order.estimated_delivery_date)
    .bind(order.actual_delivery_date)
    .bind(&order.delivery_notes)
    .bind(status_history)
    .bind(order.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_order", e))?;
    Ok(())
}

async fn insert_transaction_row(
    tx: &mut Transaction<'_, Postgres>,
    entry: &TransactionRecord,
) -> Result<(), StoreError> {
    let details = serde_json::to_value(&entry.details)
        .map_err(|e| StoreError::serialization(format!("transaction details: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO transactions (
            id, transaction_number, kind, order_id, country, currency, amount,
            subtotal, vat_amount, description, transaction_date, recorded_by,
            details, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(&entry.transaction_number)
    .bind(entry.kind.as_str())
    .bind(entry.order_id.map(|o| *o.as_uuid()))
    .bind(entry.country.as_str())
    .bind(&entry.currency)
    .bind(entry.amount)
    .bind(entry.subtotal)
    .bind(entry.vat_amount)
    .bind(&entry.description)
    .bind(entry.transaction_date)
    .bind(entry.recorded_by.as_uuid())
    .bind(details)
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_transaction", e))?;
    Ok(())
}

/// Map SQLx errors to StoreError, folding Postgres unique violations (23505)
/// into `Conflict` so callers can retry allocation.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            if db_err.code().as_deref() == Some("23505") {
                StoreError::Conflict(format!("{operation}: {message}"))
            } else {
                StoreError::database(operation, message)
            }
        }
        other => StoreError::database(operation, other.to_string()),
    }
}

// SQLx row types

#[derive(Debug)]
struct ProductRow {
    id: Uuid,
    name: String,
    unit_price: Decimal,
    tax_pct: Decimal,
    stock: i64,
    in_stock: bool,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            unit_price: row.try_get("unit_price")?,
            tax_pct: row.try_get("tax_pct")?,
            stock: row.try_get("stock")?,
            in_stock: row.try_get("in_stock")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl ProductRow {
    fn into_level(self) -> StockLevel {
        StockLevel {
            product_id: ProductId::from_uuid(self.id),
            name: self.name,
            unit_price: self.unit_price,
            tax_pct: self.tax_pct,
            stock: self.stock,
            in_stock: self.in_stock,
            updated_at: self.updated_at,
        }
    }
}

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    let serialization = |field: &str, e: String| {
        StoreError::serialization(format!("order row, {field}: {e}"))
    };

    let country: String = row
        .try_get("country")
        .map_err(|e| serialization("country", e.to_string()))?;
    let delivery_status: String = row
        .try_get("delivery_status")
        .map_err(|e| serialization("delivery_status", e.to_string()))?;
    let payment_status: String = row
        .try_get("payment_status")
        .map_err(|e| serialization("payment_status", e.to_string()))?;
    let items: Json = row
        .try_get("items")
        .map_err(|e| serialization("items", e.to_string()))?;
    let status_history: Json = row
        .try_get("status_history")
        .map_err(|e| serialization("status_history", e.to_string()))?;
    let id: Uuid = row
        .try_get("id")
        .map_err(|e| serialization("id", e.to_string()))?;
    let user_id: Option<Uuid> = row
        .try_get("user_id")
        .map_err(|e| serialization("user_id", e.to_string()))?;

    let get_text = |field: &'static str| -> Result<String, StoreError> {
        row.try_get(field)
            .map_err(|e| serialization(field, e.to_string()))
    };
    let get_opt_text = |field: &'static str| -> Result<Option<String>, StoreError> {
        row.try_get(field)
            .map_err(|e| serialization(field, e.to_string()))
    };

    Ok(Order {
        id: OrderId::from_uuid(id),
        order_number: get_text("order_number")?,
        country: Country::new(&country)
            .map_err(|e| serialization("country", e.to_string()))?,
        user_id: user_id.map(UserId::from_uuid),
        shipping: sokoni_orders::ShippingDetails {
            recipient_name: get_text("recipient_name")?,
            recipient_email: get_opt_text("recipient_email")?,
            recipient_phone: get_opt_text("recipient_phone")?,
            address_line: get_text("address_line")?,
            city: get_text("city")?,
            district: get_opt_text("district")?,
            postal_code: get_opt_text("postal_code")?,
        },
        items: serde_json::from_value(items)
            .map_err(|e| serialization("items", e.to_string()))?,
        subtotal: row
            .try_get("subtotal")
            .map_err(|e| serialization("subtotal", e.to_string()))?,
        tax_amount: row
            .try_get("tax_amount")
            .map_err(|e| serialization("tax_amount", e.to_string()))?,
        total_amount: row
            .try_get("total_amount")
            .map_err(|e| serialization("total_amount", e.to_string()))?,
        delivery_status: delivery_status
            .parse()
            .map_err(|e: EngineError| serialization("delivery_status", e.to_string()))?,
        payment_status: payment_status
            .parse()
            .map_err(|e: EngineError| serialization("payment_status", e.to_string()))?,
        payment_method: get_opt_text("payment_method")?,
        paid_at: row
            .try_get("paid_at")
            .map_err(|e| serialization("paid_at", e.to_string()))?,
        payment_reference: get_opt_text("payment_reference")?,
        payment_notes: get_opt_text("payment_notes")?,
        tracking_number: get_opt_text("tracking_number")?,
        carrier: get_opt_text("carrier")?,
        estimated_delivery_date: row
            .try_get::<Option<NaiveDate>, _>("estimated_delivery_date")
            .map_err(|e| serialization("estimated_delivery_date", e.to_string()))?,
        actual_delivery_date: row
            .try_get("actual_delivery_date")
            .map_err(|e| serialization("actual_delivery_date", e.to_string()))?,
        delivery_notes: get_opt_text("delivery_notes")?,
        status_history: serde_json::from_value(status_history)
            .map_err(|e| serialization("status_history", e.to_string()))?,
        email_message_id: get_opt_text("email_message_id")?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| serialization("created_at", e.to_string()))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| serialization("updated_at", e.to_string()))?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<TransactionRecord, StoreError> {
    let serialization = |field: &str, e: String| {
        StoreError::serialization(format!("transaction row, {field}: {e}"))
    };

    let id: Uuid = row
        .try_get("id")
        .map_err(|e| serialization("id", e.to_string()))?;
    let kind: String = row
        .try_get("kind")
        .map_err(|e| serialization("kind", e.to_string()))?;
    let order_id: Option<Uuid> = row
        .try_get("order_id")
        .map_err(|e| serialization("order_id", e.to_string()))?;
    let country: String = row
        .try_get("country")
        .map_err(|e| serialization("country", e.to_string()))?;
    let recorded_by: Uuid = row
        .try_get("recorded_by")
        .map_err(|e| serialization("recorded_by", e.to_string()))?;
    let details: Json = row
        .try_get("details")
        .map_err(|e| serialization("details", e.to_string()))?;

    Ok(TransactionRecord {
        id: TransactionId::from_uuid(id),
        transaction_number: row
            .try_get("transaction_number")
            .map_err(|e| serialization("transaction_number", e.to_string()))?,
        kind: kind
            .parse()
            .map_err(|e: EngineError| serialization("kind", e.to_string()))?,
        order_id: order_id.map(OrderId::from_uuid),
        country: Country::new(&country)
            .map_err(|e| serialization("country", e.to_string()))?,
        currency: row
            .try_get("currency")
            .map_err(|e| serialization("currency", e.to_string()))?,
        amount: row
            .try_get("amount")
            .map_err(|e| serialization("amount", e.to_string()))?,
        subtotal: row
            .try_get("subtotal")
            .map_err(|e| serialization("subtotal", e.to_string()))?,
        vat_amount: row
            .try_get("vat_amount")
            .map_err(|e| serialization("vat_amount", e.to_string()))?,
        description: row
            .try_get("description")
            .map_err(|e| serialization("description", e.to_string()))?,
        transaction_date: row
            .try_get("transaction_date")
            .map_err(|e| serialization("transaction_date", e.to_string()))?,
        recorded_by: UserId::from_uuid(recorded_by),
        details: serde_json::from_value(details)
            .map_err(|e| serialization("details", e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| serialization("created_at", e.to_string()))?,
    })
}
