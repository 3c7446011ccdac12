//! Postgres-backed order rows, line-number counters and line numbering.
//!
//! Orders live in `purchase_order(id uuid primary key, jsonb jsonb not null)`.
//! Each counter is a dedicated `SEQUENCE` named by
//! [`CounterSettings::name_for`], created in the connection's current schema.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `AlreadyExists` | Order id already taken |
//! | Database (duplicate table) | `42P07` | `AlreadyExists` | Counter already exists |
//! | Database (undefined table) | `42P01` | `NotFound` | `nextval` on a dropped counter |
//! | Database (sequence limit) | `2200H` | `Conflict` | Counter reached its maximum |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolClosed / Other | N/A | `Backend` | Network errors, closed pool, etc. |

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument, warn};

use orders_storage_core::OrderId;
use orders_storage_purchasing::PurchaseOrder;

use super::counter::{CounterSettings, SequenceCounter};
use super::error::StoreError;
use super::line_numbering::LineNumberingQuery;
use super::repository::{require_id, OrderRepository};
use super::transaction::TransactionalStore;

/// Postgres-backed order repository and counter store.
///
/// ## Thread Safety
///
/// Uses the SQLx connection pool which is thread-safe (Arc + Send + Sync).
/// A transaction handle is owned by exactly one unit of work.
#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: Arc<PgPool>,
    settings: CounterSettings,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool, settings: CounterSettings) -> Self {
        Self {
            pool: Arc::new(pool),
            settings,
        }
    }

    /// Create the `purchase_order` table if it does not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS purchase_order (
                id uuid PRIMARY KEY,
                jsonb jsonb NOT NULL
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    fn create_sql(&self, order_id: OrderId, start: i64, if_not_exists: bool) -> String {
        // DDL cannot take bind parameters; the name is hex derived from a UUID
        // and both bounds are validated integers.
        format!(
            "CREATE SEQUENCE {}\"{}\" AS bigint START WITH {start} MINVALUE 1 MAXVALUE {} NO CYCLE",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            self.settings.name_for(order_id),
            self.settings.max_value(),
        )
    }
}

#[async_trait]
impl TransactionalStore for PostgresOrderStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderStore {
    #[instrument(skip(self, tx, order), fields(order_id = ?order.id), err)]
    async fn insert(&self, tx: &mut Self::Tx, order: &PurchaseOrder) -> Result<(), StoreError> {
        let id = require_id(order)?;
        let document = order
            .to_document()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        sqlx::query("INSERT INTO purchase_order (id, jsonb) VALUES ($1, $2)")
            .bind(id.as_uuid())
            .bind(&document)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order", e))?;

        Ok(())
    }

    #[instrument(skip(self, tx, order), fields(order_id = %id), err)]
    async fn update(
        &self,
        tx: &mut Self::Tx,
        id: OrderId,
        order: &PurchaseOrder,
    ) -> Result<(), StoreError> {
        let document = order
            .to_document()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let result = sqlx::query("UPDATE purchase_order SET jsonb = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(&document)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("update_order", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("purchase order {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self, tx), fields(order_id = %id), err)]
    async fn delete(&self, tx: &mut Self::Tx, id: OrderId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM purchase_order WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("delete_order", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("purchase order {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl SequenceCounter for PostgresOrderStore {
    #[instrument(skip(self, tx), fields(order_id = %order_id), err)]
    async fn create(
        &self,
        tx: &mut Self::Tx,
        order_id: OrderId,
        start: i64,
    ) -> Result<(), StoreError> {
        self.settings.check_start(order_id, start)?;

        sqlx::query(&self.create_sql(order_id, start, false))
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("create_counter", e))?;

        debug!(start, "line-number counter created");
        Ok(())
    }

    #[instrument(skip(self, tx), fields(order_id = %order_id), err)]
    async fn create_if_absent(
        &self,
        tx: &mut Self::Tx,
        order_id: OrderId,
        start: i64,
    ) -> Result<bool, StoreError> {
        self.settings.check_start(order_id, start)?;
        let name = self.settings.name_for(order_id);

        // Serialize concurrent creators of the same counter until commit, so
        // the absence check below and the create act as one step.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&name)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("lock_counter", e))?;

        let row = sqlx::query("SELECT to_regclass($1) IS NULL AS absent")
            .bind(format!("\"{name}\""))
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("probe_counter", e))?;
        let absent: bool = row
            .try_get("absent")
            .map_err(|e| StoreError::Backend(format!("failed to read absent: {e}")))?;

        if !absent {
            return Ok(false);
        }

        sqlx::query(&self.create_sql(order_id, start, true))
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("create_counter", e))?;

        debug!(start, "line-number counter recreated");
        Ok(true)
    }

    async fn exists(&self, order_id: OrderId) -> bool {
        let outcome = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM pg_sequences
            WHERE schemaname = current_schema() AND sequencename = $1
            "#,
        )
        .bind(self.settings.name_for(order_id))
        .fetch_one(&*self.pool)
        .await;

        match outcome.and_then(|row| row.try_get::<i64, _>("count")) {
            Ok(count) if count > 0 => true,
            Ok(_) => {
                debug!(order_id = %order_id, "line-number counter does not exist");
                false
            }
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "counter existence check failed; treating as absent");
                false
            }
        }
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn current_count(&self, order_id: OrderId) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT last_value
            FROM pg_sequences
            WHERE schemaname = current_schema() AND sequencename = $1
            "#,
        )
        .bind(self.settings.name_for(order_id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("current_count", e))?;

        let Some(row) = row else {
            return Ok(0);
        };
        // `last_value` is NULL until the first nextval.
        let last: Option<i64> = row
            .try_get("last_value")
            .map_err(|e| StoreError::Backend(format!("failed to read last_value: {e}")))?;
        Ok(last.unwrap_or(0))
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn next_value(&self, order_id: OrderId) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT nextval($1::regclass) AS value")
            .bind(format!("\"{}\"", self.settings.name_for(order_id)))
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("next_value", e))?;

        row.try_get("value")
            .map_err(|e| StoreError::Backend(format!("failed to read value: {e}")))
    }

    #[instrument(skip(self, tx), fields(order_id = %order_id), err)]
    async fn drop_counter(&self, tx: &mut Self::Tx, order_id: OrderId) -> Result<(), StoreError> {
        let sql = format!(
            "DROP SEQUENCE IF EXISTS \"{}\"",
            self.settings.name_for(order_id)
        );
        sqlx::query(&sql)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("drop_counter", e))?;

        debug!("line-number counter dropped");
        Ok(())
    }
}

/// Line numbering read from the `po_line` table.
///
/// Line numbers are stored as `<poNumber>-<sequence>` in `poLineNumber`.
#[derive(Debug, Clone)]
pub struct PostgresLineNumbering {
    pool: Arc<PgPool>,
}

impl PostgresLineNumbering {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl LineNumberingQuery for PostgresLineNumbering {
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn last_assigned_sequence(&self, order_id: OrderId) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(MAX(NULLIF(split_part(jsonb->>'poLineNumber', '-', 2), '')::bigint), 0) AS last
            FROM po_line
            WHERE jsonb->>'purchaseOrderId' = $1
            "#,
        )
        .bind(order_id.to_string())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("last_assigned_sequence", e))?;

        row.try_get("last")
            .map_err(|e| StoreError::Backend(format!("failed to read last: {e}")))
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                // unique_violation, duplicate_table
                Some("23505") | Some("42P07") => StoreError::AlreadyExists(msg),
                // undefined_table
                Some("42P01") => StoreError::NotFound(msg),
                // sequence_generator_limit_exceeded
                Some("2200H") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
