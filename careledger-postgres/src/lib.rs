//! PostgreSQL store adapter for the `careledger` core.
//!
//! Maps the storage port onto a relational schema:
//!
//! - the (activity, elderly) pair of active participations carries a real
//!   `UNIQUE` constraint, so duplicate registration is decided by the
//!   database inside the inserting transaction rather than by a prior
//!   existence read;
//! - units of work run at `SERIALIZABLE` isolation, so the availability
//!   check a service performs and the insert that follows cannot interleave
//!   with another writer's; a serialization failure surfaces as
//!   [`StoreError::SerializationConflict`] and retrying is the caller's
//!   decision;
//! - conditional updates (`... WHERE status = 'reserved'`) report
//!   `rows_affected`, preserving the "nothing to do" outcome.
//!
//! Master data tables are owned by the directory collaborators in
//! production; `initialize_schema` creates them too so the adapter is
//! self-contained for development and integration tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

use async_trait::async_trait;
use careledger::errors::{StoreError, StoreResult};
use careledger::participation::{
    Activity, NewParticipation, Participation, ParticipationStatus, ParticipationWithActivity,
};
use careledger::procurement::{NewProcurement, ProcurementOrder, ProcurementStatus};
use careledger::stock::{
    DispenseRecord, DispenseStatus, Medicine, NewDispense, StockAggregate, StockBatch,
};
use careledger::store::{CareStore, CareTx};
use careledger::types::{
    ActivityId, BatchId, DispenseId, ElderlyId, MedicalOrderId, MedicineId, ParticipationId,
    Quantity, StaffId,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::{info, instrument};

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: u32,
    /// Timeout for acquiring a connection from the pool (default: 30 seconds)
    pub acquire_timeout: Duration,
    /// Idle timeout for connections in the pool (default: 10 minutes)
    pub idle_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// PostgreSQL-backed care store.
#[derive(Debug, Clone)]
pub struct PgCareStore {
    pool: Pool<Postgres>,
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS care_activities (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        location TEXT NOT NULL,
        capacity INTEGER NOT NULL,
        scheduled_at TIMESTAMPTZ NOT NULL,
        staff_id BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS care_medicines (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        specification TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS care_stock_batches (
        id BIGSERIAL PRIMARY KEY,
        medicine_id BIGINT NOT NULL REFERENCES care_medicines(id),
        quantity BIGINT NOT NULL,
        received_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS care_participations (
        id BIGSERIAL PRIMARY KEY,
        activity_id BIGINT NOT NULL REFERENCES care_activities(id),
        elderly_id BIGINT NOT NULL,
        status TEXT NOT NULL,
        registered_at TIMESTAMPTZ NOT NULL,
        checked_in_at TIMESTAMPTZ,
        feedback TEXT,
        CONSTRAINT care_participations_pair_key UNIQUE (activity_id, elderly_id)
    )",
    "CREATE TABLE IF NOT EXISTS care_dispense_records (
        id BIGSERIAL PRIMARY KEY,
        medicine_id BIGINT NOT NULL REFERENCES care_medicines(id),
        batch_id BIGINT NOT NULL REFERENCES care_stock_batches(id),
        order_id BIGINT,
        staff_id BIGINT,
        quantity BIGINT NOT NULL,
        status TEXT NOT NULL,
        reserved_at TIMESTAMPTZ NOT NULL,
        closed_at TIMESTAMPTZ
    )",
    "CREATE TABLE IF NOT EXISTS care_reorder_thresholds (
        medicine_id BIGINT PRIMARY KEY REFERENCES care_medicines(id),
        min_available BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS care_procurement_orders (
        id BIGSERIAL PRIMARY KEY,
        medicine_id BIGINT NOT NULL REFERENCES care_medicines(id),
        quantity BIGINT NOT NULL,
        staff_id BIGINT NOT NULL,
        requested_at TIMESTAMPTZ NOT NULL,
        status TEXT NOT NULL
    )",
];

impl PgCareStore {
    /// Connects with the default pool configuration.
    pub async fn new(connection_string: &str) -> StoreResult<Self> {
        Self::with_config(connection_string, PostgresConfig::default()).await
    }

    /// Connects with a custom pool configuration.
    pub async fn with_config(
        connection_string: &str,
        config: PostgresConfig,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(connection_string)
            .await
            .map_err(|error| StoreError::ConnectionFailed(error.to_string()))?;
        Ok(Self { pool })
    }

    /// Wraps an existing connection pool.
    pub const fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Creates the adapter's tables and constraints if they do not exist.
    #[instrument(skip(self))]
    pub async fn initialize_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        info!("care ledger schema initialized");
        Ok(())
    }

    /// Inserts an activity (master data fixture) and returns its id.
    pub async fn insert_activity(
        &self,
        name: &str,
        location: &str,
        capacity: u32,
        scheduled_at: DateTime<Utc>,
        staff_id: StaffId,
    ) -> StoreResult<ActivityId> {
        let row = sqlx::query(
            "INSERT INTO care_activities (name, location, capacity, scheduled_at, staff_id)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(name)
        .bind(location)
        .bind(i64::from(capacity))
        .bind(scheduled_at)
        .bind(raw(staff_id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        id_column(&row, "id")
    }

    /// Inserts a medicine (master data fixture) and returns its id.
    pub async fn insert_medicine(&self, name: &str, specification: &str) -> StoreResult<MedicineId> {
        let row = sqlx::query(
            "INSERT INTO care_medicines (name, specification) VALUES ($1, $2) RETURNING id",
        )
        .bind(name)
        .bind(specification)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        id_column(&row, "id")
    }

    /// Inserts a stock batch (master data fixture) and returns its id.
    pub async fn insert_batch(
        &self,
        medicine_id: MedicineId,
        quantity: i64,
    ) -> StoreResult<BatchId> {
        let row = sqlx::query(
            "INSERT INTO care_stock_batches (medicine_id, quantity) VALUES ($1, $2) RETURNING id",
        )
        .bind(raw(medicine_id))
        .bind(quantity)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        id_column(&row, "id")
    }

    /// Sets (or replaces) the reorder threshold for a medicine.
    pub async fn set_reorder_threshold(
        &self,
        medicine_id: MedicineId,
        threshold: i64,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO care_reorder_thresholds (medicine_id, min_available)
             VALUES ($1, $2)
             ON CONFLICT (medicine_id) DO UPDATE SET min_available = EXCLUDED.min_available",
        )
        .bind(raw(medicine_id))
        .bind(threshold)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}

/// A unit of work over PostgreSQL.
pub struct PgCareTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CareStore for PgCareStore {
    type Tx = PgCareTx;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        // The availability checks depend on reads not interleaving with
        // other writers; serialization failures are reported, not retried.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(PgCareTx { tx })
    }
}

#[async_trait]
impl CareTx for PgCareTx {
    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|error| StoreError::RollbackFailed(error.to_string()))
    }

    async fn fetch_activity(&mut self, id: ActivityId) -> StoreResult<Option<Activity>> {
        sqlx::query(
            "SELECT id, name, location, capacity, scheduled_at, staff_id
             FROM care_activities WHERE id = $1",
        )
        .bind(raw(id))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?
        .map(|row| activity_from_row(&row))
        .transpose()
    }

    async fn fetch_medicine(&mut self, id: MedicineId) -> StoreResult<Option<Medicine>> {
        sqlx::query("SELECT id, name, specification FROM care_medicines WHERE id = $1")
            .bind(raw(id))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?
            .map(|row| medicine_from_row(&row))
            .transpose()
    }

    async fn fetch_batch(&mut self, id: BatchId) -> StoreResult<Option<StockBatch>> {
        sqlx::query(
            "SELECT id, medicine_id, quantity, received_at FROM care_stock_batches WHERE id = $1",
        )
        .bind(raw(id))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?
        .map(|row| batch_from_row(&row))
        .transpose()
    }

    async fn insert_participation(
        &mut self,
        row: NewParticipation,
    ) -> StoreResult<ParticipationId> {
        let inserted = sqlx::query(
            "INSERT INTO care_participations (activity_id, elderly_id, status, registered_at)
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(raw(row.activity_id))
        .bind(raw(row.elderly_id))
        .bind(ParticipationStatus::Registered.as_str())
        .bind(row.registered_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        id_column(&inserted, "id")
    }

    async fn mark_attended(
        &mut self,
        activity_id: ActivityId,
        elderly_id: ElderlyId,
        checked_in_at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE care_participations
             SET status = $1, checked_in_at = $2
             WHERE activity_id = $3 AND elderly_id = $4 AND status = $5",
        )
        .bind(ParticipationStatus::Attended.as_str())
        .bind(checked_in_at)
        .bind(raw(activity_id))
        .bind(raw(elderly_id))
        .bind(ParticipationStatus::Registered.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn set_feedback(
        &mut self,
        activity_id: ActivityId,
        elderly_id: ElderlyId,
        feedback: &str,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE care_participations SET feedback = $1
             WHERE activity_id = $2 AND elderly_id = $3",
        )
        .bind(feedback)
        .bind(raw(activity_id))
        .bind(raw(elderly_id))
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn delete_participation(
        &mut self,
        activity_id: ActivityId,
        elderly_id: ElderlyId,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM care_participations WHERE activity_id = $1 AND elderly_id = $2",
        )
        .bind(raw(activity_id))
        .bind(raw(elderly_id))
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn participations_by_activity(
        &mut self,
        activity_id: ActivityId,
        status: ParticipationStatus,
    ) -> StoreResult<Vec<Participation>> {
        let rows = sqlx::query(
            "SELECT id, activity_id, elderly_id, status, registered_at, checked_in_at, feedback
             FROM care_participations
             WHERE activity_id = $1 AND status = $2
             ORDER BY registered_at, id",
        )
        .bind(raw(activity_id))
        .bind(status.as_str())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(participation_from_row).collect()
    }

    async fn participations_by_elderly(
        &mut self,
        elderly_id: ElderlyId,
    ) -> StoreResult<Vec<ParticipationWithActivity>> {
        let rows = sqlx::query(
            "SELECT p.id, p.activity_id, p.elderly_id, p.status, p.registered_at,
                    p.checked_in_at, p.feedback, a.name AS activity_name, a.scheduled_at
             FROM care_participations p
             JOIN care_activities a ON a.id = p.activity_id
             WHERE p.elderly_id = $1
             ORDER BY p.registered_at, p.id",
        )
        .bind(raw(elderly_id))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| {
                Ok(ParticipationWithActivity {
                    participation: participation_from_row(row)?,
                    activity_name: row.try_get("activity_name").map_err(column_error)?,
                    scheduled_at: row.try_get("scheduled_at").map_err(column_error)?,
                })
            })
            .collect()
    }

    async fn stock_aggregate(&mut self, medicine_id: MedicineId) -> StoreResult<StockAggregate> {
        let batches = sqlx::query(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT AS total,
                    COUNT(*) FILTER (WHERE quantity > 0) AS active
             FROM care_stock_batches WHERE medicine_id = $1",
        )
        .bind(raw(medicine_id))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        let total: i64 = batches.try_get("total").map_err(column_error)?;
        let active: i64 = batches.try_get("active").map_err(column_error)?;

        let reserved: i64 = sqlx::query(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT AS reserved
             FROM care_dispense_records WHERE medicine_id = $1 AND status = $2",
        )
        .bind(raw(medicine_id))
        .bind(DispenseStatus::Reserved.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?
        .try_get("reserved")
        .map_err(column_error)?;

        Ok(StockAggregate::new(
            medicine_id,
            total,
            reserved,
            u64::try_from(active).unwrap_or(0),
        ))
    }

    async fn batch_reserved(&mut self, batch_id: BatchId) -> StoreResult<i64> {
        sqlx::query(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT AS reserved
             FROM care_dispense_records WHERE batch_id = $1 AND status = $2",
        )
        .bind(raw(batch_id))
        .bind(DispenseStatus::Reserved.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?
        .try_get("reserved")
        .map_err(column_error)
    }

    async fn insert_dispense(&mut self, row: NewDispense) -> StoreResult<DispenseId> {
        let inserted = sqlx::query(
            "INSERT INTO care_dispense_records
                 (medicine_id, batch_id, order_id, staff_id, quantity, status, reserved_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(raw(row.medicine_id))
        .bind(raw(row.batch_id))
        .bind(row.order_id.map(raw))
        .bind(row.staff_id.map(raw))
        .bind(row.quantity.as_i64())
        .bind(DispenseStatus::Reserved.as_str())
        .bind(row.reserved_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        id_column(&inserted, "id")
    }

    async fn fetch_dispense(&mut self, id: DispenseId) -> StoreResult<Option<DispenseRecord>> {
        sqlx::query(
            "SELECT id, medicine_id, batch_id, order_id, staff_id, quantity, status,
                    reserved_at, closed_at
             FROM care_dispense_records WHERE id = $1",
        )
        .bind(raw(id))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?
        .map(|row| dispense_from_row(&row))
        .transpose()
    }

    async fn close_dispense(
        &mut self,
        id: DispenseId,
        to: DispenseStatus,
        closed_at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE care_dispense_records SET status = $1, closed_at = $2
             WHERE id = $3 AND status = $4",
        )
        .bind(to.as_str())
        .bind(closed_at)
        .bind(raw(id))
        .bind(DispenseStatus::Reserved.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn deduct_batch(&mut self, batch_id: BatchId, quantity: i64) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE care_stock_batches SET quantity = quantity - $1
             WHERE id = $2 AND quantity >= $1",
        )
        .bind(quantity)
        .bind(raw(batch_id))
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn reorder_threshold(&mut self, medicine_id: MedicineId) -> StoreResult<Option<i64>> {
        let row = sqlx::query(
            "SELECT min_available FROM care_reorder_thresholds WHERE medicine_id = $1",
        )
        .bind(raw(medicine_id))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        row.map(|row| row.try_get("min_available").map_err(column_error))
            .transpose()
    }

    async fn pending_procurement_exists(&mut self, medicine_id: MedicineId) -> StoreResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(
                 SELECT 1 FROM care_procurement_orders
                 WHERE medicine_id = $1 AND status = $2
             ) AS pending",
        )
        .bind(raw(medicine_id))
        .bind(ProcurementStatus::PendingReceipt.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        row.try_get("pending").map_err(column_error)
    }

    async fn insert_procurement(
        &mut self,
        row: NewProcurement,
    ) -> StoreResult<ProcurementOrder> {
        let inserted = sqlx::query(
            "INSERT INTO care_procurement_orders
                 (medicine_id, quantity, staff_id, requested_at, status)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(raw(row.medicine_id))
        .bind(row.quantity)
        .bind(raw(row.staff_id))
        .bind(row.requested_at)
        .bind(ProcurementStatus::PendingReceipt.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(ProcurementOrder {
            id: id_column(&inserted, "id")?,
            medicine_id: row.medicine_id,
            quantity: row.quantity,
            staff_id: row.staff_id,
            requested_at: row.requested_at,
            status: ProcurementStatus::PendingReceipt,
        })
    }
}

/// Narrows a typed identifier to its raw column value.
fn raw<T: Into<i64>>(id: T) -> i64 {
    id.into()
}

fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &error {
        match db.code().as_deref() {
            Some("23505") => {
                return StoreError::UniqueViolation {
                    constraint: db.constraint().unwrap_or("unknown").to_string(),
                };
            }
            Some("40001") => {
                return StoreError::SerializationConflict(db.message().to_string());
            }
            _ => {}
        }
    }
    match error {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            StoreError::ConnectionFailed(error.to_string())
        }
        other => StoreError::Database(other.to_string()),
    }
}

fn column_error(error: sqlx::Error) -> StoreError {
    StoreError::Database(error.to_string())
}

fn id_column<T>(row: &PgRow, column: &str) -> StoreResult<T>
where
    T: TryFrom<i64>,
    T::Error: std::fmt::Display,
{
    let value: i64 = row.try_get(column).map_err(column_error)?;
    T::try_from(value).map_err(|error| StoreError::Database(error.to_string()))
}

fn activity_from_row(row: &PgRow) -> StoreResult<Activity> {
    let capacity: i64 = row.try_get("capacity").map_err(column_error)?;
    Ok(Activity {
        id: id_column(row, "id")?,
        name: row.try_get("name").map_err(column_error)?,
        location: row.try_get("location").map_err(column_error)?,
        capacity: u32::try_from(capacity)
            .map_err(|_| StoreError::Database(format!("capacity {capacity} out of range")))?,
        scheduled_at: row.try_get("scheduled_at").map_err(column_error)?,
        staff_id: id_column(row, "staff_id")?,
    })
}

fn medicine_from_row(row: &PgRow) -> StoreResult<Medicine> {
    Ok(Medicine {
        id: id_column(row, "id")?,
        name: row.try_get("name").map_err(column_error)?,
        specification: row.try_get("specification").map_err(column_error)?,
    })
}

fn batch_from_row(row: &PgRow) -> StoreResult<StockBatch> {
    Ok(StockBatch {
        id: id_column(row, "id")?,
        medicine_id: id_column(row, "medicine_id")?,
        quantity: row.try_get("quantity").map_err(column_error)?,
        received_at: row.try_get("received_at").map_err(column_error)?,
    })
}

fn participation_from_row(row: &PgRow) -> StoreResult<Participation> {
    let status: String = row.try_get("status").map_err(column_error)?;
    Ok(Participation {
        id: id_column(row, "id")?,
        activity_id: id_column(row, "activity_id")?,
        elderly_id: id_column(row, "elderly_id")?,
        status: ParticipationStatus::parse(&status)?,
        registered_at: row.try_get("registered_at").map_err(column_error)?,
        checked_in_at: row.try_get("checked_in_at").map_err(column_error)?,
        feedback: row.try_get("feedback").map_err(column_error)?,
    })
}

fn dispense_from_row(row: &PgRow) -> StoreResult<DispenseRecord> {
    let status: String = row.try_get("status").map_err(column_error)?;
    let quantity: i64 = row.try_get("quantity").map_err(column_error)?;
    let quantity = u32::try_from(quantity)
        .ok()
        .and_then(|value| Quantity::try_new(value).ok())
        .ok_or_else(|| StoreError::Database(format!("quantity {quantity} out of range")))?;
    let order_id: Option<i64> = row.try_get("order_id").map_err(column_error)?;
    let staff_id: Option<i64> = row.try_get("staff_id").map_err(column_error)?;
    Ok(DispenseRecord {
        id: id_column(row, "id")?,
        medicine_id: id_column(row, "medicine_id")?,
        batch_id: id_column(row, "batch_id")?,
        order_id: order_id
            .map(|value| {
                MedicalOrderId::try_new(value)
                    .map_err(|error| StoreError::Database(error.to_string()))
            })
            .transpose()?,
        staff_id: staff_id
            .map(|value| {
                StaffId::try_new(value).map_err(|error| StoreError::Database(error.to_string()))
            })
            .transpose()?,
        quantity,
        status: DispenseStatus::parse(&status)?,
        reserved_at: row.try_get("reserved_at").map_err(column_error)?,
        closed_at: row.try_get("closed_at").map_err(column_error)?,
    })
}
