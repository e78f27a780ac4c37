//! Storage port for the care ledger.
//!
//! This module defines the backend-independent traits the domain services
//! run against. A [`CareStore`] hands out units of work ([`CareTx`]); every
//! statement a service issues goes through the transaction, and nothing is
//! observable outside it until `commit`.
//!
//! Design notes for implementors:
//!
//! - `insert_participation` must enforce uniqueness of the
//!   (activity, elderly) pair *inside the transaction* and report a
//!   violation as [`StoreError::UniqueViolation`]. An existence check before
//!   the insert is not sufficient under concurrency.
//! - The conditional updates (`mark_attended`, `set_feedback`,
//!   `delete_participation`, `close_dispense`, `deduct_batch`) return the
//!   affected row count so services can distinguish "nothing matched" from
//!   success without a read-then-write race.
//! - Concurrent units of work must serialize such that the availability
//!   check a service performs and the insert that follows it are not
//!   interleaved with another writer's (single-writer admission or
//!   serializable isolation).

use crate::errors::StoreResult;
use crate::participation::{
    Activity, NewParticipation, Participation, ParticipationStatus, ParticipationWithActivity,
};
use crate::procurement::{NewProcurement, ProcurementOrder};
use crate::stock::{DispenseRecord, DispenseStatus, Medicine, NewDispense, StockAggregate, StockBatch};
use crate::types::{ActivityId, BatchId, DispenseId, ElderlyId, MedicineId, ParticipationId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A handle to the backing store, capable of opening units of work.
#[async_trait]
pub trait CareStore: Send + Sync {
    /// The transaction type this store hands out.
    type Tx: CareTx;

    /// Begins a new unit of work.
    async fn begin(&self) -> StoreResult<Self::Tx>;
}

/// One unit of work over the backing store.
///
/// All statement methods take `&mut self`; `commit` and `rollback` consume
/// the transaction. Dropping a transaction without committing must discard
/// its effects.
#[async_trait]
pub trait CareTx: Send {
    /// Makes all effects of this unit of work visible.
    async fn commit(self) -> StoreResult<()>;

    /// Discards all effects of this unit of work.
    async fn rollback(self) -> StoreResult<()>;

    // -- master data ------------------------------------------------------

    /// Looks up an activity.
    async fn fetch_activity(&mut self, id: ActivityId) -> StoreResult<Option<Activity>>;

    /// Looks up a medicine.
    async fn fetch_medicine(&mut self, id: MedicineId) -> StoreResult<Option<Medicine>>;

    /// Looks up a stock batch.
    async fn fetch_batch(&mut self, id: BatchId) -> StoreResult<Option<StockBatch>>;

    // -- participations ---------------------------------------------------

    /// Inserts a new `Registered` participation and returns its id.
    ///
    /// Fails with [`StoreError::UniqueViolation`] when a row for the pair
    /// already exists.
    ///
    /// [`StoreError::UniqueViolation`]: crate::errors::StoreError::UniqueViolation
    async fn insert_participation(
        &mut self,
        row: NewParticipation,
    ) -> StoreResult<ParticipationId>;

    /// Conditionally updates `Registered -> Attended` for the pair, setting
    /// the check-in time. Returns the number of rows updated (0 or 1).
    async fn mark_attended(
        &mut self,
        activity_id: ActivityId,
        elderly_id: ElderlyId,
        checked_in_at: DateTime<Utc>,
    ) -> StoreResult<u64>;

    /// Sets the feedback text on the pair's row, regardless of status.
    /// Returns the number of rows updated (0 or 1).
    async fn set_feedback(
        &mut self,
        activity_id: ActivityId,
        elderly_id: ElderlyId,
        feedback: &str,
    ) -> StoreResult<u64>;

    /// Deletes the pair's row, regardless of status. Returns the number of
    /// rows deleted (0 or 1).
    async fn delete_participation(
        &mut self,
        activity_id: ActivityId,
        elderly_id: ElderlyId,
    ) -> StoreResult<u64>;

    /// Lists the activity's participations with the given status, ordered
    /// by registration time.
    async fn participations_by_activity(
        &mut self,
        activity_id: ActivityId,
        status: ParticipationStatus,
    ) -> StoreResult<Vec<Participation>>;

    /// Lists the resident's participations joined with the owning
    /// activity's schedule, ordered by registration time.
    async fn participations_by_elderly(
        &mut self,
        elderly_id: ElderlyId,
    ) -> StoreResult<Vec<ParticipationWithActivity>>;

    // -- stock ------------------------------------------------------------

    /// Computes the stock aggregate for a medicine by summing its batches
    /// and `Reserved` dispense records.
    async fn stock_aggregate(&mut self, medicine_id: MedicineId) -> StoreResult<StockAggregate>;

    /// Sums the `Reserved` quantities held against one batch.
    async fn batch_reserved(&mut self, batch_id: BatchId) -> StoreResult<i64>;

    /// Inserts a new `Reserved` dispense record and returns its id.
    async fn insert_dispense(&mut self, row: NewDispense) -> StoreResult<DispenseId>;

    /// Looks up a dispense record.
    async fn fetch_dispense(&mut self, id: DispenseId) -> StoreResult<Option<DispenseRecord>>;

    /// Conditionally transitions a `Reserved` record to the given terminal
    /// status, setting the close time. Returns the number of rows updated
    /// (0 or 1); rows not in `Reserved` never match.
    async fn close_dispense(
        &mut self,
        id: DispenseId,
        to: DispenseStatus,
        closed_at: DateTime<Utc>,
    ) -> StoreResult<u64>;

    /// Conditionally deducts quantity from a batch that can cover it.
    /// Returns the number of rows updated (0 or 1).
    async fn deduct_batch(&mut self, batch_id: BatchId, quantity: i64) -> StoreResult<u64>;

    // -- procurement ------------------------------------------------------

    /// Reads the configured reorder threshold for a medicine, if any.
    async fn reorder_threshold(&mut self, medicine_id: MedicineId) -> StoreResult<Option<i64>>;

    /// Whether a procurement order for the medicine is still pending
    /// receipt.
    async fn pending_procurement_exists(&mut self, medicine_id: MedicineId) -> StoreResult<bool>;

    /// Inserts a new pending-receipt procurement order and returns it with
    /// its allocated id.
    async fn insert_procurement(&mut self, row: NewProcurement)
        -> StoreResult<ProcurementOrder>;
}
