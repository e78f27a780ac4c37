//! In-memory store adapter for the `careledger` core.
//!
//! This crate provides an in-memory implementation of the [`CareStore`] /
//! [`CareTx`] storage port, useful for tests and development scenarios
//! where persistence is not required.
//!
//! Units of work fully serialize on a single async mutex: exactly one
//! transaction is open at a time, which satisfies the single-writer
//! admission the core requires for its availability checks. A transaction
//! mutates the shared state in place and keeps a begin-time snapshot;
//! dropping it without committing restores the snapshot, so rollback is
//! exact.
//!
//! Master data (activities, medicines, batches, thresholds) is owned by
//! external collaborators in production; here it is provided through the
//! `seed_*` fixtures. [`InMemoryCareStore::fail_once`] arms a one-shot
//! failure for a chosen statement, which rollback tests use to abort a unit
//! of work halfway through.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

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
    ActivityId, BatchId, DispenseId, ElderlyId, MedicineId, ParticipationId, ProcurementId,
    StaffId,
};
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Statements that can be armed to fail exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    /// Fail the next `insert_dispense`.
    InsertDispense,
    /// Fail the next `insert_procurement`.
    InsertProcurement,
    /// Fail the next `mark_attended`.
    MarkAttended,
}

#[derive(Debug, Clone, Default)]
struct Inner {
    activities: HashMap<ActivityId, Activity>,
    medicines: HashMap<MedicineId, Medicine>,
    batches: HashMap<BatchId, StockBatch>,
    participations: HashMap<ParticipationId, Participation>,
    dispenses: HashMap<DispenseId, DispenseRecord>,
    thresholds: HashMap<MedicineId, i64>,
    procurements: HashMap<ProcurementId, ProcurementOrder>,
    sequence: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.sequence += 1;
        self.sequence
    }
}

/// Thread-safe in-memory care store for testing.
#[derive(Clone, Default)]
pub struct InMemoryCareStore {
    inner: Arc<Mutex<Inner>>,
    // One-shot failure injection; deliberately outside the transactional
    // state so a rollback does not re-arm it.
    failure: Arc<StdMutex<Option<FailurePoint>>>,
}

impl InMemoryCareStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a one-shot failure for the given statement. The next matching
    /// statement fails with [`StoreError::Internal`] and the arm is
    /// consumed, whether or not the enclosing unit of work commits.
    pub fn fail_once(&self, point: FailurePoint) {
        *self.failure.lock().expect("Mutex poisoned") = Some(point);
    }

    /// Seeds an activity and returns its id.
    pub async fn seed_activity(
        &self,
        name: &str,
        location: &str,
        capacity: u32,
        scheduled_at: DateTime<Utc>,
        staff_id: StaffId,
    ) -> ActivityId {
        let mut inner = self.inner.lock().await;
        let id = ActivityId::try_new(inner.next_id()).expect("sequence ids are positive");
        inner.activities.insert(
            id,
            Activity {
                id,
                name: name.to_string(),
                location: location.to_string(),
                capacity,
                scheduled_at,
                staff_id,
            },
        );
        id
    }

    /// Seeds a medicine and returns its id.
    pub async fn seed_medicine(&self, name: &str, specification: &str) -> MedicineId {
        let mut inner = self.inner.lock().await;
        let id = MedicineId::try_new(inner.next_id()).expect("sequence ids are positive");
        inner.medicines.insert(
            id,
            Medicine {
                id,
                name: name.to_string(),
                specification: specification.to_string(),
            },
        );
        id
    }

    /// Seeds a stock batch for a medicine and returns its id.
    pub async fn seed_batch(&self, medicine_id: MedicineId, quantity: i64) -> BatchId {
        let mut inner = self.inner.lock().await;
        let id = BatchId::try_new(inner.next_id()).expect("sequence ids are positive");
        inner.batches.insert(
            id,
            StockBatch {
                id,
                medicine_id,
                quantity,
                received_at: Utc::now(),
            },
        );
        id
    }

    /// Sets the reorder threshold for a medicine.
    pub async fn set_reorder_threshold(&self, medicine_id: MedicineId, threshold: i64) {
        self.inner
            .lock()
            .await
            .thresholds
            .insert(medicine_id, threshold);
    }

    /// Removes the reorder threshold for a medicine, disabling
    /// auto-procurement.
    pub async fn clear_reorder_threshold(&self, medicine_id: MedicineId) {
        self.inner.lock().await.thresholds.remove(&medicine_id);
    }

    /// Returns all participation rows for an activity, in id order.
    pub async fn participations_for(&self, activity_id: ActivityId) -> Vec<Participation> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<_> = inner
            .participations
            .values()
            .filter(|p| p.activity_id == activity_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| {
            let raw: i64 = p.id.into();
            raw
        });
        rows
    }

    /// Returns a dispense record by id.
    pub async fn dispense_record(&self, id: DispenseId) -> Option<DispenseRecord> {
        self.inner.lock().await.dispenses.get(&id).cloned()
    }

    /// Returns all procurement orders for a medicine, in id order.
    pub async fn procurement_orders_for(&self, medicine_id: MedicineId) -> Vec<ProcurementOrder> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<_> = inner
            .procurements
            .values()
            .filter(|o| o.medicine_id == medicine_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| {
            let raw: i64 = o.id.into();
            raw
        });
        orders
    }
}

/// A unit of work over the in-memory store.
///
/// Holds the store lock for its whole lifetime, so units of work are fully
/// serialized. Mutations apply in place; a begin-time snapshot is restored
/// on drop unless the transaction committed.
pub struct InMemoryTx {
    guard: OwnedMutexGuard<Inner>,
    snapshot: Inner,
    failure: Arc<StdMutex<Option<FailurePoint>>>,
    committed: bool,
}

impl InMemoryTx {
    fn trip(&self, point: FailurePoint) -> StoreResult<()> {
        let mut armed = self.failure.lock().expect("Mutex poisoned");
        if *armed == Some(point) {
            *armed = None;
            return Err(StoreError::Internal(format!(
                "injected failure at {point:?}"
            )));
        }
        Ok(())
    }

    fn pair_row_id(&self, activity_id: ActivityId, elderly_id: ElderlyId) -> Option<ParticipationId> {
        self.guard
            .participations
            .values()
            .find(|p| p.activity_id == activity_id && p.elderly_id == elderly_id)
            .map(|p| p.id)
    }
}

impl Drop for InMemoryTx {
    fn drop(&mut self) {
        if !self.committed {
            *self.guard = std::mem::take(&mut self.snapshot);
        }
    }
}

#[async_trait]
impl CareStore for InMemoryCareStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        let guard = Arc::clone(&self.inner).lock_owned().await;
        let snapshot = guard.clone();
        Ok(InMemoryTx {
            guard,
            snapshot,
            failure: Arc::clone(&self.failure),
            committed: false,
        })
    }
}

#[async_trait]
impl CareTx for InMemoryTx {
    async fn commit(mut self) -> StoreResult<()> {
        self.committed = true;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        // Drop restores the snapshot.
        Ok(())
    }

    async fn fetch_activity(&mut self, id: ActivityId) -> StoreResult<Option<Activity>> {
        Ok(self.guard.activities.get(&id).cloned())
    }

    async fn fetch_medicine(&mut self, id: MedicineId) -> StoreResult<Option<Medicine>> {
        Ok(self.guard.medicines.get(&id).cloned())
    }

    async fn fetch_batch(&mut self, id: BatchId) -> StoreResult<Option<StockBatch>> {
        Ok(self.guard.batches.get(&id).cloned())
    }

    async fn insert_participation(
        &mut self,
        row: NewParticipation,
    ) -> StoreResult<ParticipationId> {
        if self.pair_row_id(row.activity_id, row.elderly_id).is_some() {
            return Err(StoreError::UniqueViolation {
                constraint: "care_participations_pair_key".to_string(),
            });
        }
        let id =
            ParticipationId::try_new(self.guard.next_id()).expect("sequence ids are positive");
        self.guard.participations.insert(
            id,
            Participation {
                id,
                activity_id: row.activity_id,
                elderly_id: row.elderly_id,
                status: ParticipationStatus::Registered,
                registered_at: row.registered_at,
                checked_in_at: None,
                feedback: None,
            },
        );
        Ok(id)
    }

    async fn mark_attended(
        &mut self,
        activity_id: ActivityId,
        elderly_id: ElderlyId,
        checked_in_at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        self.trip(FailurePoint::MarkAttended)?;
        let Some(id) = self.pair_row_id(activity_id, elderly_id) else {
            return Ok(0);
        };
        let row = self
            .guard
            .participations
            .get_mut(&id)
            .expect("row id was just looked up");
        if row.status != ParticipationStatus::Registered {
            return Ok(0);
        }
        row.status = ParticipationStatus::Attended;
        row.checked_in_at = Some(checked_in_at);
        Ok(1)
    }

    async fn set_feedback(
        &mut self,
        activity_id: ActivityId,
        elderly_id: ElderlyId,
        feedback: &str,
    ) -> StoreResult<u64> {
        let Some(id) = self.pair_row_id(activity_id, elderly_id) else {
            return Ok(0);
        };
        let row = self
            .guard
            .participations
            .get_mut(&id)
            .expect("row id was just looked up");
        row.feedback = Some(feedback.to_string());
        Ok(1)
    }

    async fn delete_participation(
        &mut self,
        activity_id: ActivityId,
        elderly_id: ElderlyId,
    ) -> StoreResult<u64> {
        let Some(id) = self.pair_row_id(activity_id, elderly_id) else {
            return Ok(0);
        };
        self.guard.participations.remove(&id);
        Ok(1)
    }

    async fn participations_by_activity(
        &mut self,
        activity_id: ActivityId,
        status: ParticipationStatus,
    ) -> StoreResult<Vec<Participation>> {
        let mut rows: Vec<_> = self
            .guard
            .participations
            .values()
            .filter(|p| p.activity_id == activity_id && p.status == status)
            .cloned()
            .collect();
        rows.sort_by_key(|p| {
            let raw: i64 = p.id.into();
            (p.registered_at, raw)
        });
        Ok(rows)
    }

    async fn participations_by_elderly(
        &mut self,
        elderly_id: ElderlyId,
    ) -> StoreResult<Vec<ParticipationWithActivity>> {
        let mut rows = Vec::new();
        for participation in self.guard.participations.values() {
            if participation.elderly_id != elderly_id {
                continue;
            }
            let activity = self
                .guard
                .activities
                .get(&participation.activity_id)
                .ok_or_else(|| {
                    StoreError::Internal(format!(
                        "participation {} references missing activity {}",
                        participation.id, participation.activity_id
                    ))
                })?;
            rows.push(ParticipationWithActivity {
                participation: participation.clone(),
                activity_name: activity.name.clone(),
                scheduled_at: activity.scheduled_at,
            });
        }
        rows.sort_by_key(|r| {
            let raw: i64 = r.participation.id.into();
            (r.participation.registered_at, raw)
        });
        Ok(rows)
    }

    async fn stock_aggregate(&mut self, medicine_id: MedicineId) -> StoreResult<StockAggregate> {
        let mut total = 0i64;
        let mut active_batches = 0u64;
        for batch in self.guard.batches.values() {
            if batch.medicine_id == medicine_id {
                total += batch.quantity;
                if batch.quantity > 0 {
                    active_batches += 1;
                }
            }
        }
        let reserved = self
            .guard
            .dispenses
            .values()
            .filter(|d| d.medicine_id == medicine_id && d.status == DispenseStatus::Reserved)
            .map(|d| d.quantity.as_i64())
            .sum();
        Ok(StockAggregate::new(
            medicine_id,
            total,
            reserved,
            active_batches,
        ))
    }

    async fn batch_reserved(&mut self, batch_id: BatchId) -> StoreResult<i64> {
        Ok(self
            .guard
            .dispenses
            .values()
            .filter(|d| d.batch_id == batch_id && d.status == DispenseStatus::Reserved)
            .map(|d| d.quantity.as_i64())
            .sum())
    }

    async fn insert_dispense(&mut self, row: NewDispense) -> StoreResult<DispenseId> {
        self.trip(FailurePoint::InsertDispense)?;
        let id = DispenseId::try_new(self.guard.next_id()).expect("sequence ids are positive");
        self.guard.dispenses.insert(
            id,
            DispenseRecord {
                id,
                medicine_id: row.medicine_id,
                batch_id: row.batch_id,
                order_id: row.order_id,
                staff_id: row.staff_id,
                quantity: row.quantity,
                status: DispenseStatus::Reserved,
                reserved_at: row.reserved_at,
                closed_at: None,
            },
        );
        Ok(id)
    }

    async fn fetch_dispense(&mut self, id: DispenseId) -> StoreResult<Option<DispenseRecord>> {
        Ok(self.guard.dispenses.get(&id).cloned())
    }

    async fn close_dispense(
        &mut self,
        id: DispenseId,
        to: DispenseStatus,
        closed_at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let Some(record) = self.guard.dispenses.get_mut(&id) else {
            return Ok(0);
        };
        if record.status != DispenseStatus::Reserved {
            return Ok(0);
        }
        record.status = to;
        record.closed_at = Some(closed_at);
        Ok(1)
    }

    async fn deduct_batch(&mut self, batch_id: BatchId, quantity: i64) -> StoreResult<u64> {
        let Some(batch) = self.guard.batches.get_mut(&batch_id) else {
            return Ok(0);
        };
        if batch.quantity < quantity {
            return Ok(0);
        }
        batch.quantity -= quantity;
        Ok(1)
    }

    async fn reorder_threshold(&mut self, medicine_id: MedicineId) -> StoreResult<Option<i64>> {
        Ok(self.guard.thresholds.get(&medicine_id).copied())
    }

    async fn pending_procurement_exists(&mut self, medicine_id: MedicineId) -> StoreResult<bool> {
        Ok(self.guard.procurements.values().any(|o| {
            o.medicine_id == medicine_id && o.status == ProcurementStatus::PendingReceipt
        }))
    }

    async fn insert_procurement(
        &mut self,
        row: NewProcurement,
    ) -> StoreResult<ProcurementOrder> {
        self.trip(FailurePoint::InsertProcurement)?;
        let id = ProcurementId::try_new(self.guard.next_id()).expect("sequence ids are positive");
        let order = ProcurementOrder {
            id,
            medicine_id: row.medicine_id,
            quantity: row.quantity,
            staff_id: row.staff_id,
            requested_at: row.requested_at,
            status: ProcurementStatus::PendingReceipt,
        };
        self.guard.procurements.insert(id, order.clone());
        Ok(order)
    }
}
