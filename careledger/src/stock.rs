//! Stock accounting engine.
//!
//! Owns the aggregate stock arithmetic and the dispense-record lifecycle:
//!
//! ```text
//! (none) --reserve--> Reserved --fulfill------------> Dispensed (terminal)
//!                     Reserved --cancel_reservation-> Cancelled (terminal)
//! ```
//!
//! The aggregate (total / reserved / available) is computed from batch and
//! dispense rows at read time and is never stored, so it cannot drift
//! independently of the records it summarizes. Depletion events (fulfill,
//! cancel) run the procurement advisor before the enclosing transaction
//! commits: a stock decrement and any replenishment order it triggers are
//! atomic together.

use crate::coordinator::TransactionCoordinator;
use crate::errors::{CoreError, CoreResult, StoreError};
use crate::procurement::{ProcurementAdvisor, ProcurementOrder, ProcurementPolicy};
use crate::store::{CareStore, CareTx};
use crate::types::{BatchId, DispenseId, MedicalOrderId, MedicineId, Quantity, StaffId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// A medicine in the facility formulary. Master data owned by the directory
/// collaborator; read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medicine {
    /// Medicine identifier
    pub id: MedicineId,
    /// Human-readable name
    pub name: String,
    /// Dosage form / strength specification
    pub specification: String,
}

/// A received batch of stock for one medicine.
///
/// `quantity` is the physical stock remaining in the batch; it decreases
/// only when a reservation is fulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBatch {
    /// Batch identifier
    pub id: BatchId,
    /// The medicine this batch holds
    pub medicine_id: MedicineId,
    /// Physical quantity remaining
    pub quantity: i64,
    /// When the batch was received
    pub received_at: DateTime<Utc>,
}

/// The computed stock position for one medicine.
///
/// `available_quantity` is always `total_quantity - reserved_quantity`; the
/// constructor enforces it so the invariant cannot be broken by hand-built
/// values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAggregate {
    /// The medicine summarized
    pub medicine_id: MedicineId,
    /// Sum of all batch quantities
    pub total_quantity: i64,
    /// Sum of quantities held by `Reserved` dispense records
    pub reserved_quantity: i64,
    /// `total_quantity - reserved_quantity`
    pub available_quantity: i64,
    /// Number of batches with stock remaining
    pub active_batches: u64,
}

impl StockAggregate {
    /// Builds an aggregate, deriving the available quantity.
    pub const fn new(
        medicine_id: MedicineId,
        total_quantity: i64,
        reserved_quantity: i64,
        active_batches: u64,
    ) -> Self {
        Self {
            medicine_id,
            total_quantity,
            reserved_quantity,
            available_quantity: total_quantity - reserved_quantity,
            active_batches,
        }
    }
}

/// Lifecycle status of a dispense record. `Dispensed` and `Cancelled` are
/// terminal: a record transitions out of `Reserved` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispenseStatus {
    /// Stock is held for this record but has not left inventory
    Reserved,
    /// Stock physically left inventory
    Dispensed,
    /// The reservation was released back to availability
    Cancelled,
}

impl DispenseStatus {
    /// Whether the record can no longer transition.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Dispensed | Self::Cancelled)
    }

    /// Stable textual form used by relational adapters.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reserved => "reserved",
            Self::Dispensed => "dispensed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses the textual form produced by [`Self::as_str`].
    pub fn parse(value: &str) -> Result<Self, StoreError> {
        match value {
            "reserved" => Ok(Self::Reserved),
            "dispensed" => Ok(Self::Dispensed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(StoreError::Database(format!(
                "unknown dispense status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for DispenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of medicine reserved or handed out against a stock batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispenseRecord {
    /// Record identifier
    pub id: DispenseId,
    /// The medicine dispensed
    pub medicine_id: MedicineId,
    /// The batch the stock is drawn from
    pub batch_id: BatchId,
    /// The medical order this dispense fulfils, if any
    pub order_id: Option<MedicalOrderId>,
    /// The staff member responsible, if recorded
    pub staff_id: Option<StaffId>,
    /// Quantity reserved
    pub quantity: Quantity,
    /// Lifecycle status
    pub status: DispenseStatus,
    /// When the reservation was created
    pub reserved_at: DateTime<Utc>,
    /// When the record reached a terminal status
    pub closed_at: Option<DateTime<Utc>>,
}

/// Insert payload for a new reservation. Records are always created in the
/// `Reserved` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDispense {
    /// The medicine to reserve
    pub medicine_id: MedicineId,
    /// The batch to draw from
    pub batch_id: BatchId,
    /// The medical order being fulfilled, if any
    pub order_id: Option<MedicalOrderId>,
    /// The staff member responsible, if recorded
    pub staff_id: Option<StaffId>,
    /// Quantity to reserve
    pub quantity: Quantity,
    /// Reservation timestamp
    pub reserved_at: DateTime<Utc>,
}

/// Parameters for creating a reservation through [`StockEngine::reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveRequest {
    /// The medicine to reserve
    pub medicine_id: MedicineId,
    /// The batch to draw from
    pub batch_id: BatchId,
    /// Quantity to reserve
    pub quantity: Quantity,
    /// The medical order being fulfilled, if any
    pub order_id: Option<MedicalOrderId>,
    /// The staff member responsible, if recorded
    pub staff_id: Option<StaffId>,
}

/// The stock accounting service.
///
/// All mutating operations run as one unit of work; the sum of reserved
/// quantities for a medicine never exceeds its total quantity because the
/// availability check and the insert happen inside the same serialized
/// transaction.
#[derive(Debug, Clone)]
pub struct StockEngine<S>
where
    S: CareStore,
{
    coordinator: TransactionCoordinator<S>,
    advisor: ProcurementAdvisor,
}

impl<S> StockEngine<S>
where
    S: CareStore,
{
    /// Creates an engine over the given store with the default procurement
    /// policy.
    pub fn new(store: S) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(store),
            advisor: ProcurementAdvisor::default(),
        }
    }

    /// Sets the procurement de-duplication policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ProcurementPolicy) -> Self {
        self.advisor = ProcurementAdvisor::new(policy);
        self
    }

    /// Returns the computed stock position for a medicine. Pure read, no
    /// side effects.
    #[instrument(skip(self))]
    pub async fn aggregate(&self, medicine_id: MedicineId) -> CoreResult<StockAggregate> {
        self.coordinator
            .run(move |tx| {
                Box::pin(async move {
                    if tx.fetch_medicine(medicine_id).await?.is_none() {
                        return Err(CoreError::MedicineNotFound { medicine_id });
                    }
                    tx.stock_aggregate(medicine_id).await.map_err(CoreError::from)
                })
            })
            .await
    }

    /// Reserves stock against a batch and returns the new record's id.
    ///
    /// Both the medicine-level and the batch-level available quantity must
    /// cover the request; otherwise the call fails with
    /// [`CoreError::InsufficientStock`] and has no side effect.
    #[instrument(skip(self))]
    pub async fn reserve(&self, request: ReserveRequest) -> CoreResult<DispenseId> {
        let now = Utc::now();
        self.coordinator
            .run(move |tx| {
                Box::pin(async move {
                    let ReserveRequest {
                        medicine_id,
                        batch_id,
                        quantity,
                        order_id,
                        staff_id,
                    } = request;

                    if tx.fetch_medicine(medicine_id).await?.is_none() {
                        return Err(CoreError::MedicineNotFound { medicine_id });
                    }
                    let batch = tx
                        .fetch_batch(batch_id)
                        .await?
                        .filter(|batch| batch.medicine_id == medicine_id)
                        .ok_or(CoreError::BatchNotFound {
                            batch_id,
                            medicine_id,
                        })?;

                    let requested = quantity.as_i64();
                    let aggregate = tx.stock_aggregate(medicine_id).await?;
                    if aggregate.available_quantity < requested {
                        return Err(CoreError::InsufficientStock {
                            medicine_id,
                            available: aggregate.available_quantity,
                            requested,
                        });
                    }
                    let batch_reserved = tx.batch_reserved(batch_id).await?;
                    let batch_available = batch.quantity - batch_reserved;
                    if batch_available < requested {
                        return Err(CoreError::InsufficientStock {
                            medicine_id,
                            available: batch_available,
                            requested,
                        });
                    }

                    tx.insert_dispense(NewDispense {
                        medicine_id,
                        batch_id,
                        order_id,
                        staff_id,
                        quantity,
                        reserved_at: now,
                    })
                    .await
                    .map_err(CoreError::from)
                })
            })
            .await
    }

    /// Fulfils a reservation: the stock physically leaves inventory.
    ///
    /// Transitions the record `Reserved -> Dispensed`, deducts the batch
    /// quantity (total and reserved both decrease by the record's quantity)
    /// and runs the procurement advisor inside the same transaction. Returns
    /// the replenishment order if one was created.
    #[instrument(skip(self))]
    pub async fn fulfill(
        &self,
        dispense_id: DispenseId,
        staff_id: StaffId,
    ) -> CoreResult<Option<ProcurementOrder>> {
        let advisor = self.advisor.clone();
        let now = Utc::now();
        self.coordinator
            .run(move |tx| {
                Box::pin(async move {
                    let record =
                        close_reservation(tx, dispense_id, DispenseStatus::Dispensed, now).await?;

                    let deducted = tx
                        .deduct_batch(record.batch_id, record.quantity.as_i64())
                        .await?;
                    if deducted == 0 {
                        // The batch row vanished or went short underneath a
                        // live reservation; the invariant is broken upstream.
                        return Err(CoreError::Store(StoreError::Internal(format!(
                            "batch {} cannot cover fulfilled reservation {}",
                            record.batch_id, dispense_id
                        ))));
                    }
                    debug!(%dispense_id, batch_id = %record.batch_id, "reservation fulfilled");

                    advisor.evaluate(tx, record.medicine_id, staff_id).await
                })
            })
            .await
    }

    /// Releases a reservation back to availability.
    ///
    /// Transitions the record `Reserved -> Cancelled`; the batch quantity is
    /// untouched. The procurement advisor still runs in the same
    /// transaction, since a release changes the available quantity.
    #[instrument(skip(self))]
    pub async fn cancel_reservation(
        &self,
        dispense_id: DispenseId,
        staff_id: StaffId,
    ) -> CoreResult<Option<ProcurementOrder>> {
        let advisor = self.advisor.clone();
        let now = Utc::now();
        self.coordinator
            .run(move |tx| {
                Box::pin(async move {
                    let record =
                        close_reservation(tx, dispense_id, DispenseStatus::Cancelled, now).await?;
                    debug!(%dispense_id, batch_id = %record.batch_id, "reservation cancelled");

                    advisor.evaluate(tx, record.medicine_id, staff_id).await
                })
            })
            .await
    }
}

/// Moves a dispense record out of `Reserved` via a conditional update.
///
/// The update matches only `Reserved` rows, so a record that already reached
/// a terminal status refuses the transition even if it was read as
/// `Reserved` by a stale snapshot.
async fn close_reservation<T>(
    tx: &mut T,
    dispense_id: DispenseId,
    to: DispenseStatus,
    closed_at: DateTime<Utc>,
) -> CoreResult<DispenseRecord>
where
    T: CareTx + ?Sized,
{
    let record = tx
        .fetch_dispense(dispense_id)
        .await?
        .ok_or(CoreError::DispenseNotFound { dispense_id })?;
    if record.status.is_terminal() {
        return Err(CoreError::InvalidTransition {
            dispense_id,
            status: record.status,
        });
    }

    let affected = tx.close_dispense(dispense_id, to, closed_at).await?;
    if affected == 0 {
        return Err(CoreError::InvalidTransition {
            dispense_id,
            status: record.status,
        });
    }
    Ok(record)
}
