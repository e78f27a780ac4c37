//! Feedback-controlled auto-reorder policy.
//!
//! After every depletion event the advisor compares the medicine's available
//! quantity against its configured reorder threshold and, when stock has
//! fallen below the watermark, creates a replenishment order *inside the
//! transaction that depleted the stock*. Depletion and replenishment are
//! therefore atomic with respect to each other.
//!
//! The reorder quantity targets twice the threshold but never orders less
//! than one full threshold's worth:
//!
//! ```text
//! purchase = max(2 * threshold - available, threshold)
//! ```

use crate::errors::{CoreResult, StoreError};
use crate::store::CareTx;
use crate::types::{MedicineId, ProcurementId, StaffId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Status of a procurement order. Orders are created pending receipt;
/// receiving and cancelling them is a collaborator's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcurementStatus {
    /// Ordered, goods not yet received
    PendingReceipt,
    /// Goods received and booked into stock
    Received,
    /// Order cancelled before receipt
    Cancelled,
}

impl ProcurementStatus {
    /// Stable textual form used by relational adapters.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingReceipt => "pending_receipt",
            Self::Received => "received",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses the textual form produced by [`Self::as_str`].
    pub fn parse(value: &str) -> Result<Self, StoreError> {
        match value {
            "pending_receipt" => Ok(Self::PendingReceipt),
            "received" => Ok(Self::Received),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(StoreError::Database(format!(
                "unknown procurement status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for ProcurementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated replenishment request for a medicine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcurementOrder {
    /// Order identifier
    pub id: ProcurementId,
    /// The medicine to replenish
    pub medicine_id: MedicineId,
    /// Quantity to purchase
    pub quantity: i64,
    /// The staff member the order is attributed to
    pub staff_id: StaffId,
    /// When the order was created
    pub requested_at: DateTime<Utc>,
    /// Order status
    pub status: ProcurementStatus,
}

/// Insert payload for a new procurement order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProcurement {
    /// The medicine to replenish
    pub medicine_id: MedicineId,
    /// Quantity to purchase
    pub quantity: i64,
    /// The staff member the order is attributed to
    pub staff_id: StaffId,
    /// Creation timestamp
    pub requested_at: DateTime<Utc>,
}

/// De-duplication policy for the advisor.
///
/// The historically observed behavior creates a new order on every trigger
/// while stock stays below the threshold, leaving duplicate cleanup to
/// staff. Whether that is intentional is an open policy question, so both
/// behaviors are available; the permissive one is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcurementPolicy {
    /// Emit a new order on every trigger below the threshold (default).
    #[default]
    AllowDuplicates,
    /// Skip order creation while an order for the medicine is still pending
    /// receipt.
    SuppressWhilePending,
}

/// Computes the reorder quantity, if any.
///
/// Returns `None` when reordering is disabled (`threshold` unset or not
/// positive) or when stock is healthy (`available >= threshold`). Otherwise
/// the purchase tops stock up to twice the threshold, but never orders less
/// than one threshold's worth - even when `available` is zero or negative.
pub fn plan_reorder(available: i64, threshold: Option<i64>) -> Option<i64> {
    let threshold = threshold.filter(|t| *t > 0)?;
    if available >= threshold {
        return None;
    }
    let target = 2 * threshold;
    Some((target - available).max(threshold))
}

/// Evaluates the reorder policy for one medicine inside a caller-provided
/// transaction.
#[derive(Debug, Clone, Default)]
pub struct ProcurementAdvisor {
    policy: ProcurementPolicy,
}

impl ProcurementAdvisor {
    /// Creates an advisor with the given policy.
    pub const fn new(policy: ProcurementPolicy) -> Self {
        Self { policy }
    }

    /// Returns the configured policy.
    pub const fn policy(&self) -> ProcurementPolicy {
        self.policy
    }

    /// Checks the medicine's stock position against its reorder threshold
    /// and creates a replenishment order when stock has fallen below it.
    ///
    /// Runs entirely inside `tx`; if the enclosing unit of work rolls back,
    /// the order is rolled back with it.
    pub async fn evaluate<T>(
        &self,
        tx: &mut T,
        medicine_id: MedicineId,
        staff_id: StaffId,
    ) -> CoreResult<Option<ProcurementOrder>>
    where
        T: CareTx + ?Sized,
    {
        let aggregate = tx.stock_aggregate(medicine_id).await?;
        let threshold = tx.reorder_threshold(medicine_id).await?;

        let Some(purchase_quantity) = plan_reorder(aggregate.available_quantity, threshold) else {
            debug!(
                %medicine_id,
                available = aggregate.available_quantity,
                ?threshold,
                "no reorder needed"
            );
            return Ok(None);
        };

        if self.policy == ProcurementPolicy::SuppressWhilePending
            && tx.pending_procurement_exists(medicine_id).await?
        {
            debug!(%medicine_id, "reorder suppressed: an order is already pending receipt");
            return Ok(None);
        }

        let order = tx
            .insert_procurement(NewProcurement {
                medicine_id,
                quantity: purchase_quantity,
                staff_id,
                requested_at: Utc::now(),
            })
            .await?;
        info!(
            %medicine_id,
            order_id = %order.id,
            quantity = order.quantity,
            available = aggregate.available_quantity,
            "replenishment order created"
        );
        Ok(Some(order))
    }
}
