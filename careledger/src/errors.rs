//! Error types for the `careledger` core.
//!
//! The error design distinguishes two layers:
//!
//! - **`CoreError`**: domain validation failures that callers can recover
//!   from (`DuplicateRegistration`, `InsufficientStock`, `InvalidTransition`,
//!   `ActivityNotOpen`, and the not-found family), plus a passthrough for
//!   infrastructure failures.
//! - **`StoreError`**: persistence layer failures (connections, constraint
//!   violations, serialization conflicts).
//!
//! Domain errors are raised before any mutating statement executes, or are
//! detected by the store's own constraint check causing the whole unit of
//! work to roll back; either way the caller observes a clean rejection and
//! never a half-applied state. Zero-row conditional updates (check-in or
//! cancel matching nothing) are *not* errors - they are reported as an
//! affected count of zero so "nothing to do" stays distinct from "failed".

use crate::stock::DispenseStatus;
use crate::types::{ActivityId, BatchId, DispenseId, ElderlyId, MedicineId};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by the domain services.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// A participation already exists for this (activity, elderly) pair.
    ///
    /// Under concurrent registration this is produced by translating the
    /// store's uniqueness violation inside the same transaction, so exactly
    /// one of two racing callers succeeds.
    #[error("resident {elderly_id} is already registered for activity {activity_id}")]
    DuplicateRegistration {
        /// The activity the duplicate registration targeted
        activity_id: ActivityId,
        /// The resident that was already registered
        elderly_id: ElderlyId,
    },

    /// The activity's scheduled time has passed, so enrollment is closed.
    #[error("activity {activity_id} is no longer open (scheduled at {scheduled_at})")]
    ActivityNotOpen {
        /// The activity that is closed for enrollment
        activity_id: ActivityId,
        /// When the activity was scheduled
        scheduled_at: DateTime<Utc>,
    },

    /// Available stock does not cover the requested quantity.
    #[error(
        "insufficient stock for medicine {medicine_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        /// The medicine that ran short
        medicine_id: MedicineId,
        /// Available quantity at the time of the check
        available: i64,
        /// Quantity that was requested
        requested: i64,
    },

    /// A dispense record was not in the state the transition requires.
    #[error("dispense record {dispense_id} cannot transition: status is {status}")]
    InvalidTransition {
        /// The record that refused the transition
        dispense_id: DispenseId,
        /// The record's current status
        status: DispenseStatus,
    },

    /// The referenced activity does not exist.
    #[error("activity {activity_id} not found")]
    ActivityNotFound {
        /// The missing activity
        activity_id: ActivityId,
    },

    /// The referenced medicine does not exist.
    #[error("medicine {medicine_id} not found")]
    MedicineNotFound {
        /// The missing medicine
        medicine_id: MedicineId,
    },

    /// The referenced batch does not exist or belongs to another medicine.
    #[error("stock batch {batch_id} not found for medicine {medicine_id}")]
    BatchNotFound {
        /// The missing or mismatched batch
        batch_id: BatchId,
        /// The medicine the caller claimed the batch belongs to
        medicine_id: MedicineId,
    },

    /// The referenced dispense record does not exist.
    #[error("dispense record {dispense_id} not found")]
    DispenseNotFound {
        /// The missing record
        dispense_id: DispenseId,
    },

    /// An infrastructure failure in the backing store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CoreError {
    /// Whether this error is a domain validation failure the caller can
    /// recover from, as opposed to an infrastructure failure.
    pub const fn is_domain(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}

/// Errors raised by the persistence layer.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A storage-level uniqueness guarantee rejected a write.
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation {
        /// Name of the violated constraint
        constraint: String,
    },

    /// The connection to the store failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A statement failed inside the store.
    #[error("database error: {0}")]
    Database(String),

    /// The store detected a serialization conflict between concurrent
    /// transactions; the caller may retry.
    #[error("serialization conflict: {0}")]
    SerializationConflict(String),

    /// Rolling back an aborted unit of work failed.
    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Type alias for domain service results.
pub type CoreResult<T> = Result<T, CoreError>;

/// Type alias for persistence layer results.
pub type StoreResult<T> = Result<T, StoreError>;
