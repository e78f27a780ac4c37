//! `CareLedger` - transactional enrollment and stock accounting core for
//! residential care facilities.
//!
//! Two subsystems keep derived, cross-row state consistent under concurrent
//! multi-step mutation:
//!
//! - the **activity enrollment ledger** ([`ParticipationLedger`]): a small
//!   state machine over a resident's participation in a scheduled activity,
//!   with a derived absence state that is never persisted;
//! - the **stock and procurement engine** ([`StockEngine`] and
//!   [`ProcurementAdvisor`]): inventory accounting for dispensed medicine
//!   with a feedback-controlled auto-reorder policy.
//!
//! Both run every operation as one unit of work through the
//! [`TransactionCoordinator`], against any backend implementing the storage
//! port in [`store`]. The companion crates provide an in-memory backend for
//! tests and development and a PostgreSQL backend for production.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod coordinator;
pub mod errors;
pub mod participation;
pub mod procurement;
pub mod stock;
pub mod store;
pub mod types;

pub use coordinator::TransactionCoordinator;
pub use errors::{CoreError, CoreResult, StoreError, StoreResult};
pub use participation::{
    Activity, DisplayStatus, NewParticipation, Participation, ParticipationLedger,
    ParticipationStatus, ParticipationView, ParticipationWithActivity, derive_display_status,
};
pub use procurement::{
    NewProcurement, ProcurementAdvisor, ProcurementOrder, ProcurementPolicy, ProcurementStatus,
    plan_reorder,
};
pub use stock::{
    DispenseRecord, DispenseStatus, Medicine, NewDispense, ReserveRequest, StockAggregate,
    StockBatch, StockEngine,
};
pub use store::{CareStore, CareTx};
pub use types::{
    ActivityId, BatchId, DispenseId, ElderlyId, MedicalOrderId, MedicineId, ParticipationId,
    ProcurementId, Quantity, StaffId,
};
