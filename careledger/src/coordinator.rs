//! Scoped unit-of-work execution.
//!
//! Every domain operation is a short sequence of dependent reads and writes
//! that must commit atomically. Instead of repeating begin/commit/rollback
//! in every caller, the [`TransactionCoordinator`] provides the boundary by
//! construction: it begins a unit of work, runs a closure of statements
//! against it, commits when the closure succeeds and rolls back on any
//! error - domain or infrastructure - before re-raising it.
//!
//! Rollback is best-effort: if the rollback itself fails, the failure is
//! logged and the original error still propagates.

use crate::errors::{CoreError, CoreResult};
use crate::store::{CareStore, CareTx};
use futures::future::BoxFuture;
use tracing::error;

/// Runs closures of store statements inside a transaction boundary.
#[derive(Debug, Clone)]
pub struct TransactionCoordinator<S>
where
    S: CareStore,
{
    store: S,
}

impl<S> TransactionCoordinator<S>
where
    S: CareStore,
{
    /// Creates a coordinator over the given store.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Executes `op` inside a unit of work.
    ///
    /// The closure receives the open transaction and issues statements
    /// against it. If it returns `Ok` the transaction commits and the value
    /// is returned; if it returns `Err` (or a statement failed and the
    /// error was propagated with `?`) the transaction rolls back and the
    /// error is re-raised unchanged. No statement's effect is observable
    /// outside the boundary unless the whole sequence commits.
    pub async fn run<T, F>(&self, op: F) -> CoreResult<T>
    where
        T: Send,
        F: for<'tx> FnOnce(&'tx mut S::Tx) -> BoxFuture<'tx, CoreResult<T>> + Send,
    {
        let mut tx = self.store.begin().await.map_err(CoreError::from)?;

        match op(&mut tx).await {
            Ok(value) => {
                tx.commit().await.map_err(CoreError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    // Keep the original failure; the rollback failure is an
                    // infrastructure symptom of the same incident.
                    error!(
                        error = %rollback_err,
                        cause = %err,
                        "rollback failed after aborted unit of work"
                    );
                }
                Err(err)
            }
        }
    }
}
