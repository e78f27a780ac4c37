//! Activity enrollment ledger.
//!
//! Owns the participation state machine:
//!
//! ```text
//! (none) --register--> Registered --check_in--> Attended (terminal)
//!                      Registered --cancel----> (none)
//! ```
//!
//! `Absent` is a read-time-only derivation: a resident who registered but
//! never checked in for a now-past activity is *displayed* as absent, but the
//! stored status stays `Registered`. The derivation is centralized in
//! [`derive_display_status`] so every read path applies the same rule.

use crate::coordinator::TransactionCoordinator;
use crate::errors::{CoreError, CoreResult, StoreError};
use crate::store::{CareStore, CareTx};
use crate::types::{ActivityId, ElderlyId, ParticipationId, StaffId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// A scheduled facility activity, as read from the scheduling collaborator.
///
/// Read-only to this library; only `scheduled_at` participates in the
/// enrollment rules (whether registration is still open and which roster
/// view applies).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Activity identifier
    pub id: ActivityId,
    /// Human-readable name
    pub name: String,
    /// Where the activity takes place
    pub location: String,
    /// Maximum number of participants
    pub capacity: u32,
    /// When the activity is scheduled to start
    pub scheduled_at: DateTime<Utc>,
    /// Staff member responsible for the activity
    pub staff_id: StaffId,
}

impl Activity {
    /// Whether enrollment for this activity is still open at `now`.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at > now
    }
}

/// Persisted participation status. `Absent` is intentionally missing: it is
/// never stored, only derived at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipationStatus {
    /// The resident intends to attend
    Registered,
    /// The resident checked in
    Attended,
}

impl ParticipationStatus {
    /// Stable textual form used by relational adapters.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Attended => "attended",
        }
    }

    /// Parses the textual form produced by [`Self::as_str`].
    pub fn parse(value: &str) -> Result<Self, StoreError> {
        match value {
            "registered" => Ok(Self::Registered),
            "attended" => Ok(Self::Attended),
            other => Err(StoreError::Database(format!(
                "unknown participation status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for ParticipationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status as shown to callers, including the derived `Absent` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    /// Registered for an activity that has not started yet
    Registered,
    /// Checked in
    Attended,
    /// Registered but never checked in, and the activity time has passed
    Absent,
}

impl std::fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Registered => "registered",
            Self::Attended => "attended",
            Self::Absent => "absent",
        };
        f.write_str(s)
    }
}

/// Derives the caller-facing status from the persisted one.
///
/// A resident who registered but never checked in is shown as absent once
/// the activity's scheduled time has elapsed. The derived value is never
/// written back.
pub fn derive_display_status(
    raw: ParticipationStatus,
    scheduled_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> DisplayStatus {
    match raw {
        ParticipationStatus::Attended => DisplayStatus::Attended,
        ParticipationStatus::Registered => {
            if scheduled_at <= now {
                DisplayStatus::Absent
            } else {
                DisplayStatus::Registered
            }
        }
    }
}

/// A resident's enrollment record for one activity.
///
/// At most one row exists per (activity, elderly) pair; the backing store
/// enforces this with a uniqueness guarantee so concurrent registrations
/// cannot slip past an existence check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participation {
    /// Row identifier
    pub id: ParticipationId,
    /// The activity enrolled in
    pub activity_id: ActivityId,
    /// The enrolled resident
    pub elderly_id: ElderlyId,
    /// Persisted status
    pub status: ParticipationStatus,
    /// When the registration was created
    pub registered_at: DateTime<Utc>,
    /// When the resident checked in; set exactly when status is `Attended`
    pub checked_in_at: Option<DateTime<Utc>>,
    /// Optional free-form feedback left after the activity
    pub feedback: Option<String>,
}

/// Insert payload for a new registration. Rows are always created in the
/// `Registered` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewParticipation {
    /// The activity to enroll in
    pub activity_id: ActivityId,
    /// The resident enrolling
    pub elderly_id: ElderlyId,
    /// Registration timestamp
    pub registered_at: DateTime<Utc>,
}

/// A participation joined with the owning activity's schedule, as returned
/// by the per-resident store query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipationWithActivity {
    /// The participation row
    pub participation: Participation,
    /// Name of the owning activity
    pub activity_name: String,
    /// When the owning activity is scheduled
    pub scheduled_at: DateTime<Utc>,
}

/// A participation as presented to callers, with both the persisted status
/// and the derived display status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipationView {
    /// The participation row (carries the raw status)
    pub participation: Participation,
    /// Name of the owning activity
    pub activity_name: String,
    /// When the owning activity is scheduled
    pub scheduled_at: DateTime<Utc>,
    /// Derived status, including `Absent`
    pub display_status: DisplayStatus,
}

/// The activity enrollment service.
///
/// Every operation runs as one unit of work through the
/// [`TransactionCoordinator`]; partial effects of a failed operation are
/// never observable.
#[derive(Debug, Clone)]
pub struct ParticipationLedger<S>
where
    S: CareStore,
{
    coordinator: TransactionCoordinator<S>,
}

impl<S> ParticipationLedger<S>
where
    S: CareStore,
{
    /// Creates a ledger over the given store.
    pub fn new(store: S) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(store),
        }
    }

    /// Registers a resident for an activity and returns the new row's id.
    ///
    /// The activity must exist and still be open. Duplicate registration is
    /// detected by the store's uniqueness guarantee inside the same
    /// transaction - not by a prior existence read - so two concurrent
    /// registrations for the same pair resolve to exactly one winner, with
    /// the loser observing [`CoreError::DuplicateRegistration`].
    #[instrument(skip(self))]
    pub async fn register(
        &self,
        activity_id: ActivityId,
        elderly_id: ElderlyId,
    ) -> CoreResult<ParticipationId> {
        let now = Utc::now();
        self.coordinator
            .run(move |tx| {
                Box::pin(async move {
                    let activity = tx
                        .fetch_activity(activity_id)
                        .await?
                        .ok_or(CoreError::ActivityNotFound { activity_id })?;
                    if !activity.is_open(now) {
                        return Err(CoreError::ActivityNotOpen {
                            activity_id,
                            scheduled_at: activity.scheduled_at,
                        });
                    }

                    let row = NewParticipation {
                        activity_id,
                        elderly_id,
                        registered_at: now,
                    };
                    tx.insert_participation(row).await.map_err(|err| match err {
                        StoreError::UniqueViolation { .. } => {
                            debug!(
                                %activity_id,
                                %elderly_id,
                                "registration lost the uniqueness race"
                            );
                            CoreError::DuplicateRegistration {
                                activity_id,
                                elderly_id,
                            }
                        }
                        other => CoreError::Store(other),
                    })
                })
            })
            .await
    }

    /// Records attendance for a registered resident.
    ///
    /// Returns the number of rows updated: 1 on success, 0 when there is no
    /// `Registered` row for the pair (never registered, or already checked
    /// in). Zero is "nothing to update", not an error, and repeating the
    /// call after success is a no-op returning 0.
    #[instrument(skip(self))]
    pub async fn check_in(
        &self,
        activity_id: ActivityId,
        elderly_id: ElderlyId,
    ) -> CoreResult<u64> {
        let now = Utc::now();
        self.coordinator
            .run(move |tx| Box::pin(async move { tx.mark_attended(activity_id, elderly_id, now).await.map_err(CoreError::from) }))
            .await
    }

    /// Removes a participation row regardless of its status.
    ///
    /// Returns the number of rows deleted; 0 means not-found and is not
    /// fatal. Cancelling an already-attended participation is permitted
    /// here; forbidding it is a policy choice left to the caller-facing
    /// layer.
    #[instrument(skip(self))]
    pub async fn cancel(&self, activity_id: ActivityId, elderly_id: ElderlyId) -> CoreResult<u64> {
        self.coordinator
            .run(move |tx| {
                Box::pin(async move {
                    tx.delete_participation(activity_id, elderly_id)
                        .await
                        .map_err(CoreError::from)
                })
            })
            .await
    }

    /// Attaches feedback to an existing participation row.
    ///
    /// Affected-count semantics like [`Self::check_in`]: 0 means there is no
    /// row for the pair.
    #[instrument(skip(self, feedback))]
    pub async fn record_feedback(
        &self,
        activity_id: ActivityId,
        elderly_id: ElderlyId,
        feedback: String,
    ) -> CoreResult<u64> {
        self.coordinator
            .run(move |tx| {
                Box::pin(async move {
                    tx.set_feedback(activity_id, elderly_id, &feedback)
                        .await
                        .map_err(CoreError::from)
                })
            })
            .await
    }

    /// Lists the participants of an activity.
    ///
    /// For an activity whose scheduled time is still in the future this is
    /// the roster of who intends to attend (`Registered` rows); once the
    /// time has passed it is who actually attended (`Attended` rows). The
    /// branch happens at read time; nothing is stored.
    #[instrument(skip(self))]
    pub async fn roster(&self, activity_id: ActivityId) -> CoreResult<Vec<Participation>> {
        let now = Utc::now();
        self.coordinator
            .run(move |tx| {
                Box::pin(async move {
                    let activity = tx
                        .fetch_activity(activity_id)
                        .await?
                        .ok_or(CoreError::ActivityNotFound { activity_id })?;
                    let status = if activity.is_open(now) {
                        ParticipationStatus::Registered
                    } else {
                        ParticipationStatus::Attended
                    };
                    tx.participations_by_activity(activity_id, status)
                        .await
                        .map_err(CoreError::from)
                })
            })
            .await
    }

    /// Lists a resident's participations with derived display status.
    #[instrument(skip(self))]
    pub async fn history(&self, elderly_id: ElderlyId) -> CoreResult<Vec<ParticipationView>> {
        let now = Utc::now();
        let rows = self
            .coordinator
            .run(move |tx| {
                Box::pin(async move {
                    tx.participations_by_elderly(elderly_id)
                        .await
                        .map_err(CoreError::from)
                })
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let display_status =
                    derive_display_status(row.participation.status, row.scheduled_at, now);
                ParticipationView {
                    participation: row.participation,
                    activity_name: row.activity_name,
                    scheduled_at: row.scheduled_at,
                    display_status,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn at(offset_minutes: i64) -> DateTime<Utc> {
        Utc::now() + Duration::minutes(offset_minutes)
    }

    #[test]
    fn attended_is_always_displayed_as_attended() {
        let now = Utc::now();
        assert_eq!(
            derive_display_status(ParticipationStatus::Attended, at(-60), now),
            DisplayStatus::Attended
        );
        assert_eq!(
            derive_display_status(ParticipationStatus::Attended, at(60), now),
            DisplayStatus::Attended
        );
    }

    #[test]
    fn registered_for_future_activity_is_displayed_as_registered() {
        let now = Utc::now();
        assert_eq!(
            derive_display_status(ParticipationStatus::Registered, at(60), now),
            DisplayStatus::Registered
        );
    }

    #[test]
    fn registered_for_past_activity_is_displayed_as_absent() {
        let now = Utc::now();
        assert_eq!(
            derive_display_status(ParticipationStatus::Registered, at(-1), now),
            DisplayStatus::Absent
        );
        // Boundary: an activity starting exactly now is no longer "future".
        assert_eq!(
            derive_display_status(ParticipationStatus::Registered, now, now),
            DisplayStatus::Absent
        );
    }

    #[test]
    fn status_textual_forms_roundtrip() {
        for status in [ParticipationStatus::Registered, ParticipationStatus::Attended] {
            assert_eq!(ParticipationStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(ParticipationStatus::parse("absent").is_err());
    }

    proptest! {
        #[test]
        fn derivation_never_invents_attendance(
            raw_is_attended in any::<bool>(),
            offset in -10_000i64..10_000i64
        ) {
            let now = Utc::now();
            let raw = if raw_is_attended {
                ParticipationStatus::Attended
            } else {
                ParticipationStatus::Registered
            };
            let derived = derive_display_status(raw, now + Duration::seconds(offset), now);
            if derived == DisplayStatus::Attended {
                prop_assert_eq!(raw, ParticipationStatus::Attended);
            }
        }
    }
}
