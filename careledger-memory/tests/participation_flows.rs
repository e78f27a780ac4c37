//! End-to-end enrollment flows over the in-memory store.

use careledger::errors::CoreError;
use careledger::participation::{
    DisplayStatus, NewParticipation, ParticipationLedger, ParticipationStatus,
};
use careledger::store::{CareStore, CareTx};
use careledger::types::{ActivityId, ElderlyId, StaffId};
use careledger_memory::InMemoryCareStore;
use chrono::{Duration, Utc};

fn staff() -> StaffId {
    StaffId::try_new(42).unwrap()
}

fn elderly(raw: i64) -> ElderlyId {
    ElderlyId::try_new(raw).unwrap()
}

async fn future_activity(store: &InMemoryCareStore) -> ActivityId {
    store
        .seed_activity(
            "choir practice",
            "common room",
            30,
            Utc::now() + Duration::hours(3),
            staff(),
        )
        .await
}

async fn past_activity(store: &InMemoryCareStore) -> ActivityId {
    store
        .seed_activity(
            "garden stroll",
            "garden",
            30,
            Utc::now() - Duration::hours(3),
            staff(),
        )
        .await
}

/// Inserts a `Registered` row directly, bypassing the open-enrollment check.
/// Used to stage history for activities whose time has already passed.
async fn register_directly(store: &InMemoryCareStore, activity: ActivityId, resident: ElderlyId) {
    let mut tx = store.begin().await.unwrap();
    tx.insert_participation(NewParticipation {
        activity_id: activity,
        elderly_id: resident,
        registered_at: Utc::now() - Duration::hours(4),
    })
    .await
    .unwrap();
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn duplicate_registration_is_rejected_with_exactly_one_row() {
    let store = InMemoryCareStore::new();
    let activity = future_activity(&store).await;
    let ledger = ParticipationLedger::new(store.clone());
    let resident = elderly(5);

    let id = ledger.register(activity, resident).await.unwrap();
    let second = ledger.register(activity, resident).await;
    assert!(matches!(
        second,
        Err(CoreError::DuplicateRegistration { .. })
    ));

    let rows = store.participations_for(activity).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, id);
    assert_eq!(rows[0].status, ParticipationStatus::Registered);
}

#[tokio::test]
async fn concurrent_registrations_admit_exactly_one_winner() {
    let store = InMemoryCareStore::new();
    let activity = future_activity(&store).await;
    let ledger = ParticipationLedger::new(store.clone());
    let resident = elderly(5);

    let first = {
        let ledger = ledger.clone();
        tokio::spawn(async move { ledger.register(activity, resident).await })
    };
    let second = {
        let ledger = ledger.clone();
        tokio::spawn(async move { ledger.register(activity, resident).await })
    };

    let outcomes = [first.await.unwrap(), second.await.unwrap()];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    let losers = outcomes
        .iter()
        .filter(|r| matches!(r, Err(CoreError::DuplicateRegistration { .. })))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(losers, 1);
    assert_eq!(store.participations_for(activity).await.len(), 1);
}

#[tokio::test]
async fn check_in_before_register_reports_nothing_to_update() {
    let store = InMemoryCareStore::new();
    let activity = future_activity(&store).await;
    let ledger = ParticipationLedger::new(store.clone());

    let affected = ledger.check_in(activity, elderly(5)).await.unwrap();
    assert_eq!(affected, 0);
    assert!(store.participations_for(activity).await.is_empty());
}

#[tokio::test]
async fn check_in_is_idempotent_after_success() {
    let store = InMemoryCareStore::new();
    let activity = future_activity(&store).await;
    let ledger = ParticipationLedger::new(store.clone());
    let resident = elderly(5);

    ledger.register(activity, resident).await.unwrap();
    assert_eq!(ledger.check_in(activity, resident).await.unwrap(), 1);
    assert_eq!(ledger.check_in(activity, resident).await.unwrap(), 0);

    let history = ledger.history(resident).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        history[0].participation.status,
        ParticipationStatus::Attended
    );
    assert_eq!(history[0].display_status, DisplayStatus::Attended);
    assert!(history[0].participation.checked_in_at.is_some());
}

#[tokio::test]
async fn history_derives_absent_for_missed_past_activity() {
    let store = InMemoryCareStore::new();
    let activity = past_activity(&store).await;
    let resident = elderly(5);
    register_directly(&store, activity, resident).await;

    let ledger = ParticipationLedger::new(store.clone());
    let history = ledger.history(resident).await.unwrap();
    assert_eq!(history.len(), 1);
    // Raw status stays Registered; Absent exists only in the view.
    assert_eq!(
        history[0].participation.status,
        ParticipationStatus::Registered
    );
    assert_eq!(history[0].display_status, DisplayStatus::Absent);
    let stored = store.participations_for(activity).await;
    assert_eq!(stored[0].status, ParticipationStatus::Registered);
}

#[tokio::test]
async fn history_shows_registered_before_activity_starts() {
    let store = InMemoryCareStore::new();
    let activity = future_activity(&store).await;
    let ledger = ParticipationLedger::new(store.clone());
    let resident = elderly(5);

    ledger.register(activity, resident).await.unwrap();
    let history = ledger.history(resident).await.unwrap();
    assert_eq!(history[0].display_status, DisplayStatus::Registered);
}

#[tokio::test]
async fn cancel_removes_the_row_and_reports_not_found_after() {
    let store = InMemoryCareStore::new();
    let activity = future_activity(&store).await;
    let ledger = ParticipationLedger::new(store.clone());
    let resident = elderly(5);

    ledger.register(activity, resident).await.unwrap();
    assert_eq!(ledger.cancel(activity, resident).await.unwrap(), 1);
    assert_eq!(ledger.cancel(activity, resident).await.unwrap(), 0);
    assert!(store.participations_for(activity).await.is_empty());
}

#[tokio::test]
async fn cancelling_an_attended_participation_is_permitted() {
    let store = InMemoryCareStore::new();
    let activity = future_activity(&store).await;
    let ledger = ParticipationLedger::new(store.clone());
    let resident = elderly(5);

    ledger.register(activity, resident).await.unwrap();
    ledger.check_in(activity, resident).await.unwrap();
    assert_eq!(ledger.cancel(activity, resident).await.unwrap(), 1);
}

#[tokio::test]
async fn registration_is_rejected_once_the_activity_has_started() {
    let store = InMemoryCareStore::new();
    let activity = past_activity(&store).await;
    let ledger = ParticipationLedger::new(store.clone());

    let result = ledger.register(activity, elderly(5)).await;
    assert!(matches!(result, Err(CoreError::ActivityNotOpen { .. })));
    assert!(store.participations_for(activity).await.is_empty());
}

#[tokio::test]
async fn registration_for_unknown_activity_is_rejected() {
    let store = InMemoryCareStore::new();
    let ledger = ParticipationLedger::new(store);

    let bogus = ActivityId::try_new(9_999).unwrap();
    let result = ledger.register(bogus, elderly(5)).await;
    assert!(matches!(result, Err(CoreError::ActivityNotFound { .. })));
}

#[tokio::test]
async fn roster_of_an_upcoming_activity_lists_registrations() {
    let store = InMemoryCareStore::new();
    let activity = future_activity(&store).await;
    let ledger = ParticipationLedger::new(store.clone());

    ledger.register(activity, elderly(5)).await.unwrap();
    ledger.register(activity, elderly(6)).await.unwrap();
    ledger.check_in(activity, elderly(6)).await.unwrap();

    let roster = ledger.roster(activity).await.unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].elderly_id, elderly(5));
    assert_eq!(roster[0].status, ParticipationStatus::Registered);
}

#[tokio::test]
async fn roster_of_a_past_activity_lists_actual_attendance() {
    let store = InMemoryCareStore::new();
    let activity = past_activity(&store).await;
    register_directly(&store, activity, elderly(5)).await;
    register_directly(&store, activity, elderly(6)).await;
    {
        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.mark_attended(activity, elderly(6), Utc::now()).await.unwrap(),
            1
        );
        tx.commit().await.unwrap();
    }

    let ledger = ParticipationLedger::new(store.clone());
    let roster = ledger.roster(activity).await.unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].elderly_id, elderly(6));
    assert_eq!(roster[0].status, ParticipationStatus::Attended);
}

#[tokio::test]
async fn feedback_can_be_attached_to_an_existing_participation() {
    let store = InMemoryCareStore::new();
    let activity = future_activity(&store).await;
    let ledger = ParticipationLedger::new(store.clone());
    let resident = elderly(5);

    ledger.register(activity, resident).await.unwrap();
    let affected = ledger
        .record_feedback(activity, resident, "lovely afternoon".to_string())
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let history = ledger.history(resident).await.unwrap();
    assert_eq!(
        history[0].participation.feedback.as_deref(),
        Some("lovely afternoon")
    );

    let missing = ledger
        .record_feedback(activity, elderly(77), "never registered".to_string())
        .await
        .unwrap();
    assert_eq!(missing, 0);
}
