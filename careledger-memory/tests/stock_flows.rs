//! End-to-end stock accounting and procurement flows over the in-memory
//! store.

use careledger::errors::CoreError;
use careledger::procurement::{ProcurementPolicy, ProcurementStatus};
use careledger::stock::{DispenseStatus, ReserveRequest, StockEngine};
use careledger::types::{BatchId, DispenseId, MedicineId, Quantity, StaffId};
use careledger_memory::{FailurePoint, InMemoryCareStore};

fn staff() -> StaffId {
    StaffId::try_new(42).unwrap()
}

fn qty(raw: u32) -> Quantity {
    Quantity::try_new(raw).unwrap()
}

fn request(medicine_id: MedicineId, batch_id: BatchId, quantity: u32) -> ReserveRequest {
    ReserveRequest {
        medicine_id,
        batch_id,
        quantity: qty(quantity),
        order_id: None,
        staff_id: Some(staff()),
    }
}

async fn seeded(store: &InMemoryCareStore, batch_quantity: i64) -> (MedicineId, BatchId) {
    let medicine = store.seed_medicine("ibuprofen", "200mg tablet").await;
    let batch = store.seed_batch(medicine, batch_quantity).await;
    (medicine, batch)
}

#[tokio::test]
async fn aggregate_reflects_batches_and_reservations() {
    let store = InMemoryCareStore::new();
    let (medicine, batch) = seeded(&store, 30).await;
    store.seed_batch(medicine, 10).await;
    let engine = StockEngine::new(store.clone());

    engine.reserve(request(medicine, batch, 7)).await.unwrap();

    let aggregate = engine.aggregate(medicine).await.unwrap();
    assert_eq!(aggregate.total_quantity, 40);
    assert_eq!(aggregate.reserved_quantity, 7);
    assert_eq!(aggregate.available_quantity, 33);
    assert_eq!(
        aggregate.available_quantity,
        aggregate.total_quantity - aggregate.reserved_quantity
    );
    assert_eq!(aggregate.active_batches, 2);
}

#[tokio::test]
async fn aggregate_for_unknown_medicine_is_rejected() {
    let store = InMemoryCareStore::new();
    let engine = StockEngine::new(store);

    let bogus = MedicineId::try_new(9_999).unwrap();
    let result = engine.aggregate(bogus).await;
    assert!(matches!(result, Err(CoreError::MedicineNotFound { .. })));
}

#[tokio::test]
async fn reservation_is_rejected_when_stock_is_exhausted_and_restored_by_cancel() {
    let store = InMemoryCareStore::new();
    let (medicine, batch) = seeded(&store, 5).await;
    let engine = StockEngine::new(store.clone());

    let first = engine.reserve(request(medicine, batch, 5)).await.unwrap();

    let second = engine.reserve(request(medicine, batch, 1)).await;
    match second {
        Err(CoreError::InsufficientStock {
            available,
            requested,
            ..
        }) => {
            assert_eq!(available, 0);
            assert_eq!(requested, 1);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    engine.cancel_reservation(first, staff()).await.unwrap();
    let aggregate = engine.aggregate(medicine).await.unwrap();
    assert_eq!(aggregate.available_quantity, 5);
    assert_eq!(aggregate.total_quantity, 5);

    let record = store.dispense_record(first).await.unwrap();
    assert_eq!(record.status, DispenseStatus::Cancelled);
    assert!(record.closed_at.is_some());
}

#[tokio::test]
async fn reservation_requires_matching_medicine_and_batch() {
    let store = InMemoryCareStore::new();
    let (medicine, _batch) = seeded(&store, 5).await;
    let other_medicine = store.seed_medicine("paracetamol", "500mg tablet").await;
    let other_batch = store.seed_batch(other_medicine, 5).await;
    let engine = StockEngine::new(store.clone());

    let mismatched = engine.reserve(request(medicine, other_batch, 1)).await;
    assert!(matches!(mismatched, Err(CoreError::BatchNotFound { .. })));

    let bogus_medicine = MedicineId::try_new(9_999).unwrap();
    let unknown = engine.reserve(request(bogus_medicine, other_batch, 1)).await;
    assert!(matches!(unknown, Err(CoreError::MedicineNotFound { .. })));
}

#[tokio::test]
async fn fulfillment_decrements_total_and_reserved_together() {
    let store = InMemoryCareStore::new();
    let (medicine, batch) = seeded(&store, 40).await;
    let engine = StockEngine::new(store.clone());

    let dispense = engine.reserve(request(medicine, batch, 25)).await.unwrap();
    engine.fulfill(dispense, staff()).await.unwrap();

    let aggregate = engine.aggregate(medicine).await.unwrap();
    assert_eq!(aggregate.total_quantity, 15);
    assert_eq!(aggregate.reserved_quantity, 0);
    assert_eq!(aggregate.available_quantity, 15);

    let record = store.dispense_record(dispense).await.unwrap();
    assert_eq!(record.status, DispenseStatus::Dispensed);
    assert!(record.closed_at.is_some());
}

#[tokio::test]
async fn terminal_records_refuse_further_transitions() {
    let store = InMemoryCareStore::new();
    let (medicine, batch) = seeded(&store, 40).await;
    let engine = StockEngine::new(store.clone());

    let dispense = engine.reserve(request(medicine, batch, 10)).await.unwrap();
    engine.fulfill(dispense, staff()).await.unwrap();

    let again = engine.fulfill(dispense, staff()).await;
    assert!(matches!(
        again,
        Err(CoreError::InvalidTransition {
            status: DispenseStatus::Dispensed,
            ..
        })
    ));
    let cancel = engine.cancel_reservation(dispense, staff()).await;
    assert!(matches!(cancel, Err(CoreError::InvalidTransition { .. })));

    let unknown = DispenseId::try_new(9_999).unwrap();
    let missing = engine.fulfill(unknown, staff()).await;
    assert!(matches!(missing, Err(CoreError::DispenseNotFound { .. })));
}

#[tokio::test]
async fn concurrent_reservations_never_exceed_total_stock() {
    let store = InMemoryCareStore::new();
    let (medicine, batch) = seeded(&store, 10).await;
    let engine = StockEngine::new(store.clone());

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.reserve(request(medicine, batch, 3)).await
        }));
    }

    let mut successes = 0;
    let mut rejections = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(CoreError::InsufficientStock { .. }) => rejections += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    // 4 x 3 = 12 against 10 in stock: exactly three fit.
    assert_eq!(successes, 3);
    assert_eq!(rejections, 1);

    let aggregate = engine.aggregate(medicine).await.unwrap();
    assert_eq!(aggregate.reserved_quantity, 9);
    assert!(aggregate.reserved_quantity <= aggregate.total_quantity);
    assert_eq!(
        aggregate.available_quantity,
        aggregate.total_quantity - aggregate.reserved_quantity
    );
}

#[tokio::test]
async fn depletion_below_threshold_creates_a_topup_order() {
    let store = InMemoryCareStore::new();
    let (medicine, batch) = seeded(&store, 40).await;
    store.set_reorder_threshold(medicine, 20).await;
    let engine = StockEngine::new(store.clone());

    let dispense = engine.reserve(request(medicine, batch, 25)).await.unwrap();
    let order = engine.fulfill(dispense, staff()).await.unwrap();

    // available = 15, threshold = 20: purchase = max(40 - 15, 20) = 25
    let order = order.expect("stock fell below the threshold");
    assert_eq!(order.quantity, 25);
    assert_eq!(order.medicine_id, medicine);
    assert_eq!(order.staff_id, staff());
    assert_eq!(order.status, ProcurementStatus::PendingReceipt);

    let orders = store.procurement_orders_for(medicine).await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0], order);
}

#[tokio::test]
async fn healthy_stock_creates_no_order() {
    let store = InMemoryCareStore::new();
    let (medicine, batch) = seeded(&store, 50).await;
    store.set_reorder_threshold(medicine, 20).await;
    let engine = StockEngine::new(store.clone());

    let dispense = engine.reserve(request(medicine, batch, 25)).await.unwrap();
    let order = engine.fulfill(dispense, staff()).await.unwrap();

    // available = 25 >= threshold = 20
    assert!(order.is_none());
    assert!(store.procurement_orders_for(medicine).await.is_empty());
}

#[tokio::test]
async fn unset_or_disabled_threshold_never_orders() {
    let store = InMemoryCareStore::new();
    let (medicine, batch) = seeded(&store, 10).await;
    let engine = StockEngine::new(store.clone());

    let dispense = engine.reserve(request(medicine, batch, 8)).await.unwrap();
    assert!(engine.fulfill(dispense, staff()).await.unwrap().is_none());

    store.set_reorder_threshold(medicine, 0).await;
    let dispense = engine.reserve(request(medicine, batch, 1)).await.unwrap();
    assert!(engine.fulfill(dispense, staff()).await.unwrap().is_none());
    assert!(store.procurement_orders_for(medicine).await.is_empty());
}

#[tokio::test]
async fn repeated_triggers_emit_duplicate_orders_by_default() {
    let store = InMemoryCareStore::new();
    let (medicine, batch) = seeded(&store, 30).await;
    store.set_reorder_threshold(medicine, 20).await;
    let engine = StockEngine::new(store.clone());

    let first = engine.reserve(request(medicine, batch, 15)).await.unwrap();
    engine.fulfill(first, staff()).await.unwrap();
    let second = engine.reserve(request(medicine, batch, 5)).await.unwrap();
    engine.fulfill(second, staff()).await.unwrap();

    // Both fulfillments left stock below the threshold; no de-duplication.
    assert_eq!(store.procurement_orders_for(medicine).await.len(), 2);
}

#[tokio::test]
async fn pending_orders_suppress_reordering_under_the_strict_policy() {
    let store = InMemoryCareStore::new();
    let (medicine, batch) = seeded(&store, 30).await;
    store.set_reorder_threshold(medicine, 20).await;
    let engine =
        StockEngine::new(store.clone()).with_policy(ProcurementPolicy::SuppressWhilePending);

    let first = engine.reserve(request(medicine, batch, 15)).await.unwrap();
    assert!(engine.fulfill(first, staff()).await.unwrap().is_some());
    let second = engine.reserve(request(medicine, batch, 5)).await.unwrap();
    assert!(engine.fulfill(second, staff()).await.unwrap().is_none());

    assert_eq!(store.procurement_orders_for(medicine).await.len(), 1);
}

#[tokio::test]
async fn releasing_a_reservation_also_runs_the_advisor() {
    let store = InMemoryCareStore::new();
    let (medicine, batch) = seeded(&store, 10).await;
    store.set_reorder_threshold(medicine, 20).await;
    let engine = StockEngine::new(store.clone());

    let dispense = engine.reserve(request(medicine, batch, 5)).await.unwrap();
    let order = engine.cancel_reservation(dispense, staff()).await.unwrap();

    // available back to 10, still below 20: purchase = max(40 - 10, 20) = 30
    assert_eq!(order.expect("still below threshold").quantity, 30);
}

#[tokio::test]
async fn procurement_failure_rolls_back_the_whole_fulfillment() {
    let store = InMemoryCareStore::new();
    let (medicine, batch) = seeded(&store, 40).await;
    store.set_reorder_threshold(medicine, 20).await;
    let engine = StockEngine::new(store.clone());

    let dispense = engine.reserve(request(medicine, batch, 25)).await.unwrap();

    store.fail_once(FailurePoint::InsertProcurement);
    let result = engine.fulfill(dispense, staff()).await;
    assert!(matches!(result, Err(CoreError::Store(_))));

    // The stock decrement rolled back with the failed order.
    let aggregate = engine.aggregate(medicine).await.unwrap();
    assert_eq!(aggregate.total_quantity, 40);
    assert_eq!(aggregate.reserved_quantity, 25);
    assert_eq!(aggregate.available_quantity, 15);
    let record = store.dispense_record(dispense).await.unwrap();
    assert_eq!(record.status, DispenseStatus::Reserved);
    assert!(store.procurement_orders_for(medicine).await.is_empty());

    // The failure arm is consumed; the retry succeeds end to end.
    let order = engine.fulfill(dispense, staff()).await.unwrap();
    assert_eq!(order.expect("below threshold after fulfillment").quantity, 25);
    let aggregate = engine.aggregate(medicine).await.unwrap();
    assert_eq!(aggregate.total_quantity, 15);
}

#[tokio::test]
async fn failed_reservation_leaves_no_record_behind() {
    let store = InMemoryCareStore::new();
    let (medicine, batch) = seeded(&store, 10).await;
    let engine = StockEngine::new(store.clone());

    store.fail_once(FailurePoint::InsertDispense);
    let result = engine.reserve(request(medicine, batch, 3)).await;
    assert!(matches!(result, Err(CoreError::Store(_))));

    let aggregate = engine.aggregate(medicine).await.unwrap();
    assert_eq!(aggregate.reserved_quantity, 0);
    assert_eq!(aggregate.available_quantity, 10);
}
