use super::*;
use crate::ledger::MovementRequest;
use crate::storage::Store;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use shared::gateway::{ExternalStatus, PaymentEvent, PaymentMethod, Provider};
use shared::models::{
    AbcClass, Coupon, CustomerSnapshot, MovementType, Order, OrderItem, OrderStatus, Product,
    ShippingStatus,
};

fn create_test_pipeline() -> (OrderPipeline, Store) {
    let store = Store::open_in_memory().unwrap();
    let pipeline = OrderPipeline::new(store.clone(), FinancialCancelPolicy::default());
    (pipeline, store)
}

fn seed_product(store: &Store, id: &str, stock: i64, acq_price: i64) {
    let txn = store.begin_write().unwrap();
    store
        .put_product(
            &txn,
            &Product {
                id: id.to_string(),
                name: format!("Product {id}"),
                sku: format!("SKU-{id}"),
                stock: 0,
                price: Decimal::from(40_000),
                acq_price: Decimal::from(acq_price),
                size: "M_LIGHT".to_string(),
                classification: AbcClass::B,
            },
        )
        .unwrap();
    txn.commit().unwrap();

    if stock != 0 {
        let ledger = pipeline_ledger(store);
        let txn = store.begin_write().unwrap();
        ledger
            .record(
                &txn,
                &MovementRequest {
                    product_id: id.to_string(),
                    quantity: stock,
                    movement_type: MovementType::InitialIntake,
                    reference_id: "intake".to_string(),
                    created_by: "test".to_string(),
                },
            )
            .unwrap();
        txn.commit().unwrap();
    }
}

fn pipeline_ledger(store: &Store) -> crate::ledger::Ledger {
    crate::ledger::Ledger::new(store.clone())
}

fn seed_order(store: &Store, items: Vec<OrderItem>, coupon: Option<&str>) -> Order {
    let total: Decimal = items
        .iter()
        .map(|i| i.price * Decimal::from(i.quantity))
        .sum();
    let order = Order {
        id: "o-1".to_string(),
        order_number: 1,
        reference: Order::reference_for(1),
        status: OrderStatus::Pending,
        customer: CustomerSnapshot::default(),
        items,
        subtotal: total,
        discount: Decimal::ZERO,
        total,
        coupon_code: coupon.map(str::to_string),
        financials: None,
        last_error: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let txn = store.begin_write().unwrap();
    store.put_order(&txn, &order).unwrap();
    if let Some(code) = coupon {
        store
            .put_coupon(
                &txn,
                &Coupon {
                    code: code.to_string(),
                    used_count: 0,
                    is_active: true,
                },
            )
            .unwrap();
    }
    txn.commit().unwrap();
    order
}

fn item(product_id: Option<&str>, quantity: i64) -> OrderItem {
    OrderItem {
        product_id: product_id.map(str::to_string),
        quantity,
        price: Decimal::from(40_000),
        sku: None,
        name: "item".to_string(),
    }
}

fn paid_event(reference: &str) -> PaymentEvent {
    PaymentEvent {
        provider: Provider::Wompi,
        order_reference: reference.to_string(),
        transaction_id: "tx-1".to_string(),
        external_status: ExternalStatus::Paid,
        amount_cents: 8_000_000, // 80000.00
        payment_method: PaymentMethod::WompiCard,
        raw_meta: json!({}),
    }
}

fn cancelled_event(reference: &str) -> PaymentEvent {
    PaymentEvent {
        external_status: ExternalStatus::Cancelled,
        transaction_id: "tx-2".to_string(),
        ..paid_event(reference)
    }
}

// ========================================================================
// PAID transition
// ========================================================================

#[test]
fn paid_decrements_stock_and_snapshots_financials() {
    let (pipeline, store) = create_test_pipeline();
    seed_product(&store, "p1", 5, 10_000);
    seed_order(&store, vec![item(Some("p1"), 2)], None);

    let outcome = pipeline.apply_payment_event(&paid_event("ORD-000001")).unwrap();
    assert!(matches!(
        outcome,
        PipelineOutcome::Transitioned {
            to: OrderStatus::Paid,
            ..
        }
    ));

    let order = store.get_order("o-1").unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    let fin = order.financials.expect("snapshot written at PAID");
    assert_eq!(fin.total_product_cost, Decimal::from(20_000));
    assert!(fin.gateway_fee > Decimal::ZERO);

    assert_eq!(store.get_product("p1").unwrap().unwrap().stock, 3);
    let payment = store.get_payment("o-1").unwrap().unwrap();
    assert_eq!(payment.transaction_id, "tx-1");

    // shipping row created lazily
    let shipping = store.get_shipping("o-1").unwrap().unwrap();
    assert_eq!(shipping.status, ShippingStatus::Pending);
}

#[test]
fn duplicate_paid_webhook_decrements_once() {
    let (pipeline, store) = create_test_pipeline();
    seed_product(&store, "p1", 5, 10_000);
    seed_order(&store, vec![item(Some("p1"), 2)], Some("WELCOME10"));

    pipeline.apply_payment_event(&paid_event("ORD-000001")).unwrap();
    let outcome = pipeline.apply_payment_event(&paid_event("ORD-000001")).unwrap();

    assert!(matches!(outcome, PipelineOutcome::AlreadyPaid { .. }));
    assert_eq!(store.get_product("p1").unwrap().unwrap().stock, 3);
    assert_eq!(store.get_coupon("WELCOME10").unwrap().unwrap().used_count, 1);

    // exactly one OrderPlaced movement in the ledger
    let movements = store.get_movements("p1").unwrap();
    let placed = movements
        .iter()
        .filter(|m| m.movement_type == MovementType::OrderPlaced)
        .count();
    assert_eq!(placed, 1);
}

#[test]
fn stock_exhaustion_aborts_whole_transition() {
    let (pipeline, store) = create_test_pipeline();
    seed_product(&store, "p1", 5, 10_000);
    seed_product(&store, "p2", 0, 8_000);
    seed_order(
        &store,
        vec![item(Some("p1"), 2), item(Some("p2"), 1)],
        Some("WELCOME10"),
    );

    let err = pipeline
        .apply_payment_event(&paid_event("ORD-000001"))
        .unwrap_err();
    assert!(matches!(err, PipelineError::StockExhausted(ref name) if name == "Product p2"));

    let order = store.get_order("o-1").unwrap().unwrap();
    // order keeps its prior status so the event can be retried
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(order.financials.is_none());
    assert!(order.last_error.is_some());

    // no partial decrement from the atomic path
    assert_eq!(store.get_product("p1").unwrap().unwrap().stock, 5);
    assert_eq!(store.get_product("p2").unwrap().unwrap().stock, 0);
    assert_eq!(store.get_coupon("WELCOME10").unwrap().unwrap().used_count, 0);
    assert!(store.get_payment("o-1").unwrap().is_none());
}

#[test]
fn manual_line_items_skip_the_ledger() {
    let (pipeline, store) = create_test_pipeline();
    seed_product(&store, "p1", 5, 10_000);
    seed_order(&store, vec![item(Some("p1"), 1), item(None, 3)], None);

    pipeline.apply_payment_event(&paid_event("ORD-000001")).unwrap();
    assert_eq!(store.get_product("p1").unwrap().unwrap().stock, 4);
}

#[test]
fn deleted_product_item_does_not_block_payment() {
    let (pipeline, store) = create_test_pipeline();
    seed_product(&store, "p1", 5, 10_000);
    // "ghost" was removed from the catalog after the order was placed
    seed_order(&store, vec![item(Some("p1"), 2), item(Some("ghost"), 1)], None);

    let outcome = pipeline.apply_payment_event(&paid_event("ORD-000001")).unwrap();
    assert!(matches!(
        outcome,
        PipelineOutcome::Transitioned {
            to: OrderStatus::Paid,
            ..
        }
    ));

    let order = store.get_order("o-1").unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    // the resolvable item was decremented, the ghost contributed nothing
    assert_eq!(store.get_product("p1").unwrap().unwrap().stock, 3);
    let fin = order.financials.unwrap();
    assert_eq!(fin.total_product_cost, Decimal::from(20_000));
}

#[test]
fn paid_on_cancelled_order_is_invalid() {
    let (pipeline, store) = create_test_pipeline();
    seed_product(&store, "p1", 5, 10_000);
    seed_order(&store, vec![item(Some("p1"), 1)], None);

    pipeline
        .apply_payment_event(&cancelled_event("ORD-000001"))
        .unwrap();
    let err = pipeline
        .apply_payment_event(&paid_event("ORD-000001"))
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidTransition { .. }));
    assert_eq!(store.get_product("p1").unwrap().unwrap().stock, 5);
}

// ========================================================================
// CANCELLED transition
// ========================================================================

#[test]
fn cancellation_after_paid_reverses_stock_and_coupon() {
    let (pipeline, store) = create_test_pipeline();
    seed_product(&store, "p1", 5, 10_000);
    seed_order(&store, vec![item(Some("p1"), 2)], Some("WELCOME10"));

    pipeline.apply_payment_event(&paid_event("ORD-000001")).unwrap();
    assert_eq!(store.get_product("p1").unwrap().unwrap().stock, 3);

    let outcome = pipeline
        .apply_payment_event(&cancelled_event("ORD-000001"))
        .unwrap();
    assert!(matches!(
        outcome,
        PipelineOutcome::Transitioned {
            from: OrderStatus::Paid,
            to: OrderStatus::Cancelled,
            ..
        }
    ));

    // net stock delta is zero and the coupon was released and detached
    assert_eq!(store.get_product("p1").unwrap().unwrap().stock, 5);
    assert_eq!(store.get_coupon("WELCOME10").unwrap().unwrap().used_count, 0);
    let order = store.get_order("o-1").unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert!(order.coupon_code.is_none());

    // default policy retains the historical snapshot
    assert!(order.financials.is_some());

    let audit = pipeline.ledger().verify_product("p1").unwrap();
    assert_eq!(audit.stored_stock, audit.ledger_sum);
}

#[test]
fn zero_policy_clears_snapshot_on_cancellation() {
    let store = Store::open_in_memory().unwrap();
    let pipeline = OrderPipeline::new(store.clone(), FinancialCancelPolicy::Zero);
    seed_product(&store, "p1", 5, 10_000);
    seed_order(&store, vec![item(Some("p1"), 1)], None);

    pipeline.apply_payment_event(&paid_event("ORD-000001")).unwrap();
    pipeline
        .apply_payment_event(&cancelled_event("ORD-000001"))
        .unwrap();

    let order = store.get_order("o-1").unwrap().unwrap();
    assert!(order.financials.is_none());
}

#[test]
fn cancellation_is_idempotent() {
    let (pipeline, store) = create_test_pipeline();
    seed_product(&store, "p1", 5, 10_000);
    seed_order(&store, vec![item(Some("p1"), 2)], None);

    pipeline.apply_payment_event(&paid_event("ORD-000001")).unwrap();
    pipeline
        .apply_payment_event(&cancelled_event("ORD-000001"))
        .unwrap();
    let outcome = pipeline
        .apply_payment_event(&cancelled_event("ORD-000001"))
        .unwrap();

    assert!(matches!(outcome, PipelineOutcome::AlreadyCancelled { .. }));
    // restock happened exactly once
    assert_eq!(store.get_product("p1").unwrap().unwrap().stock, 5);
}

#[test]
fn cancellation_of_unpaid_order_touches_no_stock() {
    let (pipeline, store) = create_test_pipeline();
    seed_product(&store, "p1", 5, 10_000);
    seed_order(&store, vec![item(Some("p1"), 2)], None);

    pipeline
        .apply_payment_event(&cancelled_event("ORD-000001"))
        .unwrap();

    assert_eq!(store.get_product("p1").unwrap().unwrap().stock, 5);
    assert!(store.get_movements("p1").unwrap().iter().all(|m| {
        m.movement_type != MovementType::OrderCancelled
    }));
}

// ========================================================================
// Financial snapshot immutability
// ========================================================================

#[test]
fn snapshot_is_not_recomputed_on_redelivery() {
    let (pipeline, store) = create_test_pipeline();
    seed_product(&store, "p1", 5, 10_000);
    seed_order(&store, vec![item(Some("p1"), 2)], None);

    pipeline.apply_payment_event(&paid_event("ORD-000001")).unwrap();
    let first = store.get_order("o-1").unwrap().unwrap().financials.unwrap();

    // redelivery with a different amount must not touch the snapshot
    let mut replay = paid_event("ORD-000001");
    replay.amount_cents = 1;
    pipeline.apply_payment_event(&replay).unwrap();

    let second = store.get_order("o-1").unwrap().unwrap().financials.unwrap();
    assert_eq!(first, second);
}

#[test]
fn snapshot_uses_order_total_not_gateway_amount() {
    let (pipeline, store) = create_test_pipeline();
    seed_product(&store, "p1", 5, 10_000);
    // order total 80000; the event misreports 1.00
    seed_order(&store, vec![item(Some("p1"), 2)], None);
    let mut event = paid_event("ORD-000001");
    event.amount_cents = 100;

    pipeline.apply_payment_event(&event).unwrap();

    let fin = store.get_order("o-1").unwrap().unwrap().financials.unwrap();
    let expected_fee = financials::gateway_fee(PaymentMethod::WompiCard, Decimal::from(80_000));
    assert_eq!(fin.gateway_fee, expected_fee);
    assert_eq!(
        fin.net_profit,
        Decimal::from(80_000) - Decimal::from(20_000) - expected_fee
    );
}

// ========================================================================
// PENDING transition
// ========================================================================

#[test]
fn pending_never_downgrades_a_paid_order() {
    let (pipeline, store) = create_test_pipeline();
    seed_product(&store, "p1", 5, 10_000);
    seed_order(&store, vec![item(Some("p1"), 1)], None);

    pipeline.apply_payment_event(&paid_event("ORD-000001")).unwrap();

    let mut pending = paid_event("ORD-000001");
    pending.external_status = ExternalStatus::Pending;
    let outcome = pipeline.apply_payment_event(&pending).unwrap();

    assert!(matches!(outcome, PipelineOutcome::NoChange { .. }));
    assert_eq!(
        store.get_order("o-1").unwrap().unwrap().status,
        OrderStatus::Paid
    );
}

#[test]
fn unknown_reference_is_order_not_found() {
    let (pipeline, _store) = create_test_pipeline();
    let err = pipeline
        .apply_payment_event(&paid_event("ORD-999999"))
        .unwrap_err();
    assert!(matches!(err, PipelineError::OrderNotFound(_)));
}
