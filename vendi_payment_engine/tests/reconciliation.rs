//! Payment reconciliation: authenticity, idempotency and the races between the two confirmation channels.

use vendi_common::{Paise, Secret};
use vendi_payment_engine::{
    db_types::{Item, Machine, OrderStatusType, PaymentSource, PaymentStatusType},
    helpers::checkout_signature,
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        seed,
        stub_gateway::StubGateway,
    },
    traits::{GatewayPaymentStatus, NewOrderRequest, OrderLineRequest},
    OrderFlowApi,
    PaymentReconciliationApi,
    ReconciliationError,
    SqliteDatabase,
};

const KEY_SECRET: &str = "test_gateway_key_secret";

struct Harness {
    orders: OrderFlowApi<SqliteDatabase>,
    payments: PaymentReconciliationApi<SqliteDatabase, StubGateway>,
    gateway: StubGateway,
    machine: Machine,
    item: Item,
}

async fn setup() -> Harness {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let machine = seed::seed_machine(&db, "VM-010").await;
    let item = seed::seed_item(&db, "Masala Dosa", 80, 4).await;
    let gateway = StubGateway::new();
    let orders = OrderFlowApi::new(db.clone());
    let payments = PaymentReconciliationApi::new(db.clone(), gateway.clone(), Secret::new(KEY_SECRET.to_string()));
    Harness { orders, payments, gateway, machine, item }
}

impl Harness {
    async fn pending_order_with_session(&self, user_id: &str) -> (vendi_payment_engine::db_types::Order, String) {
        let order = self
            .orders
            .place_order(NewOrderRequest {
                user_id: user_id.to_string(),
                machine_code: self.machine.machine_code.clone(),
                items: vec![OrderLineRequest { item_id: self.item.id, quantity: 1 }],
            })
            .await
            .expect("Error placing order");
        let session = self.payments.checkout_session(&order.order_id, user_id).await.expect("Error creating session");
        (order, session.gateway_order_id)
    }
}

/// A webhook delivered twice produces exactly one verified payment and exactly one order transition.
#[tokio::test]
async fn webhook_redelivery_is_idempotent() {
    let h = setup().await;
    let (order, gateway_order_id) = h.pending_order_with_session("user-10").await;

    let first = h
        .payments
        .record_webhook_payment(&gateway_order_id, "pay_777", Some("upi".to_string()))
        .await
        .expect("Error applying webhook");
    assert!(first.order_advanced);
    assert!(!first.duplicate);
    assert_eq!(first.order.status, OrderStatusType::ReadyForPickup);
    assert_eq!(first.payment.source, PaymentSource::Webhook);

    let second = h
        .payments
        .record_webhook_payment(&gateway_order_id, "pay_777", Some("upi".to_string()))
        .await
        .expect("Error applying webhook redelivery");
    assert!(second.duplicate);
    assert!(!second.order_advanced);

    let records = h.payments.payments_for_order(&order.order_id).await.expect("Error fetching payments");
    assert_eq!(records.len(), 1);
    assert!(records[0].verified);
    assert_eq!(records[0].status, PaymentStatusType::Success);
    assert_eq!(records[0].gateway_payment_id.as_deref(), Some("pay_777"));

    let history = h.orders.status_history(&order.order_id).await.expect("Error fetching history");
    let ready_entries =
        history.iter().filter(|e| e.status == OrderStatusType::ReadyForPickup).count();
    assert_eq!(ready_entries, 1, "Exactly one transition to ReadyForPickup must be recorded");
}

/// Two deliveries racing each other: one wins, the other is recognised as a duplicate inside the same
/// transactional machinery. Never two transitions, never two verified records.
#[tokio::test]
async fn concurrent_webhook_deliveries_apply_once() {
    let h = setup().await;
    let (order, gateway_order_id) = h.pending_order_with_session("user-11").await;

    let (a, b) = tokio::join!(
        h.payments.record_webhook_payment(&gateway_order_id, "pay_888", None),
        h.payments.record_webhook_payment(&gateway_order_id, "pay_888", None),
    );
    let a = a.expect("Error applying webhook");
    let b = b.expect("Error applying webhook");
    assert_eq!(
        [a.duplicate, b.duplicate].iter().filter(|d| **d).count(),
        1,
        "Exactly one delivery must be classified as the duplicate"
    );
    assert_eq!([a.order_advanced, b.order_advanced].iter().filter(|d| **d).count(), 1);

    let records = h.payments.payments_for_order(&order.order_id).await.expect("Error fetching payments");
    assert_eq!(records.len(), 1);
    assert!(records[0].verified);
    let history = h.orders.status_history(&order.order_id).await.expect("Error fetching history");
    assert_eq!(history.iter().filter(|e| e.status == OrderStatusType::ReadyForPickup).count(), 1);
}

/// A tampered client signature is rejected before anything is read or written.
#[tokio::test]
async fn tampered_signature_mutates_nothing() {
    let h = setup().await;
    let (order, gateway_order_id) = h.pending_order_with_session("user-12").await;
    h.gateway.script_payment("pay_999", &gateway_order_id, GatewayPaymentStatus::Captured);

    let mut signature = checkout_signature(KEY_SECRET, &gateway_order_id, "pay_999");
    signature.replace_range(0..4, "0000");
    let err = h
        .payments
        .confirm_client_payment(&gateway_order_id, "pay_999", &signature)
        .await
        .expect_err("Expected signature rejection");
    assert!(matches!(err, ReconciliationError::InvalidSignature));

    let current = h.orders.order_for_user(&order.order_id, "user-12").await.unwrap().expect("Order disappeared");
    assert_eq!(current.status, OrderStatusType::Pending);
    assert!(current.pickup_code.is_none());
    let records = h.payments.payments_for_order(&order.order_id).await.expect("Error fetching payments");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, PaymentStatusType::Pending);
    assert!(!records[0].verified);
}

/// A valid signature is not enough: the gateway's authoritative status must be a success state. A failed attempt is
/// recorded, the order stays payable, and a later successful attempt on the same session still goes through.
#[tokio::test]
async fn non_captured_payment_does_not_advance_order() {
    let h = setup().await;
    let (order, gateway_order_id) = h.pending_order_with_session("user-13").await;

    h.gateway.script_payment("pay_200", &gateway_order_id, GatewayPaymentStatus::Failed);
    let signature = checkout_signature(KEY_SECRET, &gateway_order_id, "pay_200");
    let err = h
        .payments
        .confirm_client_payment(&gateway_order_id, "pay_200", &signature)
        .await
        .expect_err("Expected failure");
    assert!(matches!(err, ReconciliationError::NotCaptured(GatewayPaymentStatus::Failed)));

    let records = h.payments.payments_for_order(&order.order_id).await.expect("Error fetching payments");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, PaymentStatusType::Failure);
    assert!(!records[0].verified);
    let current = h.orders.order_for_user(&order.order_id, "user-13").await.unwrap().expect("Order disappeared");
    assert_eq!(current.status, OrderStatusType::Pending);

    // The retry succeeds.
    h.gateway.script_payment("pay_201", &gateway_order_id, GatewayPaymentStatus::Captured);
    let signature = checkout_signature(KEY_SECRET, &gateway_order_id, "pay_201");
    let confirmation = h
        .payments
        .confirm_client_payment(&gateway_order_id, "pay_201", &signature)
        .await
        .expect("Error confirming retry");
    assert!(confirmation.order_advanced);
    assert_eq!(confirmation.order.status, OrderStatusType::ReadyForPickup);
}

/// A capture arriving for an order that was cancelled in the meantime is committed for audit, but the order is left
/// untouched — the InvalidTransition is swallowed, not surfaced.
#[tokio::test]
async fn late_capture_on_cancelled_order_is_kept_for_audit() {
    let h = setup().await;
    let (order, gateway_order_id) = h.pending_order_with_session("user-14").await;

    h.orders
        .cancel_order(&order.order_id, vendi_payment_engine::db_types::StatusActor::Admin, "Abandoned checkout")
        .await
        .expect("Error cancelling order");

    let confirmation = h
        .payments
        .record_webhook_payment(&gateway_order_id, "pay_300", None)
        .await
        .expect("A late capture must not error");
    assert!(!confirmation.order_advanced);
    assert!(!confirmation.duplicate);
    assert!(confirmation.payment.verified);
    assert_eq!(confirmation.order.status, OrderStatusType::Cancelled);

    let amount_total: Paise = Paise::from_rupees(84);
    assert_eq!(confirmation.payment.amount, amount_total);
}

/// Gateway outages surface as errors for the caller's retry policy; the engine performs no internal retries.
#[tokio::test]
async fn gateway_outage_surfaces_to_caller() {
    let h = setup().await;
    let order = h
        .orders
        .place_order(NewOrderRequest {
            user_id: "user-15".to_string(),
            machine_code: h.machine.machine_code.clone(),
            items: vec![OrderLineRequest { item_id: h.item.id, quantity: 1 }],
        })
        .await
        .expect("Error placing order");

    h.gateway.set_unreachable(true);
    let err = h.payments.checkout_session(&order.order_id, "user-15").await.expect_err("Expected gateway error");
    assert!(matches!(err, ReconciliationError::Gateway(_)));

    // No payment record was created for the failed session attempt.
    let records = h.payments.payments_for_order(&order.order_id).await.expect("Error fetching payments");
    assert!(records.is_empty());
}
