use chrono::Duration;
use vendi_common::{Paise, Secret};
use vendi_payment_engine::{
    db_types::{Item, Machine, OrderStatusType, StatusActor},
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        seed,
        stub_gateway::StubGateway,
    },
    traits::{GatewayPaymentStatus, NewOrderRequest, OrderFlowError, OrderLineRequest},
    DispenseApi,
    OrderFlowApi,
    PaymentReconciliationApi,
    SqliteDatabase,
};

const KEY_SECRET: &str = "test_gateway_key_secret";

async fn setup() -> (SqliteDatabase, Machine, Item) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let machine = seed::seed_machine(&db, "VM-001").await;
    let item = seed::seed_item(&db, "Veg Thali", 60, 3).await;
    (db, machine, item)
}

fn order_request(user_id: &str, machine: &Machine, item: &Item, quantity: i64) -> NewOrderRequest {
    NewOrderRequest {
        user_id: user_id.to_string(),
        machine_code: machine.machine_code.clone(),
        items: vec![OrderLineRequest { item_id: item.id, quantity }],
    }
}

/// Walks one order through the entire happy path and checks every invariant along the way: amounts frozen at
/// creation, pickup code present exactly while ready, history always ending on the current status, and stale
/// machine calls rejected.
#[tokio::test]
async fn full_order_lifecycle() {
    let (db, machine, item) = setup().await;
    let orders = OrderFlowApi::new(db.clone());
    let dispenser = DispenseApi::new(db.clone());
    let gateway = StubGateway::new();
    let payments = PaymentReconciliationApi::new(db.clone(), gateway.clone(), Secret::new(KEY_SECRET.to_string()));

    // Place the order: 60 + 3 GST = 63.
    let order = orders.place_order(order_request("user-1", &machine, &item, 1)).await.expect("Error placing order");
    assert_eq!(order.status, OrderStatusType::Pending);
    assert_eq!(order.price, Paise::from_rupees(60));
    assert_eq!(order.gst, Paise::from_rupees(3));
    assert_eq!(order.total, Paise::from_rupees(63));
    assert!(order.pickup_code.is_none());
    assert!(!order.completed);

    // A second order is blocked while the first is pending payment.
    let err = orders.place_order(order_request("user-1", &machine, &item, 1)).await.expect_err("Expected conflict");
    assert!(matches!(err, OrderFlowError::ActiveOrderExists(OrderStatusType::Pending)));

    // Pay for it through the client-confirmed channel.
    let session = payments.checkout_session(&order.order_id, "user-1").await.expect("Error creating session");
    assert_eq!(session.amount, Paise::from_rupees(63));
    gateway.script_payment("pay_001", &session.gateway_order_id, GatewayPaymentStatus::Captured);
    let signature = vendi_payment_engine::helpers::checkout_signature(KEY_SECRET, &session.gateway_order_id, "pay_001");
    let confirmation = payments
        .confirm_client_payment(&session.gateway_order_id, "pay_001", &signature)
        .await
        .expect("Error confirming payment");
    assert!(confirmation.order_advanced);
    assert!(!confirmation.duplicate);
    assert!(confirmation.payment.verified);

    let order = orders.order_for_user(&order.order_id, "user-1").await.unwrap().expect("Order disappeared");
    assert_eq!(order.status, OrderStatusType::ReadyForPickup);
    assert!(order.paid_at.is_some());
    let code = order.pickup_code.clone().expect("Ready order must carry a pickup code");
    assert!(code.len() >= 4 && code.len() <= 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));

    // The owner can retrieve the code; it still blocks new orders.
    let (_, released) = orders.pickup_code("user-1").await.expect("Error fetching pickup code");
    assert_eq!(released, code);
    let err = orders.place_order(order_request("user-1", &machine, &item, 1)).await.expect_err("Expected conflict");
    assert!(matches!(err, OrderFlowError::ActiveOrderExists(OrderStatusType::ReadyForPickup)));

    // A wrong code is rejected with the generic error.
    let wrong_code = if code == "9999" { "9998" } else { "9999" };
    let err = dispenser.start(&machine.machine_code, wrong_code).await.expect_err("Expected invalid code");
    assert!(matches!(err, OrderFlowError::InvalidPickupCode));

    // The right code starts the dispense and consumes the code.
    let started = dispenser.start(&machine.machine_code, &code).await.expect("Error starting dispense");
    assert_eq!(started.order.status, OrderStatusType::Preparing);
    assert!(started.order.pickup_code.is_none());
    assert!(started.order.preparing_at.is_some());
    assert_eq!(started.machine.current_order_id.as_ref(), Some(&order.order_id));

    // Re-presenting the consumed code is indistinguishable from a wrong code.
    let err = dispenser.start(&machine.machine_code, &code).await.expect_err("Expected invalid code");
    assert!(matches!(err, OrderFlowError::InvalidPickupCode));

    // The machine reports completion.
    let done = dispenser.dispense_complete(&order.order_id).await.expect("Error completing dispense");
    assert_eq!(done.status, OrderStatusType::Completed);
    assert!(done.completed);
    assert!(done.completed_at.is_some());
    assert!(done.pickup_code.is_none());

    // A duplicate completion report hits the now-stale state and is rejected, not double-applied.
    let err = dispenser.dispense_complete(&order.order_id).await.expect_err("Expected stale transition");
    assert!(matches!(err, OrderFlowError::StaleTransition { .. }));

    // History matches the walk and always ends on the current status.
    let history = orders.status_history(&order.order_id).await.expect("Error fetching history");
    let statuses: Vec<OrderStatusType> = history.iter().map(|h| h.status).collect();
    assert_eq!(
        statuses,
        vec![
            OrderStatusType::Pending,
            OrderStatusType::ReadyForPickup,
            OrderStatusType::Preparing,
            OrderStatusType::Completed
        ]
    );
    assert_eq!(history.last().unwrap().status, done.status);
    assert_eq!(history.first().unwrap().actor, StatusActor::User);

    // A completed order no longer blocks new orders.
    orders.place_order(order_request("user-1", &machine, &item, 2)).await.expect("Error placing follow-up order");
}

/// The order amount is computed and frozen at creation. Later catalog edits never re-price an order.
#[tokio::test]
async fn order_amounts_are_frozen_at_creation() {
    let (db, machine, item) = setup().await;
    let orders = OrderFlowApi::new(db.clone());

    let order = orders.place_order(order_request("user-7", &machine, &item, 2)).await.expect("Error placing order");
    assert_eq!(order.total, Paise::from_rupees(126));

    seed::reprice_item(&db, item.id, Paise::from_rupees(90), Paise::from_rupees(9)).await;

    let refetched = orders.order_for_user(&order.order_id, "user-7").await.unwrap().expect("Order disappeared");
    assert_eq!(refetched.price, Paise::from_rupees(120));
    assert_eq!(refetched.gst, Paise::from_rupees(6));
    assert_eq!(refetched.total, Paise::from_rupees(126));

    let lines = orders.order_items(&order.order_id).await.expect("Error fetching lines");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].unit_price, Paise::from_rupees(60));
    assert_eq!(lines[0].quantity, 2);
}

/// Cancelling the blocking order clears the way for a new one.
#[tokio::test]
async fn cancelled_orders_stop_blocking() {
    let (db, machine, item) = setup().await;
    let orders = OrderFlowApi::new(db.clone());

    let order = orders.place_order(order_request("user-2", &machine, &item, 1)).await.expect("Error placing order");
    let err = orders.place_order(order_request("user-2", &machine, &item, 1)).await.expect_err("Expected conflict");
    assert!(matches!(err, OrderFlowError::ActiveOrderExists(OrderStatusType::Pending)));

    let cancelled = orders
        .cancel_order(&order.order_id, StatusActor::Admin, "Customer changed their mind")
        .await
        .expect("Error cancelling order");
    assert_eq!(cancelled.status, OrderStatusType::Cancelled);
    assert!(cancelled.pickup_code.is_none());

    orders.place_order(order_request("user-2", &machine, &item, 1)).await.expect("Error placing new order");
}

/// Unavailable items and inactive machines are rejected before any order is created.
#[tokio::test]
async fn rejects_unavailable_items_and_inactive_machines() {
    let (db, machine, item) = setup().await;
    let orders = OrderFlowApi::new(db.clone());

    seed::set_item_available(&db, item.id, false).await;
    let err = orders.place_order(order_request("user-3", &machine, &item, 1)).await.expect_err("Expected rejection");
    assert!(matches!(err, OrderFlowError::ItemUnavailable(ref name) if name == "Veg Thali"));
    seed::set_item_available(&db, item.id, true).await;

    seed::set_machine_active(&db, machine.id, false).await;
    let err = orders.place_order(order_request("user-3", &machine, &item, 1)).await.expect_err("Expected rejection");
    assert!(matches!(err, OrderFlowError::MachineInactive(_)));

    // Nothing was created along the way.
    assert!(orders.latest_order("user-3").await.unwrap().is_none());
}

/// The background sweep cancels pending orders whose payment window has elapsed, through the same state machine.
#[tokio::test]
async fn expiry_sweep_cancels_stale_pending_orders() {
    let (db, machine, item) = setup().await;
    let orders = OrderFlowApi::new(db.clone());

    let order = orders.place_order(order_request("user-4", &machine, &item, 1)).await.expect("Error placing order");

    // Nothing expires while the window is still open.
    let expired = orders.expire_stale_orders(Duration::hours(1)).await.expect("Error running sweep");
    assert!(expired.is_empty());

    tokio::time::sleep(std::time::Duration::from_millis(2200)).await;
    let expired = orders.expire_stale_orders(Duration::seconds(1)).await.expect("Error running sweep");
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].order_id, order.order_id);
    assert_eq!(expired[0].status, OrderStatusType::Cancelled);

    let history = orders.status_history(&order.order_id).await.expect("Error fetching history");
    assert_eq!(history.last().unwrap().status, OrderStatusType::Cancelled);
    assert_eq!(history.last().unwrap().actor, StatusActor::System);

    // The user can order again.
    orders.place_order(order_request("user-4", &machine, &item, 1)).await.expect("Error placing new order");
}
