//! Machine dispense coordination: code consumption under concurrency and double-call safety.

use vendi_payment_engine::{
    db_types::{Item, Machine, OrderStatusType, StatusActor},
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        seed,
    },
    traits::{NewOrderRequest, OrderFlowDatabase, OrderFlowError, OrderLineRequest},
    DispenseApi,
    OrderFlowApi,
    SqliteDatabase,
};

async fn setup() -> (SqliteDatabase, Machine, Item) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let machine = seed::seed_machine(&db, "VM-020").await;
    let item = seed::seed_item(&db, "Filter Coffee", 25, 1).await;
    (db, machine, item)
}

/// Places an order and drives it straight to `ReadyForPickup`, returning the minted pickup code.
async fn ready_order(db: &SqliteDatabase, machine: &Machine, item: &Item, user_id: &str) -> (String, String) {
    let orders = OrderFlowApi::new(db.clone());
    let order = orders
        .place_order(NewOrderRequest {
            user_id: user_id.to_string(),
            machine_code: machine.machine_code.clone(),
            items: vec![OrderLineRequest { item_id: item.id, quantity: 1 }],
        })
        .await
        .expect("Error placing order");
    let ready = db
        .transition_order(&order.order_id, OrderStatusType::ReadyForPickup, StatusActor::Gateway, "Payment verified")
        .await
        .expect("Error readying order");
    (ready.order_id.0, ready.pickup_code.expect("Ready order must carry a code"))
}

/// Two simultaneous `start` calls with the same valid code: exactly one `Preparing` transition, the other call gets
/// the generic invalid-code rejection.
#[tokio::test]
async fn concurrent_starts_dispense_once() {
    let (db, machine, item) = setup().await;
    let (order_id, code) = ready_order(&db, &machine, &item, "user-20").await;
    let dispenser_a = DispenseApi::new(db.clone());
    let dispenser_b = DispenseApi::new(db.clone());

    let (a, b) = tokio::join!(
        dispenser_a.start(&machine.machine_code, &code),
        dispenser_b.start(&machine.machine_code, &code),
    );
    let outcomes = [a, b];
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "Exactly one start call may win");
    for outcome in &outcomes {
        match outcome {
            Ok(started) => {
                assert_eq!(started.order.status, OrderStatusType::Preparing);
                assert!(started.order.pickup_code.is_none());
            },
            Err(e) => assert!(matches!(e, OrderFlowError::InvalidPickupCode)),
        }
    }

    let orders = OrderFlowApi::new(db.clone());
    let history =
        orders.status_history(&vendi_payment_engine::db_types::OrderId(order_id)).await.expect("Error fetching history");
    assert_eq!(history.iter().filter(|e| e.status == OrderStatusType::Preparing).count(), 1);
}

/// Codes are machine-scoped: the right code at the wrong machine is indistinguishable from a wrong code.
#[tokio::test]
async fn code_on_wrong_machine_is_generic_invalid() {
    let (db, machine, item) = setup().await;
    let other = seed::seed_machine(&db, "VM-021").await;
    let (_, code) = ready_order(&db, &machine, &item, "user-21").await;
    let dispenser = DispenseApi::new(db.clone());

    let err = dispenser.start(&other.machine_code, &code).await.expect_err("Expected invalid code");
    assert!(matches!(err, OrderFlowError::InvalidPickupCode));

    // The order is untouched and the code still works at the right machine.
    let started = dispenser.start(&machine.machine_code, &code).await.expect("Error starting dispense");
    assert_eq!(started.order.status, OrderStatusType::Preparing);
}

/// Machines that are unknown or disabled are told so before any code is looked at.
#[tokio::test]
async fn machine_identity_is_checked_first() {
    let (db, machine, item) = setup().await;
    let (_, code) = ready_order(&db, &machine, &item, "user-22").await;
    let dispenser = DispenseApi::new(db.clone());

    let err = dispenser
        .start(&vendi_payment_engine::db_types::MachineCode::from("VM-404"), &code)
        .await
        .expect_err("Expected unknown machine");
    assert!(matches!(err, OrderFlowError::MachineNotFound(_)));

    seed::set_machine_active(&db, machine.id, false).await;
    let err = dispenser.start(&machine.machine_code, &code).await.expect_err("Expected inactive machine");
    assert!(matches!(err, OrderFlowError::MachineInactive(_)));
}

/// The machine status mirrors the dispense: `Dispensing` with the current order while preparing, back to `Idle`
/// after completion. A duplicate completion is rejected as stale.
#[tokio::test]
async fn machine_status_follows_the_dispense() {
    let (db, machine, item) = setup().await;
    let (order_id, code) = ready_order(&db, &machine, &item, "user-23").await;
    let dispenser = DispenseApi::new(db.clone());
    let order_id = vendi_payment_engine::db_types::OrderId(order_id);

    let started = dispenser.start(&machine.machine_code, &code).await.expect("Error starting dispense");
    assert_eq!(started.machine.status, vendi_payment_engine::db_types::MachineStatusType::Dispensing);
    assert_eq!(started.machine.current_order_id.as_ref(), Some(&order_id));

    let done = dispenser.dispense_complete(&order_id).await.expect("Error completing dispense");
    assert!(done.completed);

    let refreshed = db.fetch_machine(&machine.machine_code).await.unwrap().expect("Machine disappeared");
    assert_eq!(refreshed.status, vendi_payment_engine::db_types::MachineStatusType::Idle);
    assert!(refreshed.current_order_id.is_none());

    let err = dispenser.dispense_complete(&order_id).await.expect_err("Expected stale transition");
    assert!(matches!(err, OrderFlowError::StaleTransition { .. }));
}
