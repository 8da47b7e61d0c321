use actix_web::{http::StatusCode, web, web::ServiceConfig};
use serde_json::json;
use vendi_payment_engine::{db_types::OrderStatusType, OrderFlowApi};

use super::{
    helpers::{get_request, post_request, test_item, test_machine, test_order},
    mocks::MockOrderFlowDb,
};
use crate::{
    config::USER_ID_HEADER,
    routes::{CreateOrderRoute, PickupCodeRoute},
};

fn order_body() -> serde_json::Value {
    json!({ "machine_code": "VM-001", "items": [{ "item_id": 7, "quantity": 1 }] })
}

#[actix_web::test]
async fn create_order_without_user_header() {
    let _ = env_logger::try_init().ok();
    let (status, body) = post_request("/orders", order_body(), &[], configure_happy).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"No authenticated user on this request"}"#);
}

#[actix_web::test]
async fn create_order_success() {
    let _ = env_logger::try_init().ok();
    let (status, body) =
        post_request("/orders", order_body(), &[(USER_ID_HEADER, "user-1")], configure_happy).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, r#"{"order_id":"a1b2c3d4e5f60718","total_amount":6300,"status":"Pending"}"#);
}

#[actix_web::test]
async fn create_order_blocked_by_pending_order() {
    let _ = env_logger::try_init().ok();
    let configure = |cfg: &mut ServiceConfig| {
        let mut db = MockOrderFlowDb::new();
        db.expect_fetch_machine().returning(|_| Ok(Some(test_machine())));
        db.expect_fetch_blocking_order_for_user()
            .returning(|_| Ok(Some(test_order(OrderStatusType::Pending))));
        install(cfg, db);
    };
    let (status, body) = post_request("/orders", order_body(), &[(USER_ID_HEADER, "user-1")], configure).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body,
        r#"{"error":"You have a pending payment. Please complete payment or cancel the order first."}"#
    );
}

#[actix_web::test]
async fn create_order_with_unavailable_item() {
    let _ = env_logger::try_init().ok();
    let configure = |cfg: &mut ServiceConfig| {
        let mut db = MockOrderFlowDb::new();
        db.expect_fetch_machine().returning(|_| Ok(Some(test_machine())));
        db.expect_fetch_blocking_order_for_user().returning(|_| Ok(None));
        db.expect_fetch_item().returning(|_| {
            let mut item = test_item();
            item.is_available = false;
            Ok(Some(item))
        });
        install(cfg, db);
    };
    let (status, body) = post_request("/orders", order_body(), &[(USER_ID_HEADER, "user-1")], configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Item \"Veg Thali\" is currently unavailable"}"#);
}

#[actix_web::test]
async fn create_order_on_unknown_machine() {
    let _ = env_logger::try_init().ok();
    let configure = |cfg: &mut ServiceConfig| {
        let mut db = MockOrderFlowDb::new();
        db.expect_fetch_machine().returning(|_| Ok(None));
        install(cfg, db);
    };
    let (status, _) = post_request("/orders", order_body(), &[(USER_ID_HEADER, "user-1")], configure).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// The pickup code is released only while the order is awaiting pickup.
#[actix_web::test]
async fn pickup_code_for_ready_order() {
    let _ = env_logger::try_init().ok();
    let configure = |cfg: &mut ServiceConfig| {
        let mut db = MockOrderFlowDb::new();
        db.expect_fetch_latest_order_for_user()
            .returning(|_| Ok(Some(test_order(OrderStatusType::ReadyForPickup))));
        install(cfg, db);
    };
    let (status, body) = get_request("/orders/pickup-code", &[(USER_ID_HEADER, "user-1")], configure).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"order_id":"a1b2c3d4e5f60718","pickup_code":"4821"}"#);
}

#[actix_web::test]
async fn pickup_code_while_payment_pending() {
    let _ = env_logger::try_init().ok();
    let configure = |cfg: &mut ServiceConfig| {
        let mut db = MockOrderFlowDb::new();
        db.expect_fetch_latest_order_for_user().returning(|_| Ok(Some(test_order(OrderStatusType::Pending))));
        install(cfg, db);
    };
    let (status, body) = get_request("/orders/pickup-code", &[(USER_ID_HEADER, "user-1")], configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Payment is pending"}"#);
}

fn configure_happy(cfg: &mut ServiceConfig) {
    let mut db = MockOrderFlowDb::new();
    db.expect_fetch_machine().returning(|_| Ok(Some(test_machine())));
    db.expect_fetch_blocking_order_for_user().returning(|_| Ok(None));
    db.expect_fetch_item().returning(|_| Ok(Some(test_item())));
    db.expect_insert_order().returning(|_, _| Ok(test_order(OrderStatusType::Pending)));
    install(cfg, db);
}

fn install(cfg: &mut ServiceConfig, db: MockOrderFlowDb) {
    let api = OrderFlowApi::new(db);
    cfg.service(CreateOrderRoute::<MockOrderFlowDb>::new())
        .service(PickupCodeRoute::<MockOrderFlowDb>::new())
        .app_data(web::Data::new(api));
}
