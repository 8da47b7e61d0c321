use actix_web::{http::StatusCode, web, web::ServiceConfig};
use serde_json::json;
use vendi_common::Secret;
use vendi_payment_engine::{
    db_types::{MachineStatusType, OrderId, OrderStatusType},
    traits::{DispenseStart, OrderFlowError},
    DispenseApi,
};

use super::{
    helpers::{post_request, test_machine, test_order},
    mocks::MockOrderFlowDb,
};
use crate::{
    config::MACHINE_KEY_HEADER,
    middleware::MachineKeyMiddlewareFactory,
    routes::{DispenseCompleteRoute, MachineStartRoute},
};

const MACHINE_KEY: &str = "machine-key-123";

fn start_body() -> serde_json::Value {
    json!({ "machine_code": "VM-001", "pickup_code": "4821" })
}

#[actix_web::test]
async fn machine_start_without_key() {
    let _ = env_logger::try_init().ok();
    let (status, _) = post_request("/machine/start", start_body(), &[], configure_started).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn machine_start_with_wrong_key() {
    let _ = env_logger::try_init().ok();
    let (status, _) =
        post_request("/machine/start", start_body(), &[(MACHINE_KEY_HEADER, "machine-key-999")], configure_started)
            .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn machine_start_success() {
    let _ = env_logger::try_init().ok();
    let (status, body) =
        post_request("/machine/start", start_body(), &[(MACHINE_KEY_HEADER, MACHINE_KEY)], configure_started).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        r#"{"order":{"order_id":"a1b2c3d4e5f60718","status":"Preparing"},"machine":{"machine_code":"VM-001","status":"Dispensing"}}"#
    );
}

/// Wrong code, consumed code and wrong machine all surface as the same generic 400.
#[actix_web::test]
async fn machine_start_invalid_code_is_generic() {
    let _ = env_logger::try_init().ok();
    let configure = |cfg: &mut ServiceConfig| {
        let mut db = MockOrderFlowDb::new();
        db.expect_fetch_machine().returning(|_| Ok(Some(test_machine())));
        db.expect_start_dispense().returning(|_, _| Err(OrderFlowError::InvalidPickupCode));
        install(cfg, db);
    };
    let (status, body) =
        post_request("/machine/start", start_body(), &[(MACHINE_KEY_HEADER, MACHINE_KEY)], configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Invalid OTP or order not ready for pickup"}"#);
}

#[actix_web::test]
async fn machine_start_on_disabled_machine() {
    let _ = env_logger::try_init().ok();
    let configure = |cfg: &mut ServiceConfig| {
        let mut db = MockOrderFlowDb::new();
        db.expect_fetch_machine().returning(|_| {
            let mut machine = test_machine();
            machine.is_active = false;
            Ok(Some(machine))
        });
        install(cfg, db);
    };
    let (status, _) =
        post_request("/machine/start", start_body(), &[(MACHINE_KEY_HEADER, MACHINE_KEY)], configure).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

/// The second of two duplicate completion reports is a conflict, not a second application.
#[actix_web::test]
async fn dispense_complete_duplicate_report() {
    let _ = env_logger::try_init().ok();
    let configure = |cfg: &mut ServiceConfig| {
        let mut db = MockOrderFlowDb::new();
        db.expect_complete_dispense().returning(|oid| {
            Err(OrderFlowError::StaleTransition { order_id: oid.clone(), target: OrderStatusType::Completed })
        });
        install(cfg, db);
    };
    let (status, _) = post_request(
        "/machine/dispense-complete/a1b2c3d4e5f60718",
        json!({}),
        &[(MACHINE_KEY_HEADER, MACHINE_KEY)],
        configure,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

fn configure_started(cfg: &mut ServiceConfig) {
    let mut db = MockOrderFlowDb::new();
    db.expect_fetch_machine().returning(|_| Ok(Some(test_machine())));
    db.expect_start_dispense().returning(|machine, _| {
        let mut order = test_order(OrderStatusType::Preparing);
        order.pickup_code = None;
        let mut machine = machine.clone();
        machine.status = MachineStatusType::Dispensing;
        machine.current_order_id = Some(OrderId("a1b2c3d4e5f60718".into()));
        Ok(DispenseStart { order, machine })
    });
    install(cfg, db);
}

fn install(cfg: &mut ServiceConfig, db: MockOrderFlowDb) {
    let api = DispenseApi::new(db);
    cfg.service(
        web::scope("/machine")
            .wrap(MachineKeyMiddlewareFactory::new(MACHINE_KEY_HEADER, Secret::new(MACHINE_KEY.to_string())))
            .service(MachineStartRoute::<MockOrderFlowDb>::new())
            .service(DispenseCompleteRoute::<MockOrderFlowDb>::new()),
    )
    .app_data(web::Data::new(api));
}
