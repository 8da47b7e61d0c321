use actix_web::{http::StatusCode, web, web::ServiceConfig};
use serde_json::json;
use vendi_common::{Paise, Secret};
use vendi_payment_engine::{
    db_types::OrderStatusType,
    helpers::{checkout_signature, hmac_sha256_hex},
    traits::{GatewayPayment, GatewayPaymentStatus, PaymentConfirmation},
    PaymentReconciliationApi,
};

use super::{
    helpers::{post_raw, post_request, test_order, test_payment},
    mocks::{MockGatewayClient, MockPaymentDb},
};
use crate::{
    config::{USER_ID_HEADER, WEBHOOK_SIGNATURE_HEADER},
    middleware::HmacMiddlewareFactory,
    routes::VerifyPaymentRoute,
    webhook_routes::PaymentWebhookRoute,
};

const KEY_SECRET: &str = "test_gateway_key_secret";
const WEBHOOK_SECRET: &str = "test_webhook_secret";
const WEBHOOK_BODY: &[u8] =
    br#"{"event":"payment.captured","payload":{"payment":{"entity":{"id":"pay_123","order_id":"gwo_123","method":"upi"}}}}"#;

//----------------------------------------------   Client verify  ----------------------------------------------------

/// A tampered signature yields `verified: false` and touches neither the database nor the gateway — the mocks carry
/// no expectations, so any call would panic the test.
#[actix_web::test]
async fn verify_with_tampered_signature_touches_nothing() {
    let _ = env_logger::try_init().ok();
    let configure = |cfg: &mut ServiceConfig| {
        install_verify(cfg, MockPaymentDb::new(), MockGatewayClient::new());
    };
    let body = json!({
        "gateway_order_id": "gwo_123",
        "gateway_payment_id": "pay_123",
        "signature": "deadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef"
    });
    let (status, body) = post_request("/payments/verify", body, &[(USER_ID_HEADER, "user-1")], configure).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"verified":false}"#);
}

#[actix_web::test]
async fn verify_success_reports_order_status() {
    let _ = env_logger::try_init().ok();
    let configure = |cfg: &mut ServiceConfig| {
        let mut gateway = MockGatewayClient::new();
        gateway.expect_fetch_payment().returning(|id| {
            Ok(GatewayPayment {
                gateway_payment_id: id.to_string(),
                gateway_order_id: "gwo_123".to_string(),
                status: GatewayPaymentStatus::Captured,
                method: Some("upi".to_string()),
                amount: Paise::from_rupees(63),
            })
        });
        let mut db = MockPaymentDb::new();
        db.expect_record_verified_payment().returning(|_| {
            Ok(PaymentConfirmation {
                payment: test_payment(true),
                order: test_order(OrderStatusType::ReadyForPickup),
                order_advanced: true,
                duplicate: false,
            })
        });
        install_verify(cfg, db, gateway);
    };
    let signature = checkout_signature(KEY_SECRET, "gwo_123", "pay_123");
    let body = json!({
        "gateway_order_id": "gwo_123",
        "gateway_payment_id": "pay_123",
        "signature": signature
    });
    let (status, body) = post_request("/payments/verify", body, &[(USER_ID_HEADER, "user-1")], configure).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"verified":true,"order_status":"ReadyForPickup"}"#);
}

/// A valid signature for a payment the gateway reports as failed records the failure but answers `verified: false`.
#[actix_web::test]
async fn verify_with_uncaptured_payment() {
    let _ = env_logger::try_init().ok();
    let configure = |cfg: &mut ServiceConfig| {
        let mut gateway = MockGatewayClient::new();
        gateway.expect_fetch_payment().returning(|id| {
            Ok(GatewayPayment {
                gateway_payment_id: id.to_string(),
                gateway_order_id: "gwo_123".to_string(),
                status: GatewayPaymentStatus::Failed,
                method: None,
                amount: Paise::from_rupees(63),
            })
        });
        let mut db = MockPaymentDb::new();
        db.expect_record_failed_payment().returning(|_| Ok(None));
        install_verify(cfg, db, gateway);
    };
    let signature = checkout_signature(KEY_SECRET, "gwo_123", "pay_123");
    let body = json!({
        "gateway_order_id": "gwo_123",
        "gateway_payment_id": "pay_123",
        "signature": signature
    });
    let (status, body) = post_request("/payments/verify", body, &[(USER_ID_HEADER, "user-1")], configure).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"verified":false}"#);
}

//----------------------------------------------   Webhook  ----------------------------------------------------------

/// A webhook with a bad signature is rejected with 400 before the body is parsed or anything is written.
#[actix_web::test]
async fn webhook_with_bad_signature_is_rejected() {
    let _ = env_logger::try_init().ok();
    let configure = |cfg: &mut ServiceConfig| {
        install_webhook(cfg, MockPaymentDb::new());
    };
    let bad_signature = hmac_sha256_hex("wrong_secret", WEBHOOK_BODY);
    let (status, _) = post_raw(
        "/webhooks/payment",
        WEBHOOK_BODY,
        &[(WEBHOOK_SIGNATURE_HEADER, bad_signature.as_str())],
        configure,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn webhook_without_signature_is_rejected() {
    let _ = env_logger::try_init().ok();
    let configure = |cfg: &mut ServiceConfig| {
        install_webhook(cfg, MockPaymentDb::new());
    };
    let (status, _) = post_raw("/webhooks/payment", WEBHOOK_BODY, &[], configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// An authenticated redelivery is acknowledged with 200 and applied as a no-op.
#[actix_web::test]
async fn webhook_duplicate_delivery_is_acknowledged() {
    let _ = env_logger::try_init().ok();
    let configure = |cfg: &mut ServiceConfig| {
        let mut db = MockPaymentDb::new();
        db.expect_record_verified_payment().returning(|_| {
            Ok(PaymentConfirmation {
                payment: test_payment(true),
                order: test_order(OrderStatusType::ReadyForPickup),
                order_advanced: false,
                duplicate: true,
            })
        });
        install_webhook(cfg, db);
    };
    let signature = hmac_sha256_hex(WEBHOOK_SECRET, WEBHOOK_BODY);
    let (status, body) = post_raw(
        "/webhooks/payment",
        WEBHOOK_BODY,
        &[(WEBHOOK_SIGNATURE_HEADER, signature.as_str())],
        configure,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"success":true,"message":"Already processed"}"#);
}

fn install_verify(cfg: &mut ServiceConfig, db: MockPaymentDb, gateway: MockGatewayClient) {
    let api = PaymentReconciliationApi::new(db, gateway, Secret::new(KEY_SECRET.to_string()));
    cfg.service(VerifyPaymentRoute::<MockPaymentDb, MockGatewayClient>::new()).app_data(web::Data::new(api));
}

fn install_webhook(cfg: &mut ServiceConfig, db: MockPaymentDb) {
    let api = PaymentReconciliationApi::new(db, MockGatewayClient::new(), Secret::new(KEY_SECRET.to_string()));
    cfg.service(
        web::scope("/webhooks")
            .wrap(HmacMiddlewareFactory::new(
                WEBHOOK_SIGNATURE_HEADER,
                Secret::new(WEBHOOK_SECRET.to_string()),
                true,
            ))
            .service(PaymentWebhookRoute::<MockPaymentDb, MockGatewayClient>::new()),
    )
    .app_data(web::Data::new(api));
}
