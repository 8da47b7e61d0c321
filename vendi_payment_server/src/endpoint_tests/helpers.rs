use actix_web::{dev::Service, http::StatusCode, test, test::TestRequest, web::ServiceConfig, App};
use chrono::{TimeZone, Utc};
use vendi_common::Paise;
use vendi_payment_engine::db_types::{
    Item,
    Machine,
    MachineCode,
    MachineStatusType,
    Order,
    OrderId,
    OrderStatusType,
    Payment,
    PaymentSource,
    PaymentStatusType,
};

/// Drives a request through a test app built from `configure`. Handler and extractor failures arrive as regular
/// error responses; middleware rejections surface as service errors, which are mapped back to their status and
/// message so tests can assert on both paths uniformly.
async fn send_request<F>(req: TestRequest, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let app = test::init_service(App::new().configure(configure)).await;
    match app.call(req.to_request()).await {
        Ok(resp) => {
            let status = resp.status();
            let body = String::from_utf8_lossy(&test::read_body(resp).await).to_string();
            (status, body)
        },
        Err(e) => (e.as_response_error().status_code(), e.to_string()),
    }
}

pub async fn get_request<F>(uri: &str, headers: &[(&str, &str)], configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let mut req = TestRequest::get().uri(uri);
    for (name, value) in headers {
        req = req.insert_header((*name, *value));
    }
    send_request(req, configure).await
}

pub async fn post_request<F>(
    uri: &str,
    body: serde_json::Value,
    headers: &[(&str, &str)],
    configure: F,
) -> (StatusCode, String)
where
    F: FnOnce(&mut ServiceConfig),
{
    let mut req = TestRequest::post().uri(uri).set_json(&body);
    for (name, value) in headers {
        req = req.insert_header((*name, *value));
    }
    send_request(req, configure).await
}

/// Posts a raw (pre-serialized) body, as a payment gateway webhook would.
pub async fn post_raw<F>(
    uri: &str,
    body: &'static [u8],
    headers: &[(&str, &str)],
    configure: F,
) -> (StatusCode, String)
where
    F: FnOnce(&mut ServiceConfig),
{
    let mut req = TestRequest::post().uri(uri).set_payload(body);
    for (name, value) in headers {
        req = req.insert_header((*name, *value));
    }
    send_request(req, configure).await
}

pub fn test_machine() -> Machine {
    Machine {
        id: 1,
        machine_code: MachineCode::from("VM-001"),
        name: "Canteen block A".to_string(),
        location: "Building 4".to_string(),
        is_active: true,
        status: MachineStatusType::Idle,
        current_order_id: None,
        last_order_at: None,
        created_at: Utc.with_ymd_and_hms(2024, 2, 29, 13, 30, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2024, 2, 29, 13, 30, 0).unwrap(),
    }
}

pub fn test_item() -> Item {
    Item {
        id: 7,
        name: "Veg Thali".to_string(),
        price: Paise::from_rupees(60),
        gst: Paise::from_rupees(3),
        is_available: true,
        created_at: Utc.with_ymd_and_hms(2024, 2, 29, 13, 30, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2024, 2, 29, 13, 30, 0).unwrap(),
    }
}

pub fn test_order(status: OrderStatusType) -> Order {
    let pickup_code =
        if status == OrderStatusType::ReadyForPickup { Some("4821".to_string()) } else { None };
    Order {
        id: 1,
        order_id: OrderId("a1b2c3d4e5f60718".into()),
        user_id: "user-1".to_string(),
        machine_id: 1,
        price: Paise::from_rupees(60),
        gst: Paise::from_rupees(3),
        total: Paise::from_rupees(63),
        status,
        pickup_code,
        completed: status == OrderStatusType::Completed,
        created_at: Utc.with_ymd_and_hms(2024, 3, 15, 18, 30, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2024, 3, 15, 18, 30, 0).unwrap(),
        paid_at: None,
        preparing_at: None,
        completed_at: None,
    }
}

pub fn test_payment(verified: bool) -> Payment {
    Payment {
        id: 11,
        order_id: OrderId("a1b2c3d4e5f60718".into()),
        gateway_order_id: "gwo_123".to_string(),
        gateway_payment_id: Some("pay_123".to_string()),
        amount: Paise::from_rupees(63),
        currency: "INR".to_string(),
        status: if verified { PaymentStatusType::Success } else { PaymentStatusType::Pending },
        verified,
        source: PaymentSource::Webhook,
        method: Some("upi".to_string()),
        created_at: Utc.with_ymd_and_hms(2024, 3, 15, 18, 31, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2024, 3, 15, 18, 31, 0).unwrap(),
    }
}
