use std::fmt::Display;

use serde::{Deserialize, Serialize};
use vendi_common::Paise;
use vendi_payment_engine::db_types::{MachineCode, MachineStatusType, Order, OrderId, OrderStatusType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

//----------------------------------------------   Orders   ----------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub machine_code: MachineCode,
    pub items: Vec<OrderLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub item_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderCreatedResponse {
    pub order_id: OrderId,
    pub total_amount: Paise,
    pub status: OrderStatusType,
}

impl From<Order> for OrderCreatedResponse {
    fn from(order: Order) -> Self {
        Self { order_id: order.order_id, total_amount: order.total, status: order.status }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PickupCodeResponse {
    pub order_id: OrderId,
    pub pickup_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderCompletedResponse {
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrderParams {
    pub reason: String,
}

//----------------------------------------------   Payments   --------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSessionRequest {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyPaymentRequest {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyPaymentResponse {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_status: Option<OrderStatusType>,
}

//----------------------------------------------   Machines   --------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineStartRequest {
    pub machine_code: MachineCode,
    pub pickup_code: String,
}

/// The minimal view a machine's display needs.
#[derive(Debug, Clone, Serialize)]
pub struct MachineStartResponse {
    pub order: StartedOrder,
    pub machine: StartedMachine,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartedOrder {
    pub order_id: OrderId,
    pub status: OrderStatusType,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartedMachine {
    pub machine_code: MachineCode,
    pub status: MachineStatusType,
}

//----------------------------------------------   Webhook   ---------------------------------------------------------

/// The gateway's webhook envelope. Only the fields the reconciliation flow needs are modelled; everything else in
/// the vendor payload is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentWebhookEvent {
    pub event: String,
    pub payload: WebhookPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub payment: WebhookPaymentWrapper,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPaymentWrapper {
    pub entity: WebhookPaymentEntity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPaymentEntity {
    /// The gateway payment reference.
    pub id: String,
    /// The gateway order (checkout session) reference.
    pub order_id: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}
