use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use vendi_common::Paise;

use crate::db_types::{ConversionError, MachineCode, Machine, Order, Payment, PaymentSource};

//--------------------------------------   NewOrderRequest     -------------------------------------------------------
/// An order as requested by an (already authenticated) user. Prices are looked up from the catalog by the engine;
/// the client never supplies amounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub user_id: String,
    pub machine_code: MachineCode,
    pub items: Vec<OrderLineRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub item_id: i64,
    pub quantity: i64,
}

//--------------------------------------    DispenseStart      -------------------------------------------------------
/// The result of a successful pickup-code scan: the order now being prepared, and the machine as updated.
#[derive(Debug, Clone, Serialize)]
pub struct DispenseStart {
    pub order: Order,
    pub machine: Machine,
}

//-------------------------------------- PaymentConfirmation   -------------------------------------------------------
/// The outcome of applying an authenticated payment-success event.
///
/// `duplicate` is set when the gateway payment reference had already been verified (webhook redelivery); nothing was
/// written. `order_advanced` is unset when the payment was recorded but the order had already moved past `Pending`
/// (a harmless race between the two confirmation channels).
#[derive(Debug, Clone, Serialize)]
pub struct PaymentConfirmation {
    pub payment: Payment,
    pub order: Order,
    pub order_advanced: bool,
    pub duplicate: bool,
}

//--------------------------------------   CheckoutSession     -------------------------------------------------------
/// A checkout session created at the payment gateway for a specific order.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub gateway_order_id: String,
    pub amount: Paise,
    pub currency: String,
}

//-------------------------------------- GatewayPaymentStatus  -------------------------------------------------------
/// The gateway's own view of a payment attempt. Only `Authorized` and `Captured` count as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayPaymentStatus {
    Created,
    Authorized,
    Captured,
    Failed,
    Refunded,
}

impl GatewayPaymentStatus {
    pub fn is_success(self) -> bool {
        matches!(self, GatewayPaymentStatus::Authorized | GatewayPaymentStatus::Captured)
    }
}

impl Display for GatewayPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayPaymentStatus::Created => write!(f, "created"),
            GatewayPaymentStatus::Authorized => write!(f, "authorized"),
            GatewayPaymentStatus::Captured => write!(f, "captured"),
            GatewayPaymentStatus::Failed => write!(f, "failed"),
            GatewayPaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

impl FromStr for GatewayPaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "created" => Ok(Self::Created),
            "authorized" => Ok(Self::Authorized),
            "captured" => Ok(Self::Captured),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid gateway payment status: {s}"))),
        }
    }
}

//--------------------------------------    GatewayPayment     -------------------------------------------------------
/// A payment as reported by the gateway's authoritative fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub gateway_payment_id: String,
    pub gateway_order_id: String,
    pub status: GatewayPaymentStatus,
    pub method: Option<String>,
    pub amount: Paise,
}

//-------------------------------------- VerifiedPaymentNotice -------------------------------------------------------
/// An authenticated payment-success event, ready to be applied to storage. Authenticity has already been established
/// by the caller; this type never crosses the trust boundary unverified.
#[derive(Debug, Clone)]
pub struct VerifiedPaymentNotice {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub source: PaymentSource,
    pub method: Option<String>,
}

//--------------------------------------  FailedPaymentNotice  -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct FailedPaymentNotice {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub source: PaymentSource,
    pub reason: String,
}
