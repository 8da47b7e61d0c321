use serde::{Deserialize, Serialize};

/// A checkout order as the gateway reports it. Amounts are in the currency's minor unit (paise for INR).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    /// Our order id, echoed back by the gateway.
    pub receipt: Option<String>,
}

/// A payment attempt as the gateway reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutPayment {
    pub id: String,
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    /// One of "created", "authorized", "captured", "failed", "refunded".
    pub status: String,
    pub method: Option<String>,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
}
