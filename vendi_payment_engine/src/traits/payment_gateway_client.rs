use thiserror::Error;
use vendi_common::Paise;

use crate::{
    db_types::OrderId,
    traits::{CheckoutSession, GatewayPayment},
};

/// The narrow contract the engine needs from the payment gateway vendor. The concrete REST client lives outside the
/// engine; tests substitute a stub.
///
/// The engine never retries these calls. Communication failures surface to the caller, whose own retry policy
/// applies — silent internal retries could double-charge.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayClient {
    /// Creates a checkout session at the gateway for the given amount, tagged with our order id.
    async fn create_checkout_session(
        &self,
        amount: Paise,
        currency: &str,
        reference: &OrderId,
    ) -> Result<CheckoutSession, GatewayClientError>;

    /// Fetches the gateway's authoritative view of a payment attempt.
    async fn fetch_payment(&self, gateway_payment_id: &str) -> Result<GatewayPayment, GatewayClientError>;
}

#[derive(Debug, Clone, Error)]
pub enum GatewayClientError {
    #[error("The payment gateway could not be reached: {0}")]
    Unreachable(String),
    #[error("The payment gateway returned an unusable response: {0}")]
    InvalidResponse(String),
    #[error("The payment gateway rejected the request. Status {status}: {message}")]
    RequestFailed { status: u16, message: String },
}
