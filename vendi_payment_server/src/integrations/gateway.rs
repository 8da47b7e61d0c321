//! Adapts the checkout gateway REST client to the engine's `PaymentGatewayClient` contract.

use checkout_tools::{CheckoutApi, CheckoutApiError, CheckoutConfig};
use log::debug;
use vendi_common::Paise;
use vendi_payment_engine::{
    db_types::OrderId,
    traits::{CheckoutSession, GatewayClientError, GatewayPayment, PaymentGatewayClient},
};

#[derive(Clone)]
pub struct CheckoutGateway {
    api: CheckoutApi,
}

impl CheckoutGateway {
    pub fn new(config: CheckoutConfig) -> Result<Self, GatewayClientError> {
        let api = CheckoutApi::new(config).map_err(|e| GatewayClientError::Unreachable(e.to_string()))?;
        Ok(Self { api })
    }
}

impl PaymentGatewayClient for CheckoutGateway {
    async fn create_checkout_session(
        &self,
        amount: Paise,
        currency: &str,
        reference: &OrderId,
    ) -> Result<CheckoutSession, GatewayClientError> {
        let order = self.api.create_order(amount, currency, reference.as_str()).await.map_err(to_client_error)?;
        debug!("🛒️ Gateway session {} opened for order [{reference}]", order.id);
        Ok(CheckoutSession { gateway_order_id: order.id, amount, currency: currency.to_string() })
    }

    async fn fetch_payment(&self, gateway_payment_id: &str) -> Result<GatewayPayment, GatewayClientError> {
        let payment = self.api.fetch_payment(gateway_payment_id).await.map_err(to_client_error)?;
        let status = payment
            .status
            .parse()
            .map_err(|e| GatewayClientError::InvalidResponse(format!("{e}")))?;
        Ok(GatewayPayment {
            gateway_payment_id: payment.id,
            gateway_order_id: payment.order_id,
            status,
            method: payment.method,
            amount: Paise::from(payment.amount),
        })
    }
}

fn to_client_error(e: CheckoutApiError) -> GatewayClientError {
    match e {
        CheckoutApiError::QueryError { status, message } => GatewayClientError::RequestFailed { status, message },
        CheckoutApiError::JsonError(m) => GatewayClientError::InvalidResponse(m),
        other => GatewayClientError::Unreachable(other.to_string()),
    }
}
