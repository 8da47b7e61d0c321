//! A scriptable in-memory stand-in for the payment gateway client.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use vendi_common::Paise;

use crate::{
    db_types::OrderId,
    traits::{CheckoutSession, GatewayClientError, GatewayPayment, GatewayPaymentStatus, PaymentGatewayClient},
};

/// Hands out deterministic session references and serves payment lookups from a table the test scripts in advance.
#[derive(Clone, Default)]
pub struct StubGateway {
    inner: Arc<Mutex<StubGatewayState>>,
}

#[derive(Default)]
struct StubGatewayState {
    session_count: u64,
    payments: HashMap<String, GatewayPayment>,
    unreachable: bool,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the authoritative status the gateway will report for `gateway_payment_id`.
    pub fn script_payment(&self, gateway_payment_id: &str, gateway_order_id: &str, status: GatewayPaymentStatus) {
        let payment = GatewayPayment {
            gateway_payment_id: gateway_payment_id.to_string(),
            gateway_order_id: gateway_order_id.to_string(),
            status,
            method: Some("upi".to_string()),
            amount: Paise::default(),
        };
        self.inner.lock().unwrap().payments.insert(gateway_payment_id.to_string(), payment);
    }

    /// Makes every subsequent call fail as if the gateway were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.lock().unwrap().unreachable = unreachable;
    }
}

impl PaymentGatewayClient for StubGateway {
    async fn create_checkout_session(
        &self,
        amount: Paise,
        currency: &str,
        reference: &OrderId,
    ) -> Result<CheckoutSession, GatewayClientError> {
        let mut state = self.inner.lock().unwrap();
        if state.unreachable {
            return Err(GatewayClientError::Unreachable("stub gateway is down".to_string()));
        }
        state.session_count += 1;
        let gateway_order_id = format!("gwo_{}_{}", state.session_count, reference.as_str());
        Ok(CheckoutSession { gateway_order_id, amount, currency: currency.to_string() })
    }

    async fn fetch_payment(&self, gateway_payment_id: &str) -> Result<GatewayPayment, GatewayClientError> {
        let state = self.inner.lock().unwrap();
        if state.unreachable {
            return Err(GatewayClientError::Unreachable("stub gateway is down".to_string()));
        }
        state
            .payments
            .get(gateway_payment_id)
            .cloned()
            .ok_or_else(|| GatewayClientError::RequestFailed { status: 404, message: "payment not found".to_string() })
    }
}
