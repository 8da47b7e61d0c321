use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use vendi_common::Paise;

use crate::{config::CheckoutConfig, CheckoutApiError, CheckoutOrder, CheckoutPayment};

#[derive(Clone)]
pub struct CheckoutApi {
    config: CheckoutConfig,
    client: Arc<Client>,
}

impl CheckoutApi {
    pub fn new(config: CheckoutConfig) -> Result<Self, CheckoutApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| CheckoutApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> Result<T, CheckoutApiError> {
        let url = self.url(path);
        trace!("Sending REST query: {url}");
        let mut req = self
            .client
            .request(method, url)
            .basic_auth(&self.config.key_id, Some(self.config.key_secret.reveal()));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| CheckoutApiError::RestResponseError(e.to_string()))?;
        if response.status().is_success() {
            trace!("REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| CheckoutApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| CheckoutApiError::RestResponseError(e.to_string()))?;
            Err(CheckoutApiError::QueryError { status, message })
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/v1{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Creates a checkout order at the gateway. `receipt` is our own order id, which the gateway echoes back in
    /// webhook payloads.
    pub async fn create_order(
        &self,
        amount: Paise,
        currency: &str,
        receipt: &str,
    ) -> Result<CheckoutOrder, CheckoutApiError> {
        let body = json!({
            "amount": amount.value(),
            "currency": currency,
            "receipt": receipt,
        });
        debug!("Creating checkout order for receipt {receipt}");
        let order = self.rest_query::<CheckoutOrder, _>(Method::POST, "/orders", Some(body)).await?;
        info!("Checkout order {} created for receipt {receipt}", order.id);
        Ok(order)
    }

    /// Fetches the authoritative state of a payment attempt.
    pub async fn fetch_payment(&self, payment_id: &str) -> Result<CheckoutPayment, CheckoutApiError> {
        let path = format!("/payments/{payment_id}");
        debug!("Fetching payment {payment_id}");
        let payment = self.rest_query::<CheckoutPayment, ()>(Method::GET, &path, None).await?;
        Ok(payment)
    }
}
