//! A thin REST client for the checkout payment gateway.
//!
//! The engine does not depend on this crate; it sees the gateway through the `PaymentGatewayClient` trait. This
//! crate carries only the minimal contract the platform needs: create a checkout order for an amount, and fetch the
//! authoritative state of a payment attempt. Everything else the vendor offers is deliberately not wrapped.

mod api;
mod config;
mod data_objects;
mod error;

pub use api::CheckoutApi;
pub use config::CheckoutConfig;
pub use data_objects::{CheckoutOrder, CheckoutPayment};
pub use error::CheckoutApiError;
