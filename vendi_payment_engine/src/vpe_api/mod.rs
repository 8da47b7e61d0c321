//! The engine's public API surface.
//!
//! Each API owns one of the three flows that mutate order state:
//! * [`OrderFlowApi`] — order placement and the lifecycle state machine,
//! * [`PaymentReconciliationApi`] — payment verification (client-confirmed and webhook channels),
//! * [`DispenseApi`] — pickup-code consumption and dispense completion.

pub mod dispense_api;
pub mod errors;
pub mod order_flow_api;
pub mod reconciliation_api;

pub use dispense_api::DispenseApi;
pub use errors::ReconciliationError;
pub use order_flow_api::OrderFlowApi;
pub use reconciliation_api::PaymentReconciliationApi;
