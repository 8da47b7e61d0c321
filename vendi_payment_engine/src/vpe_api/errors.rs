use thiserror::Error;

use crate::{
    db_types::{OrderId, OrderStatusType},
    traits::{GatewayClientError, GatewayPaymentStatus, OrderFlowError},
};

#[derive(Debug, Clone, Error)]
pub enum ReconciliationError {
    #[error("{0}")]
    OrderFlow(#[from] OrderFlowError),
    #[error("The supplied payment signature is invalid")]
    InvalidSignature,
    #[error("Order {0} is not awaiting payment (status {1})")]
    OrderNotPayable(OrderId, OrderStatusType),
    #[error("The gateway reports the payment as {0}, which is not a success state")]
    NotCaptured(GatewayPaymentStatus),
    #[error("Payment gateway error. {0}")]
    Gateway(#[from] GatewayClientError),
}
