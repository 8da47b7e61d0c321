use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use vendi_payment_engine::{
    db_types::OrderStatusType,
    traits::{GatewayClientError, OrderFlowError},
    ReconciliationError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("No authenticated user on this request")]
    Unauthenticated,
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("{0}")]
    OrderConflict(String),
    #[error("{0}")]
    TransitionConflict(String),
    #[error("Invalid OTP or order not ready for pickup")]
    InvalidPickupCode,
    #[error("{0}")]
    OrderNotReady(String),
    #[error("Machine is currently disabled")]
    MachineDisabled,
    #[error("The payment gateway is unavailable. {0}")]
    ExternalService(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidPickupCode => StatusCode::BAD_REQUEST,
            Self::OrderNotReady(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::MachineDisabled => StatusCode::FORBIDDEN,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::OrderConflict(_) => StatusCode::CONFLICT,
            Self::TransitionConflict(_) => StatusCode::CONFLICT,
            Self::ExternalService(_) => StatusCode::BAD_GATEWAY,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

/// The message shown when order creation is blocked, specific to what is in the way.
pub fn blocking_order_message(status: OrderStatusType) -> String {
    match status {
        OrderStatusType::Pending => {
            "You have a pending payment. Please complete payment or cancel the order first.".to_string()
        },
        OrderStatusType::ReadyForPickup => {
            "Your order is ready for pickup. Please collect it before placing a new order.".to_string()
        },
        OrderStatusType::Preparing => {
            "Your order is being prepared. Please wait for completion before placing a new order.".to_string()
        },
        _ => "You have an active order. Please complete it first.".to_string(),
    }
}

/// The message shown when a pickup code is requested for an order that is not ready.
pub fn not_ready_message(status: OrderStatusType) -> String {
    match status {
        OrderStatusType::Pending => "Payment is pending".to_string(),
        OrderStatusType::Preparing => "Order is being prepared".to_string(),
        OrderStatusType::Completed => "Order has already been collected".to_string(),
        OrderStatusType::Cancelled => "Order has been cancelled".to_string(),
        _ => "Order is not ready for pickup".to_string(),
    }
}

impl From<OrderFlowError> for ServerError {
    fn from(e: OrderFlowError) -> Self {
        match e {
            OrderFlowError::DatabaseError(m) => Self::BackendError(m),
            OrderFlowError::OrderNotFound(_) | OrderFlowError::NoActiveOrder => Self::NoRecordFound(e.to_string()),
            OrderFlowError::MachineNotFound(_) => Self::NoRecordFound(e.to_string()),
            OrderFlowError::MachineInactive(_) => Self::MachineDisabled,
            OrderFlowError::ItemNotFound(_) | OrderFlowError::ItemUnavailable(_) | OrderFlowError::Validation(_) => {
                Self::InvalidRequestBody(e.to_string())
            },
            OrderFlowError::ActiveOrderExists(status) => Self::OrderConflict(blocking_order_message(status)),
            OrderFlowError::InvalidTransition { .. } | OrderFlowError::StaleTransition { .. } => {
                Self::TransitionConflict(e.to_string())
            },
            OrderFlowError::InvalidPickupCode => Self::InvalidPickupCode,
            OrderFlowError::OrderNotReady(_, status) => Self::OrderNotReady(not_ready_message(status)),
            OrderFlowError::CodeAllocation(m) => Self::BackendError(m),
            OrderFlowError::UnknownGatewayOrder(_) => Self::NoRecordFound(e.to_string()),
        }
    }
}

impl From<ReconciliationError> for ServerError {
    fn from(e: ReconciliationError) -> Self {
        match e {
            ReconciliationError::OrderFlow(inner) => inner.into(),
            ReconciliationError::Gateway(g) => g.into(),
            ReconciliationError::OrderNotPayable(_, _) => Self::OrderConflict(e.to_string()),
            // These two are expected to be handled in the verify handler; anything that leaks here is a bad request.
            ReconciliationError::InvalidSignature | ReconciliationError::NotCaptured(_) => {
                Self::InvalidRequestBody(e.to_string())
            },
        }
    }
}

impl From<GatewayClientError> for ServerError {
    fn from(e: GatewayClientError) -> Self {
        Self::ExternalService(e.to_string())
    }
}
