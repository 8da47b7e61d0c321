use chrono::Duration;
use thiserror::Error;

use crate::{
    db_types::{
        Item,
        Machine,
        MachineCode,
        NewOrder,
        Order,
        OrderId,
        OrderItemLine,
        OrderStatusEntry,
        OrderStatusType,
        StatusActor,
    },
    traits::DispenseStart,
};

/// Storage contract for the order lifecycle: creation, the status state machine, pickup-code consumption and the
/// pending-order expiry sweep.
///
/// Every mutation here is a single atomic transaction against the backing store. In particular, the
/// read-modify-write of an order's status is conditioned on the expected prior status, so that of two concurrent
/// transition attempts exactly one succeeds and the other is reported stale — never both.
#[allow(async_fn_in_trait)]
pub trait OrderFlowDatabase {
    /// The URL of the backing database.
    fn url(&self) -> &str;

    /// Inserts a new order, its line items and the seeding `Pending` history entry in one transaction.
    ///
    /// Fails with [`OrderFlowError::ActiveOrderExists`] if the user already has an order in a blocking status.
    /// The check is backed by a storage-level uniqueness constraint, so two racing creations cannot both succeed.
    async fn insert_order(&self, order: NewOrder, lines: &[OrderItemLine]) -> Result<Order, OrderFlowError>;

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError>;

    /// The most recently created order for the user, regardless of status.
    async fn fetch_latest_order_for_user(&self, user_id: &str) -> Result<Option<Order>, OrderFlowError>;

    /// The user's order in a blocking status, if any. At most one can exist.
    async fn fetch_blocking_order_for_user(&self, user_id: &str) -> Result<Option<Order>, OrderFlowError>;

    /// Moves an order to `target`, applying the target's side effects (pickup-code mint/clear, timestamps, completed
    /// flag) and appending exactly one history entry, all in one transaction.
    ///
    /// Illegal transitions fail with [`OrderFlowError::InvalidTransition`]; re-delivered transitions that the order
    /// has already moved past fail with [`OrderFlowError::StaleTransition`] and change nothing.
    async fn transition_order(
        &self,
        order_id: &OrderId,
        target: OrderStatusType,
        actor: StatusActor,
        reason: &str,
    ) -> Result<Order, OrderFlowError>;

    /// Consumes a pickup code at a machine: the unique order with this exact code, on this machine, in
    /// `ReadyForPickup`, moves to `Preparing` and the code is cleared. The machine is marked as dispensing.
    ///
    /// Every failure mode — unknown code, wrong machine, already consumed, lost race — collapses into
    /// [`OrderFlowError::InvalidPickupCode`], so callers cannot be used as a code-guessing oracle.
    async fn start_dispense(&self, machine: &Machine, pickup_code: &str) -> Result<DispenseStart, OrderFlowError>;

    /// Marks a `Preparing` order as `Completed` and returns the machine to idle.
    async fn complete_dispense(&self, order_id: &OrderId) -> Result<Order, OrderFlowError>;

    /// Cancels `Pending` orders that have not seen a verified payment within `older_than`. Returns the orders that
    /// were cancelled. Intended for a periodic background sweep, not a per-request path.
    async fn expire_pending_orders(&self, older_than: Duration) -> Result<Vec<Order>, OrderFlowError>;

    /// The append-only status history for an order, oldest first. Never empty for an existing order.
    async fn fetch_status_history(&self, order_id: &OrderId) -> Result<Vec<OrderStatusEntry>, OrderFlowError>;

    /// The line items captured when the order was placed.
    async fn fetch_order_items(&self, order_id: &OrderId) -> Result<Vec<OrderItemLine>, OrderFlowError>;

    async fn fetch_machine(&self, code: &MachineCode) -> Result<Option<Machine>, OrderFlowError>;

    async fn fetch_item(&self, item_id: i64) -> Result<Option<Item>, OrderFlowError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), OrderFlowError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("No active order found")]
    NoActiveOrder,
    #[error("No vending machine with code {0} is registered")]
    MachineNotFound(MachineCode),
    #[error("Machine {0} is currently disabled")]
    MachineInactive(MachineCode),
    #[error("Item {0} does not exist")]
    ItemNotFound(i64),
    #[error("Item \"{0}\" is currently unavailable")]
    ItemUnavailable(String),
    #[error("An order is already in progress with status {0}")]
    ActiveOrderExists(OrderStatusType),
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition { order_id: OrderId, from: OrderStatusType, to: OrderStatusType },
    #[error("Order {order_id} has already moved to or past {target}")]
    StaleTransition { order_id: OrderId, target: OrderStatusType },
    #[error("The pickup code is not valid for this machine")]
    InvalidPickupCode,
    #[error("Order {0} is not ready for pickup (status {1})")]
    OrderNotReady(OrderId, OrderStatusType),
    #[error("Could not allocate a pickup code: {0}")]
    CodeAllocation(String),
    #[error("No payment session exists for gateway order {0}")]
    UnknownGatewayOrder(String),
    #[error("Input validation failed: {0}")]
    Validation(String),
}

impl From<sqlx::Error> for OrderFlowError {
    fn from(e: sqlx::Error) -> Self {
        OrderFlowError::DatabaseError(e.to_string())
    }
}
