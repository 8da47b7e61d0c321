use std::fmt::Debug;

use chrono::Duration;
use log::*;
use vendi_common::Paise;

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderItemLine, OrderStatusEntry, OrderStatusType, StatusActor},
    traits::{NewOrderRequest, OrderFlowDatabase, OrderFlowError},
};

/// `OrderFlowApi` is the primary API for placing orders and driving them through the lifecycle state machine in
/// response to user, admin and system events. Payment events go through
/// [`crate::PaymentReconciliationApi`]; machine events go through [`crate::DispenseApi`]. All three converge on the
/// same storage-level transition operation, so the transition table is enforced in exactly one place.
pub struct OrderFlowApi<B> {
    db: B,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderFlowApi<B>
where B: OrderFlowDatabase
{
    /// Places a new order.
    ///
    /// The machine must exist and be active, and every line's item must exist and be available. The order amount is
    /// computed here, from the catalog, and frozen: `price = Σ unit_price·qty`, `gst = Σ unit_gst·qty`,
    /// `total = price + gst`. The client supplies quantities only.
    ///
    /// A user may have at most one order in a blocking status (`Pending`, `ReadyForPickup`, `Preparing`). If one
    /// exists, the new order is rejected with [`OrderFlowError::ActiveOrderExists`] carrying that status, so the
    /// caller can tell the user exactly what is in the way. Completed and cancelled orders never block.
    pub async fn place_order(&self, request: NewOrderRequest) -> Result<Order, OrderFlowError> {
        if request.items.is_empty() {
            return Err(OrderFlowError::Validation("An order must contain at least one item".to_string()));
        }
        let machine = self
            .db
            .fetch_machine(&request.machine_code)
            .await?
            .ok_or_else(|| OrderFlowError::MachineNotFound(request.machine_code.clone()))?;
        if !machine.is_active {
            warn!("🔄️📦️ Order attempt on inactive machine {}", machine.machine_code);
            return Err(OrderFlowError::MachineInactive(machine.machine_code));
        }
        if let Some(existing) = self.db.fetch_blocking_order_for_user(&request.user_id).await? {
            debug!("🔄️📦️ User has a blocking order [{}] with status {}", existing.order_id, existing.status);
            return Err(OrderFlowError::ActiveOrderExists(existing.status));
        }
        let mut price = Paise::default();
        let mut gst = Paise::default();
        let mut lines = Vec::with_capacity(request.items.len());
        for line in &request.items {
            if line.quantity <= 0 {
                return Err(OrderFlowError::Validation(format!(
                    "Quantity for item {} must be positive",
                    line.item_id
                )));
            }
            let item =
                self.db.fetch_item(line.item_id).await?.ok_or(OrderFlowError::ItemNotFound(line.item_id))?;
            if !item.is_available {
                return Err(OrderFlowError::ItemUnavailable(item.name));
            }
            price += item.price * line.quantity;
            gst += item.gst * line.quantity;
            lines.push(OrderItemLine {
                item_id: item.id,
                item_name: item.name,
                quantity: line.quantity,
                unit_price: item.price,
                unit_gst: item.gst,
            });
        }
        let order = NewOrder::new(request.user_id, machine.id, price, gst);
        let order = self.db.insert_order(order, &lines).await?;
        debug!("🔄️📦️ Order [{}] placed for {} on machine {}", order.order_id, order.total, machine.machine_code);
        Ok(order)
    }

    /// The most recent order for the user, if any.
    pub async fn latest_order(&self, user_id: &str) -> Result<Option<Order>, OrderFlowError> {
        self.db.fetch_latest_order_for_user(user_id).await
    }

    /// Whether the user's most recent order has completed. `false` when the user has no orders.
    pub async fn is_latest_order_completed(&self, user_id: &str) -> Result<bool, OrderFlowError> {
        let order = self.db.fetch_latest_order_for_user(user_id).await?;
        Ok(order.map(|o| o.completed).unwrap_or(false))
    }

    /// Returns the pickup code for the user's current order.
    ///
    /// The code is only released to the owning user, and only while the order is `ReadyForPickup`. In any other
    /// status the call fails with [`OrderFlowError::OrderNotReady`] carrying the status, so the caller can explain
    /// (payment pending, already being prepared, …). The code itself is never logged.
    pub async fn pickup_code(&self, user_id: &str) -> Result<(Order, String), OrderFlowError> {
        let order =
            self.db.fetch_latest_order_for_user(user_id).await?.ok_or(OrderFlowError::NoActiveOrder)?;
        match (order.status, order.pickup_code.clone()) {
            (OrderStatusType::ReadyForPickup, Some(code)) => {
                debug!("🔄️📦️ Pickup code released for order [{}]", order.order_id);
                Ok((order, code))
            },
            (status, _) => Err(OrderFlowError::OrderNotReady(order.order_id, status)),
        }
    }

    /// Fetches an order, restricted to its owner. Returns `None` for orders that exist but belong to someone else,
    /// so the endpoint cannot be used to probe other users' orders.
    pub async fn order_for_user(&self, order_id: &OrderId, user_id: &str) -> Result<Option<Order>, OrderFlowError> {
        let order = self.db.fetch_order_by_order_id(order_id).await?;
        Ok(order.filter(|o| o.user_id == user_id))
    }

    /// Changes the status of an order. This is the administrative / system entry point into the state machine; the
    /// payment and machine flows use their own dedicated operations.
    pub async fn transition(
        &self,
        order_id: &OrderId,
        target: OrderStatusType,
        actor: StatusActor,
        reason: &str,
    ) -> Result<Order, OrderFlowError> {
        let order = self.db.transition_order(order_id, target, actor, reason).await?;
        info!("🔄️📦️ Order [{}] moved to {} by {actor}. Reason: {reason}", order.order_id, order.status);
        Ok(order)
    }

    /// Administrative cancellation of any non-terminal order.
    pub async fn cancel_order(&self, order_id: &OrderId, actor: StatusActor, reason: &str) -> Result<Order, OrderFlowError> {
        self.transition(order_id, OrderStatusType::Cancelled, actor, reason).await
    }

    /// Cancels `Pending` orders whose payment window has elapsed. Called by the background sweep.
    pub async fn expire_stale_orders(&self, older_than: Duration) -> Result<Vec<Order>, OrderFlowError> {
        let expired = self.db.expire_pending_orders(older_than).await?;
        if !expired.is_empty() {
            info!("🔄️📦️ {} pending orders expired", expired.len());
        }
        Ok(expired)
    }

    pub async fn status_history(&self, order_id: &OrderId) -> Result<Vec<OrderStatusEntry>, OrderFlowError> {
        self.db.fetch_status_history(order_id).await
    }

    pub async fn order_items(&self, order_id: &OrderId) -> Result<Vec<OrderItemLine>, OrderFlowError> {
        self.db.fetch_order_items(order_id).await
    }
}
