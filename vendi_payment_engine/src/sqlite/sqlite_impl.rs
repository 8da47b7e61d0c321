//! `SqliteDatabase` is a concrete implementation of a Vendi payment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the storage traits defined in the [`crate::traits`]
//! module. Every mutating trait method runs as one transaction; the conditional-update discipline inside
//! [`super::db::orders`] and [`super::db::payments`] is what makes concurrent transition attempts serialize safely.
use std::fmt::Debug;

use chrono::Duration;
use log::*;
use sqlx::SqlitePool;

use super::db::{db_url, items, machines, new_pool, orders, payments};
use crate::{
    db_types::{
        Item,
        Machine,
        MachineCode,
        NewOrder,
        NewPayment,
        Order,
        OrderId,
        OrderItemLine,
        OrderStatusEntry,
        OrderStatusType,
        Payment,
        PaymentStatusEntry,
        StatusActor,
    },
    traits::{
        DispenseStart,
        FailedPaymentNotice,
        OrderFlowDatabase,
        OrderFlowError,
        PaymentConfirmation,
        PaymentDatabase,
        VerifiedPaymentNotice,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL from the environment.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date. Safe to call on every startup.
    pub async fn run_migrations(&self) -> Result<(), OrderFlowError> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| OrderFlowError::DatabaseError(e.to_string()))?;
        debug!("🗃️ Database migrations are up to date");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl OrderFlowDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder, lines: &[OrderItemLine]) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, lines, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order [{}] saved for user {} ({} lines)", order.order_id, order.user_id, lines.len());
        Ok(order)
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_latest_order_for_user(&self, user_id: &str) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_latest_order_for_user(user_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_blocking_order_for_user(&self, user_id: &str) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_blocking_order_for_user(user_id, &mut conn).await?;
        Ok(order)
    }

    async fn transition_order(
        &self,
        order_id: &OrderId,
        target: OrderStatusType,
        actor: StatusActor,
        reason: &str,
    ) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut tx)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        let updated = orders::apply_transition(&order, target, actor, reason, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order [{order_id}] is now {}", updated.status);
        Ok(updated)
    }

    async fn start_dispense(&self, machine: &Machine, pickup_code: &str) -> Result<DispenseStart, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        // The conditional update is the first statement of the transaction. Wrong code, wrong machine, an already
        // consumed code and a lost race all end up here as "no row matched" and are indistinguishable to the caller.
        let order = orders::consume_pickup_code(machine.id, pickup_code, &mut tx)
            .await?
            .ok_or(OrderFlowError::InvalidPickupCode)?;
        let machine = machines::set_dispensing(machine.id, &order.order_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Machine {} is dispensing order [{}]", machine.machine_code, order.order_id);
        Ok(DispenseStart { order, machine })
    }

    async fn complete_dispense(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut tx)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        let updated =
            orders::apply_transition(&order, OrderStatusType::Completed, StatusActor::Machine, "Dispense complete", &mut tx)
                .await?;
        machines::set_idle(updated.machine_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order [{order_id}] completed");
        Ok(updated)
    }

    async fn expire_pending_orders(&self, older_than: Duration) -> Result<Vec<Order>, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let expired = orders::expire_pending(older_than, &mut tx).await?;
        tx.commit().await?;
        Ok(expired)
    }

    async fn fetch_status_history(&self, order_id: &OrderId) -> Result<Vec<OrderStatusEntry>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let entries = orders::fetch_status_history(order_id, &mut conn).await?;
        Ok(entries)
    }

    async fn fetch_order_items(&self, order_id: &OrderId) -> Result<Vec<OrderItemLine>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let lines = orders::fetch_order_items(order_id, &mut conn).await?;
        Ok(lines)
    }

    async fn fetch_machine(&self, code: &MachineCode) -> Result<Option<Machine>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let machine = machines::fetch_machine_by_code(code, &mut conn).await?;
        Ok(machine)
    }

    async fn fetch_item(&self, item_id: i64) -> Result<Option<Item>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let item = items::fetch_item(item_id, &mut conn).await?;
        Ok(item)
    }

    async fn close(&mut self) -> Result<(), OrderFlowError> {
        self.pool.close().await;
        Ok(())
    }
}

impl PaymentDatabase for SqliteDatabase {
    async fn insert_pending_payment(&self, payment: NewPayment) -> Result<Payment, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::insert_pending_payment(payment, &mut tx).await?;
        tx.commit().await?;
        Ok(payment)
    }

    async fn fetch_payment_by_gateway_payment_id(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<Payment>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_payment_by_gateway_payment_id(gateway_payment_id, &mut conn).await?;
        Ok(payment)
    }

    async fn fetch_payments_for_order(&self, order_id: &OrderId) -> Result<Vec<Payment>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let payments = payments::fetch_payments_for_order(order_id, &mut conn).await?;
        Ok(payments)
    }

    async fn fetch_payment_history(&self, payment_id: i64) -> Result<Vec<PaymentStatusEntry>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let entries = payments::fetch_payment_history(payment_id, &mut conn).await?;
        Ok(entries)
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError> {
        OrderFlowDatabase::fetch_order_by_order_id(self, order_id).await
    }

    /// See the trait documentation for the contract. The implementation claims the payment row first (a conditional
    /// write, so concurrent deliveries serialize on it), then drives the order transition inside the same
    /// transaction. A payment whose order has already advanced is still committed — that is the audit trail for the
    /// losing half of a duplicate delivery.
    async fn record_verified_payment(
        &self,
        notice: &VerifiedPaymentNotice,
    ) -> Result<PaymentConfirmation, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let claimed = payments::claim_open_payment(
            &notice.gateway_order_id,
            &notice.gateway_payment_id,
            notice.source,
            notice.method.as_deref(),
            &mut tx,
        )
        .await?;
        let confirmation = match claimed {
            Some(payment) => {
                let order = orders::fetch_order_by_order_id(&payment.order_id, &mut tx)
                    .await?
                    .ok_or_else(|| OrderFlowError::OrderNotFound(payment.order_id.clone()))?;
                let (order, advanced) = match orders::apply_transition(
                    &order,
                    OrderStatusType::ReadyForPickup,
                    StatusActor::Gateway,
                    "Payment verified",
                    &mut tx,
                )
                .await
                {
                    Ok(updated) => (updated, true),
                    // The order moved on while this payment was in flight (e.g. the other confirmation channel won,
                    // or the order was cancelled). The verified payment is kept for audit; the order is untouched.
                    Err(OrderFlowError::StaleTransition { .. }) | Err(OrderFlowError::InvalidTransition { .. }) => {
                        (order, false)
                    },
                    Err(e) => return Err(e),
                };
                PaymentConfirmation { payment, order, order_advanced: advanced, duplicate: false }
            },
            None => self.resolve_unclaimed_payment(notice, &mut tx).await?,
        };
        tx.commit().await?;
        Ok(confirmation)
    }

    async fn record_failed_payment(&self, notice: &FailedPaymentNotice) -> Result<Option<Payment>, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::mark_failed(
            &notice.gateway_order_id,
            &notice.gateway_payment_id,
            notice.source,
            &notice.reason,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        match &payment {
            Some(p) => debug!("🗃️ Payment attempt {} for order [{}] marked as failed", p.id, p.order_id),
            None => debug!("🗃️ Ignoring failure event for gateway order {}: no open payment", notice.gateway_order_id),
        }
        Ok(payment)
    }
}

impl SqliteDatabase {
    /// Classifies a success event that found no open payment row: a redelivery of an already verified payment, a
    /// capture for a session that was verified under a different payment reference, or an unknown session.
    async fn resolve_unclaimed_payment(
        &self,
        notice: &VerifiedPaymentNotice,
        tx: &mut sqlx::SqliteConnection,
    ) -> Result<PaymentConfirmation, OrderFlowError> {
        if let Some(existing) =
            payments::fetch_payment_by_gateway_payment_id(&notice.gateway_payment_id, &mut *tx).await?
        {
            if existing.verified {
                let order = orders::fetch_order_by_order_id(&existing.order_id, &mut *tx)
                    .await?
                    .ok_or_else(|| OrderFlowError::OrderNotFound(existing.order_id.clone()))?;
                debug!("🗃️ Duplicate delivery for gateway payment {}", notice.gateway_payment_id);
                return Ok(PaymentConfirmation { payment: existing, order, order_advanced: false, duplicate: true });
            }
            // The payment reference exists on a record for a different session. Nothing sane can be applied.
            return Err(OrderFlowError::UnknownGatewayOrder(notice.gateway_order_id.clone()));
        }
        if let Some(consumed) = payments::fetch_any_by_gateway_order_id(&notice.gateway_order_id, &mut *tx).await? {
            // The session was already verified under a different payment reference (a retried payment whose first
            // attempt won). Keep this capture on record; the order is not touched.
            let order = orders::fetch_order_by_order_id(&consumed.order_id, &mut *tx)
                .await?
                .ok_or_else(|| OrderFlowError::OrderNotFound(consumed.order_id.clone()))?;
            let audit = payments::insert_superseded_success(
                &consumed.order_id,
                &notice.gateway_order_id,
                &notice.gateway_payment_id,
                consumed.amount,
                &consumed.currency,
                notice.source,
                &mut *tx,
            )
            .await?;
            warn!(
                "🗃️ Gateway payment {} captured for order [{}] which was already paid; recorded for audit",
                notice.gateway_payment_id, consumed.order_id
            );
            return Ok(PaymentConfirmation { payment: audit, order, order_advanced: false, duplicate: false });
        }
        Err(OrderFlowError::UnknownGatewayOrder(notice.gateway_order_id.clone()))
    }
}
