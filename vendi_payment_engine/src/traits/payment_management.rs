use crate::{
    db_types::{NewPayment, Order, OrderId, Payment, PaymentStatusEntry},
    traits::{FailedPaymentNotice, OrderFlowError, PaymentConfirmation, VerifiedPaymentNotice},
};

/// Storage contract for payment records and their coupling to the order state machine.
#[allow(async_fn_in_trait)]
pub trait PaymentDatabase {
    /// Records a new, unverified payment attempt when a checkout session is requested.
    async fn insert_pending_payment(&self, payment: NewPayment) -> Result<Payment, OrderFlowError>;

    async fn fetch_payment_by_gateway_payment_id(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<Payment>, OrderFlowError>;

    async fn fetch_payments_for_order(&self, order_id: &OrderId) -> Result<Vec<Payment>, OrderFlowError>;

    async fn fetch_payment_history(&self, payment_id: i64) -> Result<Vec<PaymentStatusEntry>, OrderFlowError>;

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError>;

    /// Applies an authenticated payment-success event in a single transaction:
    ///
    /// * the payment record for the gateway order is marked `Success` and `verified`, with a history entry;
    /// * the associated order is moved `Pending → ReadyForPickup` (minting its pickup code).
    ///
    /// Idempotency: if the gateway payment reference has already been verified, nothing is written and the existing
    /// records are returned with `duplicate` set. If the order has already advanced (a concurrent confirmation won),
    /// the payment is still committed as verified for audit and `order_advanced` is unset — this is the expected
    /// outcome of duplicate deliveries, not an error.
    async fn record_verified_payment(
        &self,
        notice: &VerifiedPaymentNotice,
    ) -> Result<PaymentConfirmation, OrderFlowError>;

    /// Marks the payment attempt for a gateway order as failed. The order is left untouched; the user may retry.
    /// Returns `None` when no open payment record exists for the gateway order (e.g. it already succeeded).
    async fn record_failed_payment(&self, notice: &FailedPaymentNotice) -> Result<Option<Payment>, OrderFlowError>;
}
