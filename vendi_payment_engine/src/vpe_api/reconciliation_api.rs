use std::fmt::Debug;

use log::*;
use vendi_common::Secret;

use crate::{
    db_types::{NewPayment, OrderId, OrderStatusType, Payment, PaymentSource},
    helpers::verify_checkout_signature,
    traits::{
        CheckoutSession,
        FailedPaymentNotice,
        PaymentConfirmation,
        PaymentDatabase,
        PaymentGatewayClient,
        VerifiedPaymentNotice,
    },
    ReconciliationError,
};

/// `PaymentReconciliationApi` consumes payment-gateway confirmations and drives the order lifecycle exactly once per
/// payment event.
///
/// Two independent channels feed it: the client-confirmed verify call and the asynchronous gateway webhook. Both must
/// authenticate before any state is touched — the client channel by recomputing the checkout signature here, the
/// webhook channel by HMAC over the raw body at the HTTP layer, before the JSON is even parsed. Neither channel is
/// trusted over the other; whichever arrives first wins, and the loser is recognised as a duplicate.
pub struct PaymentReconciliationApi<B, G> {
    db: B,
    gateway: G,
    /// The gateway key secret, shared with the gateway, used to verify client-confirmed payment signatures.
    key_secret: Secret<String>,
}

impl<B, G> Debug for PaymentReconciliationApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentReconciliationApi")
    }
}

impl<B, G> PaymentReconciliationApi<B, G> {
    pub fn new(db: B, gateway: G, key_secret: Secret<String>) -> Self {
        Self { db, gateway, key_secret }
    }
}

impl<B, G> PaymentReconciliationApi<B, G>
where
    B: PaymentDatabase,
    G: PaymentGatewayClient,
{
    /// Creates a checkout session at the gateway for an order and records the pending payment attempt.
    ///
    /// The order must belong to the requesting user and still be `Pending`. The recorded payment carries the
    /// gateway's order reference, which is how later confirmations find their way back to the order.
    pub async fn checkout_session(
        &self,
        order_id: &OrderId,
        user_id: &str,
    ) -> Result<CheckoutSession, ReconciliationError> {
        let order = self
            .db
            .fetch_order_by_order_id(order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| crate::traits::OrderFlowError::OrderNotFound(order_id.clone()))?;
        if order.status != OrderStatusType::Pending {
            return Err(ReconciliationError::OrderNotPayable(order.order_id, order.status));
        }
        let session = self.gateway.create_checkout_session(order.total, &order_currency(), order_id).await?;
        let payment = NewPayment::new(order.order_id.clone(), session.gateway_order_id.clone(), order.total);
        self.db.insert_pending_payment(payment).await?;
        debug!("🔄️💳️ Checkout session {} opened for order [{order_id}]", session.gateway_order_id);
        Ok(session)
    }

    /// Client-confirmed payment verification.
    ///
    /// The caller presents the gateway's order and payment references plus a signature. The expected signature is
    /// recomputed from the shared key secret over `"{gateway_order_id}|{gateway_payment_id}"` and compared in
    /// constant time; a mismatch aborts with [`ReconciliationError::InvalidSignature`] before anything is read or
    /// written.
    ///
    /// A valid signature is necessary but not sufficient: the gateway is then asked for the authoritative payment
    /// status, and only `authorized`/`captured` advance the order. Anything else records a failed attempt and leaves
    /// the order payable.
    pub async fn confirm_client_payment(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> Result<PaymentConfirmation, ReconciliationError> {
        if !verify_checkout_signature(self.key_secret.reveal(), gateway_order_id, gateway_payment_id, signature) {
            warn!("🔄️💳️ Invalid payment signature presented for gateway order {gateway_order_id}");
            return Err(ReconciliationError::InvalidSignature);
        }
        let gateway_view = self.gateway.fetch_payment(gateway_payment_id).await?;
        if !gateway_view.status.is_success() {
            info!(
                "🔄️💳️ Gateway reports payment {gateway_payment_id} as {}; recording failure",
                gateway_view.status
            );
            let notice = FailedPaymentNotice {
                gateway_order_id: gateway_order_id.to_string(),
                gateway_payment_id: gateway_payment_id.to_string(),
                source: PaymentSource::Client,
                reason: format!("Gateway status {}", gateway_view.status),
            };
            self.db.record_failed_payment(&notice).await?;
            return Err(ReconciliationError::NotCaptured(gateway_view.status));
        }
        let notice = VerifiedPaymentNotice {
            gateway_order_id: gateway_order_id.to_string(),
            gateway_payment_id: gateway_payment_id.to_string(),
            source: PaymentSource::Client,
            method: gateway_view.method,
        };
        let confirmation = self.apply_verified(notice).await?;
        Ok(confirmation)
    }

    /// Applies an authenticated webhook success event (`payment.captured` / `payment.authorized`).
    ///
    /// The raw-body HMAC has already been checked at the HTTP boundary, and for these event types the embedded status
    /// is trusted — no second gateway round trip.
    pub async fn record_webhook_payment(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        method: Option<String>,
    ) -> Result<PaymentConfirmation, ReconciliationError> {
        let notice = VerifiedPaymentNotice {
            gateway_order_id: gateway_order_id.to_string(),
            gateway_payment_id: gateway_payment_id.to_string(),
            source: PaymentSource::Webhook,
            method,
        };
        self.apply_verified(notice).await
    }

    /// Applies an authenticated webhook failure event.
    pub async fn record_webhook_failure(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        reason: &str,
    ) -> Result<Option<Payment>, ReconciliationError> {
        let notice = FailedPaymentNotice {
            gateway_order_id: gateway_order_id.to_string(),
            gateway_payment_id: gateway_payment_id.to_string(),
            source: PaymentSource::Webhook,
            reason: reason.to_string(),
        };
        let payment = self.db.record_failed_payment(&notice).await?;
        Ok(payment)
    }

    async fn apply_verified(&self, notice: VerifiedPaymentNotice) -> Result<PaymentConfirmation, ReconciliationError> {
        let confirmation = self.db.record_verified_payment(&notice).await?;
        if confirmation.duplicate {
            debug!(
                "🔄️💳️ Duplicate delivery for gateway payment {}; nothing applied",
                notice.gateway_payment_id
            );
        } else if !confirmation.order_advanced {
            // Expected when the other confirmation channel won the race; the payment is still on record.
            debug!(
                "🔄️💳️ Payment {} verified but order [{}] had already advanced to {}",
                notice.gateway_payment_id, confirmation.order.order_id, confirmation.order.status
            );
        } else {
            info!(
                "🔄️💳️ Payment {} verified via {}; order [{}] is now awaiting pickup",
                notice.gateway_payment_id, notice.source, confirmation.order.order_id
            );
        }
        Ok(confirmation)
    }

    pub async fn payments_for_order(&self, order_id: &OrderId) -> Result<Vec<Payment>, ReconciliationError> {
        let payments = self.db.fetch_payments_for_order(order_id).await?;
        Ok(payments)
    }
}

fn order_currency() -> String {
    vendi_common::INR_CURRENCY_CODE.to_string()
}
