//----------------------------------------------   Webhook  ----------------------------------------------------
//
// The payment gateway's asynchronous channel. The surrounding scope is wrapped in the HMAC middleware, which has
// already verified the signature over the exact raw bytes — an unverified body never reaches this module. From here
// on, every outcome that is not an internal fault answers `200`: the gateway retries on anything else, and
// redeliveries are already harmless thanks to the idempotent reconciliation path.

use actix_web::{web, HttpResponse};
use log::{debug, info, warn};
use vendi_payment_engine::{
    traits::{OrderFlowError, PaymentDatabase, PaymentGatewayClient},
    PaymentReconciliationApi,
    ReconciliationError,
};

use crate::{data_objects::{JsonResponse, PaymentWebhookEvent}, route};

route!(payment_webhook => Post "/payment" impl PaymentDatabase, PaymentGatewayClient);
pub async fn payment_webhook<B, G>(
    body: web::Bytes,
    api: web::Data<PaymentReconciliationApi<B, G>>,
) -> HttpResponse
where
    B: PaymentDatabase,
    G: PaymentGatewayClient,
{
    let event: PaymentWebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            // Authenticated but unparseable. Acknowledge it; a replay would fail identically.
            warn!("🔔️ Could not parse webhook body: {e}");
            return HttpResponse::Ok().json(JsonResponse::failure("Unrecognised payload"));
        },
    };
    let entity = event.payload.payment.entity;
    debug!("🔔️ Webhook event {} for gateway payment {}", event.event, entity.id);
    match event.event.as_str() {
        "payment.captured" | "payment.authorized" => {
            match api.record_webhook_payment(&entity.order_id, &entity.id, entity.method).await {
                Ok(confirmation) if confirmation.duplicate => {
                    info!("🔔️ Duplicate delivery for payment {}; already applied", entity.id);
                    HttpResponse::Ok().json(JsonResponse::success("Already processed"))
                },
                Ok(_) => HttpResponse::Ok().json(JsonResponse::success("Payment processed")),
                Err(ReconciliationError::OrderFlow(OrderFlowError::UnknownGatewayOrder(gw))) => {
                    warn!("🔔️ Webhook for unknown gateway order {gw}; ignoring");
                    HttpResponse::Ok().json(JsonResponse::failure("Unknown gateway order"))
                },
                Err(e) => {
                    // Internal fault: answer 5xx so the gateway redelivers once we are healthy again.
                    warn!("🔔️ Could not apply webhook payment {}. {e}", entity.id);
                    HttpResponse::InternalServerError().json(JsonResponse::failure("Could not process payment"))
                },
            }
        },
        "payment.failed" => {
            let reason = entity.error_description.unwrap_or_else(|| "Payment failed".to_string());
            match api.record_webhook_failure(&entity.order_id, &entity.id, &reason).await {
                Ok(_) => HttpResponse::Ok().json(JsonResponse::success("Failure recorded")),
                Err(e) => {
                    warn!("🔔️ Could not record webhook failure for {}. {e}", entity.id);
                    HttpResponse::InternalServerError().json(JsonResponse::failure("Could not record failure"))
                },
            }
        },
        other => {
            debug!("🔔️ Ignoring webhook event type {other}");
            HttpResponse::Ok().json(JsonResponse::success("Ignored"))
        },
    }
}
