//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Handlers are generic over the storage traits so that endpoint tests can drive them against mocks. Actix cannot
//! register generic handlers directly, so each route is wrapped in a small unit struct by the `route!` macro and
//! instantiated with concrete types when the server is assembled.

use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use vendi_payment_engine::{
    db_types::{OrderId, StatusActor},
    traits::{NewOrderRequest, OrderFlowDatabase, OrderLineRequest, PaymentDatabase, PaymentGatewayClient},
    DispenseApi,
    OrderFlowApi,
    PaymentReconciliationApi,
    ReconciliationError,
};

use crate::{
    auth::UserClaims,
    data_objects::{
        CancelOrderParams,
        CreateOrderRequest,
        JsonResponse,
        MachineStartRequest,
        MachineStartResponse,
        OrderCompletedResponse,
        OrderCreatedResponse,
        PaymentSessionRequest,
        PickupCodeResponse,
        StartedMachine,
        StartedOrder,
        VerifyPaymentRequest,
        VerifyPaymentResponse,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders  ----------------------------------------------------

route!(create_order => Post "/orders" impl OrderFlowDatabase);
/// Places a new order for the authenticated user.
///
/// The body carries the machine code and the item quantities; all pricing comes from the catalog and is frozen into
/// the order. Responds with `201` and the frozen total, `409` when the user already has a blocking order (with a
/// message naming what is in the way), or `400` for unknown/unavailable items.
pub async fn create_order<B: OrderFlowDatabase>(
    claims: UserClaims,
    body: web::Json<CreateOrderRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST order for user {} on machine {}", claims.user_id, request.machine_code);
    let request = NewOrderRequest {
        user_id: claims.user_id,
        machine_code: request.machine_code,
        items: request
            .items
            .into_iter()
            .map(|line| OrderLineRequest { item_id: line.item_id, quantity: line.quantity })
            .collect(),
    };
    let order = api.place_order(request).await.map_err(|e| {
        debug!("💻️ Could not place order. {e}");
        ServerError::from(e)
    })?;
    Ok(HttpResponse::Created().json(OrderCreatedResponse::from(order)))
}

route!(latest_order => Get "/orders/latest" impl OrderFlowDatabase);
/// The authenticated user's most recent order, or `null`.
pub async fn latest_order<B: OrderFlowDatabase>(
    claims: UserClaims,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET latest order for user {}", claims.user_id);
    let order = api.latest_order(&claims.user_id).await.map_err(ServerError::from)?;
    Ok(HttpResponse::Ok().json(order))
}

route!(pickup_code => Get "/orders/pickup-code" impl OrderFlowDatabase);
/// Releases the pickup code for the user's current order.
///
/// Only the owner can retrieve it, and only while the order is awaiting pickup; otherwise the response explains the
/// order's actual situation (payment pending, being prepared, …).
pub async fn pickup_code<B: OrderFlowDatabase>(
    claims: UserClaims,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET pickup code for user {}", claims.user_id);
    let (order, code) = api.pickup_code(&claims.user_id).await.map_err(|e| {
        debug!("💻️ Could not release pickup code. {e}");
        ServerError::from(e)
    })?;
    Ok(HttpResponse::Ok().json(PickupCodeResponse { order_id: order.order_id, pickup_code: code }))
}

route!(order_completed => Get "/orders/completed" impl OrderFlowDatabase);
/// Whether the user's most recent order has been dispensed. Storefronts poll this while the machine runs.
pub async fn order_completed<B: OrderFlowDatabase>(
    claims: UserClaims,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let completed = api.is_latest_order_completed(&claims.user_id).await.map_err(ServerError::from)?;
    Ok(HttpResponse::Ok().json(OrderCompletedResponse { completed }))
}

route!(cancel_order => Post "/orders/{order_id}/cancel" impl OrderFlowDatabase);
/// Administrative cancellation of any non-terminal order.
///
/// ## Parameters
/// * `order_id` - The order to cancel. Path.
/// * `reason` - The reason for the cancellation. Body, string.
///
/// ## Returns
/// The cancelled order object, or `409` when the order is already terminal.
pub async fn cancel_order<B: OrderFlowDatabase>(
    path: web::Path<OrderId>,
    body: web::Json<CancelOrderParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let CancelOrderParams { reason } = body.into_inner();
    info!("💻️ Cancel order request for {order_id}. Reason: {reason}");
    let order = api.cancel_order(&order_id, StatusActor::Admin, &reason).await.map_err(|e| {
        debug!("💻️ Could not cancel order. {e}");
        ServerError::from(e)
    })?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Payments  ----------------------------------------------------

route!(payment_session => Post "/payments/session" impl PaymentDatabase, PaymentGatewayClient);
/// Opens a checkout session at the payment gateway for the user's pending order and records the payment attempt.
pub async fn payment_session<B, G>(
    claims: UserClaims,
    body: web::Json<PaymentSessionRequest>,
    api: web::Data<PaymentReconciliationApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentDatabase,
    G: PaymentGatewayClient,
{
    let PaymentSessionRequest { order_id } = body.into_inner();
    debug!("💻️ POST payment session for order {order_id}");
    let session = api.checkout_session(&order_id, &claims.user_id).await.map_err(|e| {
        debug!("💻️ Could not open payment session. {e}");
        ServerError::from(e)
    })?;
    Ok(HttpResponse::Created().json(session))
}

route!(verify_payment => Post "/payments/verify" impl PaymentDatabase, PaymentGatewayClient);
/// Client-confirmed payment verification.
///
/// Always responds `200` with `{verified: bool}`: a tampered signature or a payment the gateway does not report as
/// captured yields `verified: false` (and changes nothing). Gateway outages surface as `502` so the storefront's
/// retry policy applies.
pub async fn verify_payment<B, G>(
    _claims: UserClaims,
    body: web::Json<VerifyPaymentRequest>,
    api: web::Data<PaymentReconciliationApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentDatabase,
    G: PaymentGatewayClient,
{
    let VerifyPaymentRequest { gateway_order_id, gateway_payment_id, signature } = body.into_inner();
    debug!("💻️ POST verify payment {gateway_payment_id} for gateway order {gateway_order_id}");
    match api.confirm_client_payment(&gateway_order_id, &gateway_payment_id, &signature).await {
        Ok(confirmation) => Ok(HttpResponse::Ok()
            .json(VerifyPaymentResponse { verified: true, order_status: Some(confirmation.order.status) })),
        Err(ReconciliationError::InvalidSignature) => {
            Ok(HttpResponse::Ok().json(VerifyPaymentResponse { verified: false, order_status: None }))
        },
        Err(ReconciliationError::NotCaptured(status)) => {
            debug!("💻️ Payment {gateway_payment_id} not captured (gateway says {status})");
            Ok(HttpResponse::Ok().json(VerifyPaymentResponse { verified: false, order_status: None }))
        },
        Err(e) => {
            debug!("💻️ Could not verify payment. {e}");
            Err(e.into())
        },
    }
}

//----------------------------------------------   Machines  ----------------------------------------------------

route!(machine_start => Post "/start" impl OrderFlowDatabase);
/// A machine presents a scanned pickup code to start dispensing.
///
/// The failure response is deliberately identical for a wrong code, a code for another machine and an
/// already-consumed code. Registered under the machine scope, behind the machine key.
pub async fn machine_start<B: OrderFlowDatabase>(
    body: web::Json<MachineStartRequest>,
    api: web::Data<DispenseApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let MachineStartRequest { machine_code, pickup_code } = body.into_inner();
    info!("💻️ Machine {machine_code} start request");
    let started = api.start(&machine_code, &pickup_code).await.map_err(|e| {
        debug!("💻️ Could not start dispense on {machine_code}. {e}");
        ServerError::from(e)
    })?;
    Ok(HttpResponse::Ok().json(MachineStartResponse {
        order: StartedOrder { order_id: started.order.order_id, status: started.order.status },
        machine: StartedMachine { machine_code: started.machine.machine_code, status: started.machine.status },
    }))
}

route!(dispense_complete => Post "/dispense-complete/{order_id}" impl OrderFlowDatabase);
/// A machine reports that the dispense for an order has finished. `409` when the order is not currently being
/// prepared (including the second of two duplicate reports).
pub async fn dispense_complete<B: OrderFlowDatabase>(
    path: web::Path<OrderId>,
    api: web::Data<DispenseApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    info!("💻️ Dispense complete report for order {order_id}");
    api.dispense_complete(&order_id).await.map_err(|e| {
        debug!("💻️ Could not complete dispense. {e}");
        ServerError::from(e)
    })?;
    Ok(HttpResponse::Ok().json(JsonResponse::success("Dispense recorded")))
}
