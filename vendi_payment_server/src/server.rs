use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::info;
use vendi_payment_engine::{DispenseApi, OrderFlowApi, PaymentReconciliationApi, SqliteDatabase};

use crate::{
    config::{ServerConfig, MACHINE_KEY_HEADER, WEBHOOK_SIGNATURE_HEADER},
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    integrations::gateway::CheckoutGateway,
    middleware::{HmacMiddlewareFactory, MachineKeyMiddlewareFactory},
    routes::{
        health,
        CancelOrderRoute,
        CreateOrderRoute,
        DispenseCompleteRoute,
        LatestOrderRoute,
        MachineStartRoute,
        OrderCompletedRoute,
        PaymentSessionRoute,
        PickupCodeRoute,
        VerifyPaymentRoute,
    },
    webhook_routes::PaymentWebhookRoute,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    start_expiry_worker(db.clone(), config.pending_order_timeout);
    let srv = create_server_instance(config, db)?;
    srv.await.map_err(|e| ServerError::BackendError(e.to_string()))
}

pub fn create_server_instance(config: ServerConfig, db: SqliteDatabase) -> Result<Server, ServerError> {
    let gateway = CheckoutGateway::new(config.gateway.clone())
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone());
        let dispense_api = DispenseApi::new(db.clone());
        let payments_api =
            PaymentReconciliationApi::new(db.clone(), gateway.clone(), config.gateway.key_secret.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("vnd::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(dispense_api))
            .app_data(web::Data::new(payments_api));
        // Machine-facing routes sit behind the shared machine key.
        let machine_scope = web::scope("/machine")
            .wrap(MachineKeyMiddlewareFactory::new(MACHINE_KEY_HEADER, config.machine_api_key.clone()))
            .service(MachineStartRoute::<SqliteDatabase>::new())
            .service(DispenseCompleteRoute::<SqliteDatabase>::new());
        // The webhook scope authenticates the raw body before anything parses it.
        let webhook_scope = web::scope("/webhooks")
            .wrap(HmacMiddlewareFactory::new(
                WEBHOOK_SIGNATURE_HEADER,
                config.webhook_secret.clone(),
                config.webhook_checks,
            ))
            .service(PaymentWebhookRoute::<SqliteDatabase, CheckoutGateway>::new());
        app.service(health)
            .service(CreateOrderRoute::<SqliteDatabase>::new())
            .service(LatestOrderRoute::<SqliteDatabase>::new())
            .service(PickupCodeRoute::<SqliteDatabase>::new())
            .service(OrderCompletedRoute::<SqliteDatabase>::new())
            .service(CancelOrderRoute::<SqliteDatabase>::new())
            .service(PaymentSessionRoute::<SqliteDatabase, CheckoutGateway>::new())
            .service(VerifyPaymentRoute::<SqliteDatabase, CheckoutGateway>::new())
            .service(machine_scope)
            .service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    info!("💻️ Server instance created");
    Ok(srv)
}
