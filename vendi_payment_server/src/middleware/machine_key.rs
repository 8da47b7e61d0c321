//! Shared-key authentication for machine-facing endpoints.
//!
//! Vending machines authenticate with a deployment-wide key presented in a header. Machine provisioning and
//! per-machine credentials are managed by the fleet tooling, not this server; here the key only gates access to the
//! dispense endpoints, and the machine's own identity (its code) is validated against the database afterwards.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorUnauthorized,
    Error,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use vendi_common::Secret;
use vendi_payment_engine::helpers::constant_time_eq;

pub struct MachineKeyMiddlewareFactory {
    key_header: String,
    key: Secret<String>,
}

impl MachineKeyMiddlewareFactory {
    pub fn new(key_header: &str, key: Secret<String>) -> Self {
        MachineKeyMiddlewareFactory { key_header: key_header.into(), key }
    }
}

impl<S, B> Transform<S, ServiceRequest> for MachineKeyMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = MachineKeyMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MachineKeyMiddlewareService {
            key_header: self.key_header.clone(),
            key: self.key.clone(),
            service: Rc::new(service),
        }))
    }
}

pub struct MachineKeyMiddlewareService<S> {
    key_header: String,
    key: Secret<String>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for MachineKeyMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let expected = self.key.reveal().clone();
        let key_header = self.key_header.clone();
        Box::pin(async move {
            trace!("🔐️ Checking machine key for request");
            if expected.is_empty() {
                warn!("🔐️ No machine key is configured. Denying machine access.");
                return Err(ErrorUnauthorized("Machine authentication is not configured."));
            }
            let presented = req.headers().get(&key_header).and_then(|v| v.to_str().ok()).ok_or_else(|| {
                warn!("🔐️ No machine key found in request. Denying access.");
                ErrorUnauthorized("No machine key found.")
            })?;
            if constant_time_eq(expected.as_bytes(), presented.as_bytes()) {
                trace!("🔐️ Machine key check ✅️");
                service.call(req).await
            } else {
                warn!("🔐️ Invalid machine key. Denying access.");
                Err(ErrorUnauthorized("Invalid machine key."))
            }
        })
    }
}
