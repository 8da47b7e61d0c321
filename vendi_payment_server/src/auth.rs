//! User identity plumbing.
//!
//! The OTP-login flow lives in a separate identity service that fronts this server. By the time a request arrives
//! here it has been authenticated, and the caller's user id is forwarded in the [`USER_ID_HEADER`] header. This
//! extractor is the only place that header is read.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, FromRequest, HttpRequest};

use crate::{config::USER_ID_HEADER, errors::ServerError};

/// The authenticated user on a storefront request.
#[derive(Debug, Clone)]
pub struct UserClaims {
    pub user_id: String,
}

impl FromRequest for UserClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let claims = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| UserClaims { user_id: s.to_string() })
            .ok_or(ServerError::Unauthenticated);
        ready(claims)
    }
}
