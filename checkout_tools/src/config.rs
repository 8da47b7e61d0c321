use log::*;
use vendi_common::Secret;

#[derive(Debug, Clone, Default)]
pub struct CheckoutConfig {
    /// Base URL of the gateway REST API, e.g. "https://api.checkout-gateway.example".
    pub base_url: String,
    /// The public key id; doubles as the basic-auth username.
    pub key_id: String,
    /// The key secret; basic-auth password, and the HMAC key for client-confirmed payment signatures.
    pub key_secret: Secret<String>,
}

impl CheckoutConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("VND_GATEWAY_BASE_URL").unwrap_or_else(|_| {
            warn!("VND_GATEWAY_BASE_URL not set, using a sandbox default");
            "https://sandbox.checkout-gateway.example".to_string()
        });
        let key_id = std::env::var("VND_GATEWAY_KEY_ID").unwrap_or_else(|_| {
            warn!("VND_GATEWAY_KEY_ID not set, using (probably useless) default");
            "key_id_00000000".to_string()
        });
        let key_secret = Secret::new(std::env::var("VND_GATEWAY_KEY_SECRET").unwrap_or_else(|_| {
            warn!("VND_GATEWAY_KEY_SECRET not set, using (probably useless) default");
            "key_secret_00000000".to_string()
        }));
        Self { base_url, key_id, key_secret }
    }
}
