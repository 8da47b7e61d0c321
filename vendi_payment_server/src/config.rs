use std::env;

use checkout_tools::CheckoutConfig;
use chrono::Duration;
use log::*;
use vendi_common::Secret;

const DEFAULT_VND_HOST: &str = "127.0.0.1";
const DEFAULT_VND_PORT: u16 = 8360;
const DEFAULT_PENDING_ORDER_TIMEOUT: Duration = Duration::minutes(15);

/// The header carrying the gateway's webhook signature (HMAC-SHA256 over the raw body, hex).
pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-vendi-signature";
/// The header carrying the shared machine key on machine-facing endpoints.
pub const MACHINE_KEY_HEADER: &str = "x-vendi-machine-key";
/// The header the fronting auth layer uses to forward the authenticated user id.
pub const USER_ID_HEADER: &str = "x-vendi-user";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The shared key machines present on the dispense endpoints.
    pub machine_api_key: Secret<String>,
    /// The secret for webhook body signatures.
    pub webhook_secret: Secret<String>,
    /// When false, webhook signature checks are skipped. Local development only. **DANGER**
    pub webhook_checks: bool,
    /// Orders that see no verified payment within this window are cancelled by the background sweep.
    pub pending_order_timeout: Duration,
    /// Payment gateway client configuration.
    pub gateway: CheckoutConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_VND_HOST.to_string(),
            port: DEFAULT_VND_PORT,
            database_url: String::default(),
            machine_api_key: Secret::default(),
            webhook_secret: Secret::default(),
            webhook_checks: true,
            pending_order_timeout: DEFAULT_PENDING_ORDER_TIMEOUT,
            gateway: CheckoutConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("VND_HOST").ok().unwrap_or_else(|| DEFAULT_VND_HOST.into());
        let port = env::var("VND_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for VND_PORT. {e} Using the default, {DEFAULT_VND_PORT}, instead."
                    );
                    DEFAULT_VND_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_VND_PORT);
        let database_url = env::var("VND_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ VND_DATABASE_URL is not set. Please set it to the URL for the Vendi database.");
            String::default()
        });
        let machine_api_key = Secret::new(env::var("VND_MACHINE_API_KEY").unwrap_or_else(|_| {
            warn!(
                "🚨️ VND_MACHINE_API_KEY is not set. Machine endpoints will reject every call until it is configured."
            );
            String::default()
        }));
        let webhook_secret = Secret::new(env::var("VND_WEBHOOK_SECRET").unwrap_or_else(|_| {
            warn!("🚨️ VND_WEBHOOK_SECRET is not set. Incoming webhooks cannot be authenticated without it.");
            String::default()
        }));
        let webhook_checks = env::var("VND_WEBHOOK_CHECKS").map(|s| &s != "0" && &s != "false").unwrap_or(true);
        if !webhook_checks {
            warn!("🚨️ Webhook signature checks are DISABLED. Never run production like this.");
        }
        let pending_order_timeout = env::var("VND_PENDING_ORDER_TIMEOUT")
            .map_err(|_| {
                info!(
                    "🪛️ VND_PENDING_ORDER_TIMEOUT is not set. Using the default value of {} minutes.",
                    DEFAULT_PENDING_ORDER_TIMEOUT.num_minutes()
                )
            })
            .and_then(|s| {
                s.parse::<i64>()
                    .map(Duration::minutes)
                    .map_err(|e| warn!("🪛️ Invalid configuration value for VND_PENDING_ORDER_TIMEOUT. {e}"))
            })
            .ok()
            .unwrap_or(DEFAULT_PENDING_ORDER_TIMEOUT);
        let gateway = CheckoutConfig::new_from_env_or_default();
        Self {
            host,
            port,
            database_url,
            machine_api_key,
            webhook_secret,
            webhook_checks,
            pending_order_timeout,
            gateway,
        }
    }
}
