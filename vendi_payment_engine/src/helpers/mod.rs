pub mod codes;
pub mod signatures;

pub use codes::{new_order_id, random_pickup_code};
pub use signatures::{checkout_signature, constant_time_eq, hmac_sha256_hex, verify_checkout_signature, verify_webhook_signature};
